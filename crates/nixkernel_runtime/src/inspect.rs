//! Documentation lookup.

use nixkernel_language::{Evaluator, PrimOp, Value};
use tracing::debug;

use crate::commands::{self, COMMAND_SIGIL, CommandSpec};
use crate::complete;
use crate::environment::Environment;

/// Documentation for a builtin or command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocEntry {
    /// Name as written, e.g. `map` or `:build`.
    pub name: String,
    /// Call form in markdown.
    pub synopsis: String,
    /// Extended description in markdown.
    pub description: String,
}

impl DocEntry {
    /// Returns the entry rendered as markdown.
    #[must_use]
    pub fn markdown(&self) -> String {
        format!("**Synopsis:** {}\n\n{}", self.synopsis, self.description)
    }
}

impl From<&PrimOp> for DocEntry {
    fn from(op: &PrimOp) -> Self {
        Self {
            name: op.name.to_string(),
            synopsis: op.synopsis(),
            description: op.doc.to_string(),
        }
    }
}

impl From<&CommandSpec> for DocEntry {
    fn from(spec: &CommandSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            synopsis: spec.synopsis(),
            description: spec.help.to_string(),
        }
    }
}

/// Returns the documentation attached to a value, if any.
#[must_use]
pub fn doc_for_value(value: &Value) -> Option<DocEntry> {
    match value {
        Value::PrimOp(app) => Some(DocEntry::from(app.op)),
        _ => None,
    }
}

/// Resolves the word at character offset `cursor` to documentation.
///
/// Command spellings resolve to their help line. Anything else is
/// evaluated in the session scope; only builtin functions carry
/// documentation.
#[must_use]
pub fn inspect(ev: &Evaluator, env: &Environment, code: &str, cursor: usize) -> Option<DocEntry> {
    let chars: Vec<char> = code.chars().collect();
    let cursor = cursor.min(chars.len());

    let word = surrounding(&chars, cursor, |c| !c.is_whitespace());
    if word.starts_with(COMMAND_SIGIL) {
        return commands::lookup(&word).map(DocEntry::from);
    }

    let ident = surrounding(&chars, cursor, complete::is_completion_char);
    if ident.is_empty() {
        return None;
    }
    let value = ev.eval_str(&ident, env.scope());
    let _ = ev.take_traces();
    match value {
        Ok(value) => doc_for_value(&value),
        Err(err) => {
            debug!(ident, error = %err, "nothing to inspect");
            None
        }
    }
}

fn surrounding(chars: &[char], cursor: usize, accept: impl Fn(char) -> bool) -> String {
    let start = cursor - chars[..cursor].iter().rev().take_while(|c| accept(**c)).count();
    let end = cursor + chars[cursor..].iter().take_while(|c| accept(**c)).count();
    chars[start..end].iter().collect()
}

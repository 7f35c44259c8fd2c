//! Classifying input before it is run.

use nixkernel_language::parse_repl_input;
use serde::{Deserialize, Serialize};

use crate::commands::{self, COMMAND_SIGIL, SHELL_SIGIL};

/// Whether input can run as it stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    /// Runs as is.
    Complete,
    /// Ends in the middle of a construct; more lines are expected.
    Incomplete,
    /// Cannot become valid by adding more input.
    Invalid,
}

impl Completeness {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
            Self::Invalid => "invalid",
        }
    }
}

/// Classifies input without evaluating it.
///
/// Empty input is complete. Commands are complete unless their expression
/// argument is incomplete; shell escapes are incomplete while the last
/// line ends in `\`.
#[must_use]
pub fn classify(text: &str) -> Completeness {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Completeness::Complete;
    }
    if trimmed.starts_with(SHELL_SIGIL) {
        return if trimmed.ends_with('\\') {
            Completeness::Incomplete
        } else {
            Completeness::Complete
        };
    }
    if trimmed.starts_with(COMMAND_SIGIL) {
        let (word, argument) = commands::split(trimmed);
        return match commands::lookup(word) {
            Some(spec) if spec.argument.is_expression() && !argument.is_empty() => {
                classify_expression(argument)
            }
            _ => Completeness::Complete,
        };
    }
    classify_expression(text)
}

/// Classifies Nix source: an expression or `name = value` bindings.
#[must_use]
pub fn classify_expression(text: &str) -> Completeness {
    match parse_repl_input(text) {
        Ok(_) => Completeness::Complete,
        Err(err) if err.is_unexpected_end() => Completeness::Incomplete,
        Err(_) => Completeness::Invalid,
    }
}

//! Translation of failures into error records.

use nixkernel_foundation::Error;
use serde::{Deserialize, Serialize};

/// Hint appended when trace frames were hidden.
pub const TRACE_HINT: &str = "(use ':te' to show detailed trace information)";

/// An error as front-ends see it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Category name, e.g. `UndefinedVarError`.
    pub ename: String,
    /// The error message.
    pub evalue: String,
    /// Rendered report, one entry per line.
    pub traceback: Vec<String>,
}

impl ErrorRecord {
    /// Returns the traceback as one newline-terminated block.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.traceback.join("\n");
        out.push('\n');
        out
    }
}

/// Maps an error onto its category and report.
///
/// The first traceback line is always `error: <message>`. The position
/// follows when known, then the "while ..." frames if `show_trace` is set.
#[must_use]
pub fn translate(err: &Error, show_trace: bool) -> ErrorRecord {
    let evalue = err.kind.to_string();
    let mut traceback = vec![format!("error: {evalue}")];
    if let Some(context) = &err.context {
        if let Some(location) = context.location() {
            traceback.push(format!("       at {location}"));
        }
        if show_trace {
            traceback.extend(context.stack.iter().map(|frame| format!("       … {frame}")));
        } else if !context.stack.is_empty() {
            traceback.push(TRACE_HINT.to_string());
        }
    }
    ErrorRecord {
        ename: err.category().name().to_string(),
        evalue,
        traceback,
    }
}

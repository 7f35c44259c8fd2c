//! Error types for nixkernel.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

/// Upper bound on the trace frames recorded on one error.
pub const MAX_FRAMES: usize = 64;

/// The main error type for nixkernel operations.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Records the position of the failure unless a more precise one is
    /// already attached.
    #[must_use]
    pub fn at(mut self, source: &str, line: u32, column: u32) -> Self {
        let context = self.context.get_or_insert_with(ErrorContext::new);
        if context.line.is_none() {
            context.source = Some(source.to_string());
            context.line = Some(line as usize);
            context.column = Some(column as usize);
        }
        self
    }

    /// Appends a "while ..." frame to the error trace.
    ///
    /// At most [`MAX_FRAMES`] frames are kept; deeper frames are dropped.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        let stack = &mut self.context.get_or_insert_with(ErrorContext::new).stack;
        if stack.len() < MAX_FRAMES {
            stack.push(frame.into());
        }
        self
    }

    /// Creates an undefined variable error.
    #[must_use]
    pub fn undefined_variable(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UndefinedVariable(name.into()))
    }

    /// Creates a type mismatch error from two value descriptions.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Creates a missing attribute error.
    #[must_use]
    pub fn missing_attribute(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingAttribute(name.into()))
    }

    /// Creates a generic evaluation error carrying a message.
    #[must_use]
    pub fn eval(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Eval(message.into()))
    }

    /// Creates a build failure.
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Build(message.into()))
    }

    /// Creates an I/O error with a message describing the operation.
    #[must_use]
    pub fn io(operation: impl fmt::Display, err: &std::io::Error) -> Self {
        Self::new(ErrorKind::Io(format!("{operation}: {err}")))
    }

    /// Creates an interruption error.
    #[must_use]
    pub fn interrupted() -> Self {
        Self::new(ErrorKind::Interrupted)
    }

    /// Returns the category this error is reported under.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns true if this is a parse error caused by running out of input.
    #[must_use]
    pub fn is_unexpected_end(&self) -> bool {
        matches!(self.kind, ErrorKind::ParseError { at_end: true, .. })
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// A name was not bound in any enclosing scope.
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    /// A value of the wrong kind reached an operation.
    #[error("expected {expected} but found {actual}")]
    TypeMismatch {
        /// Description of the expected kind ("a set").
        expected: String,
        /// Description of the actual value ("an integer: 5").
        actual: String,
    },

    /// Attribute selection on a set without that attribute.
    #[error("attribute '{0}' missing")]
    MissingAttribute(String),

    /// A thunk was forced while already being forced.
    #[error("infinite recursion encountered")]
    InfiniteRecursion,

    /// `builtins.throw` was called.
    #[error("{0}")]
    Thrown(String),

    /// `builtins.abort` was called.
    #[error("evaluation aborted with the following error message: '{0}'")]
    Aborted(String),

    /// An `assert` condition was false.
    #[error("assertion '{0}' failed")]
    AssertionFailed(String),

    /// Integer division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Checked integer arithmetic overflowed.
    #[error("integer overflow in {0}")]
    Overflow(String),

    /// Value cannot be turned into a string in this position.
    #[error("cannot coerce {0} to a string")]
    Coercion(String),

    /// Parse error in source text.
    #[error("syntax error, {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Line number (1-indexed).
        line: u32,
        /// Column number (1-indexed).
        column: u32,
        /// The source line where the error occurred.
        context: String,
        /// Whether the parser ran out of input.
        at_end: bool,
    },

    /// Evaluation nested deeper than the configured limit.
    #[error("stack overflow; max-call-depth of {0} exceeded")]
    CallDepthExceeded(usize),

    /// Any other evaluation failure.
    #[error("{0}")]
    Eval(String),

    /// A `:` command that is not in the command table.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Realizing a derivation failed.
    #[error("{0}")]
    Build(String),

    /// A shell escape exited unsuccessfully.
    #[error("shell command exited with status {status}")]
    ShellCommand {
        /// Exit status, or the negated signal number.
        status: i32,
    },

    /// The user interrupted the running request.
    #[error("interrupted by the user")]
    Interrupted,

    /// Filesystem or process I/O failure.
    #[error("{0}")]
    Io(String),

    /// JSON encoding or decoding failure.
    #[error("{0}")]
    Json(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// Returns the category this kind is reported under.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UndefinedVariable(_) => ErrorCategory::UndefinedVar,
            Self::TypeMismatch { .. } | Self::Coercion(_) => ErrorCategory::Type,
            Self::ParseError { .. } => ErrorCategory::Parse,
            Self::UnknownCommand(_) => ErrorCategory::UnknownCommand,
            Self::Build(_) => ErrorCategory::Build,
            Self::ShellCommand { .. } => ErrorCategory::ShellCommand,
            Self::Interrupted => ErrorCategory::Interrupted,
            Self::MissingAttribute(_)
            | Self::InfiniteRecursion
            | Self::Thrown(_)
            | Self::Aborted(_)
            | Self::AssertionFailed(_)
            | Self::DivisionByZero
            | Self::Overflow(_)
            | Self::CallDepthExceeded(_)
            | Self::Eval(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Internal(_) => ErrorCategory::Evaluation,
        }
    }
}

/// The closed error taxonomy reported to front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// `UndefinedVarError`
    UndefinedVar,
    /// `TypeError`
    Type,
    /// `ParseError`
    Parse,
    /// `UnknownCommandError`
    UnknownCommand,
    /// `BuildError`
    Build,
    /// `ShellCommandError`
    ShellCommand,
    /// `Interrupted`
    Interrupted,
    /// `EvaluationError`, for everything not listed above
    Evaluation,
}

impl ErrorCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::UndefinedVar,
        Self::Type,
        Self::Parse,
        Self::UnknownCommand,
        Self::Build,
        Self::ShellCommand,
        Self::Interrupted,
        Self::Evaluation,
    ];

    /// Returns the wire name, e.g. `UndefinedVarError`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UndefinedVar => "UndefinedVarError",
            Self::Type => "TypeError",
            Self::Parse => "ParseError",
            Self::UnknownCommand => "UnknownCommandError",
            Self::Build => "BuildError",
            Self::ShellCommand => "ShellCommandError",
            Self::Interrupted => "Interrupted",
            Self::Evaluation => "EvaluationError",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Source file, or `«string»` for interactive input.
    pub source: Option<String>,
    /// Line number in source.
    pub line: Option<usize>,
    /// Column number in source.
    pub column: Option<usize>,
    /// Trace frames, innermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            line: None,
            column: None,
            stack: Vec::new(),
        }
    }

    /// Sets the source location.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the line and column.
    #[must_use]
    pub fn with_position(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }

    /// Returns the `source:line:column` location, if known.
    #[must_use]
    pub fn location(&self) -> Option<String> {
        let source = self.source.as_deref()?;
        match (self.line, self.column) {
            (Some(line), Some(col)) => Some(format!("{source}:{line}:{col}")),
            _ => Some(source.to_string()),
        }
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = self.location() {
            write!(f, "at {location}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  {frame}")?;
            }
        }
        Ok(())
    }
}

/// Result type alias for nixkernel operations.
pub type Result<T> = std::result::Result<T, Error>;

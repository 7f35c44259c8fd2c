//! Session state and request handling.
//!
//! The session owns the evaluator, the binding environment and the build
//! store. Requests are handled one at a time: an execute request is split
//! into chunks that run in order, and the first failure ends the request.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use nixkernel_foundation::{Error, ErrorKind, Interrupt, Result};
use nixkernel_language::{Evaluator, PrintOptions, ReplInput, Thunk, Value};
use nixkernel_store::{LocalStore, ProcessRunner, Store};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::commands::{COMMAND_SIGIL, SHELL_SIGIL};
use crate::complete::{self, Completion};
use crate::completeness::{self, Completeness};
use crate::config::KernelConfig;
use crate::display::{self, DisplayBundle, TEXT_PLAIN};
use crate::environment::{Environment, Provenance};
use crate::errors::{self, ErrorRecord};
use crate::inspect::{self, DocEntry};
use crate::output::Output;
use crate::shell;

/// Stack reserved for the thread a session runs on. Evaluation recurses
/// once per nested call, down to the configured call depth.
pub const SESSION_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Runs `f` on a thread with [`SESSION_STACK_SIZE`] of stack and waits for
/// its result.
///
/// # Errors
///
/// Returns an error if the thread cannot be started or panics.
pub fn on_session_thread<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name("session".to_string())
        .stack_size(SESSION_STACK_SIZE)
        .spawn(f)
        .map_err(|e| Error::io("cannot start session thread", &e))?
        .join()
        .map_err(|_| Error::new(ErrorKind::Internal("session thread panicked".to_string())))
}

// =============================================================================
// Replies
// =============================================================================

/// Outcome of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The request succeeded.
    Ok,
    /// The request failed; an error record is attached.
    Error,
}

/// The reply to an execute request.
///
/// Stream output is not part of the reply; it went to the [`Output`]
/// while the request ran.
#[derive(Clone, Debug)]
pub struct ExecuteReply {
    /// Overall outcome.
    pub status: Status,
    /// Number of this request within the session.
    pub execution_count: u32,
    /// Value of the final expression, if the cell ended in one.
    pub value: Option<Value>,
    /// Rendering of `value`.
    pub display: Option<DisplayBundle>,
    /// Failure details when `status` is [`Status::Error`].
    pub error: Option<ErrorRecord>,
}

impl ExecuteReply {
    /// Returns true for a successful reply.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

// =============================================================================
// Cell chunking
// =============================================================================

/// One independently executed piece of a cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    /// `!` lines, joined by trailing backslashes.
    Shell(String),
    /// A `:` command, possibly with a multi-line expression argument.
    Command(String),
    /// Nix bindings or an expression.
    Source(String),
}

impl Chunk {
    fn start(trimmed: &str, line: &str) -> Self {
        let text = format!("{line}\n");
        if trimmed.starts_with(SHELL_SIGIL) {
            Self::Shell(text)
        } else if trimmed.starts_with(COMMAND_SIGIL) {
            Self::Command(text)
        } else {
            Self::Source(text)
        }
    }

    /// Whether `trimmed` continues this chunk rather than starting a new one.
    fn accepts(&self, trimmed: &str) -> bool {
        match self {
            Self::Shell(_) | Self::Command(_) => true,
            Self::Source(_) => !trimmed.starts_with(SHELL_SIGIL) && !trimmed.starts_with(COMMAND_SIGIL),
        }
    }

    fn push_line(&mut self, line: &str) {
        let (Self::Shell(text) | Self::Command(text) | Self::Source(text)) = self;
        text.push_str(line);
        text.push('\n');
    }

    fn is_finished(&self) -> bool {
        match self {
            Self::Shell(text) => !text.trim_end().ends_with('\\'),
            Self::Command(text) => completeness::classify(text) != Completeness::Incomplete,
            Self::Source(text) => completeness::classify_expression(text) != Completeness::Incomplete,
        }
    }
}

/// Splits a cell into chunks.
///
/// Blank and comment lines between chunks are dropped. A chunk still
/// incomplete at the end of the cell is kept so that running it reports
/// the syntax error.
#[must_use]
pub fn split_cell(code: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut pending: Option<Chunk> = None;
    for line in code.lines() {
        let trimmed = line.trim();
        if let Some(chunk) = pending.as_mut() {
            if chunk.accepts(trimmed) {
                chunk.push_line(line);
                if chunk.is_finished() {
                    chunks.extend(pending.take());
                }
                continue;
            }
            chunks.extend(pending.take());
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let chunk = Chunk::start(trimmed, line);
        if chunk.is_finished() {
            chunks.push(chunk);
        } else {
            pending = Some(chunk);
        }
    }
    chunks.extend(pending);
    chunks
}

// =============================================================================
// Session
// =============================================================================

/// An interactive evaluation session.
pub struct Session {
    pub(crate) config: KernelConfig,
    pub(crate) interrupt: Interrupt,
    pub(crate) evaluator: Evaluator,
    pub(crate) env: Environment,
    pub(crate) runner: Arc<ProcessRunner>,
    pub(crate) store: Box<dyn Store>,
    /// Files loaded with `:load`, replayed by `:reload`.
    pub(crate) loaded_files: Vec<PathBuf>,
    execution_count: u32,
}

impl Session {
    /// Creates a session building into `config.store_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subprocess runtime cannot be started.
    pub fn new(config: KernelConfig) -> Result<Self> {
        let runner = Arc::new(ProcessRunner::new(config.channel_capacity)?);
        let store = LocalStore::new(config.store_dir.clone(), Arc::clone(&runner)).with_system(config.system.clone());
        Ok(Self::with_store(config, runner, Box::new(store)))
    }

    /// Creates a session with a custom store.
    #[must_use]
    pub fn with_store(config: KernelConfig, runner: Arc<ProcessRunner>, store: Box<dyn Store>) -> Self {
        let interrupt = Interrupt::new();
        let evaluator = Evaluator::new(config.eval_config(), interrupt.clone());
        let env = Environment::new(evaluator.globals());
        Self {
            config,
            interrupt,
            evaluator,
            env,
            runner,
            store,
            loaded_files: Vec::new(),
            execution_count: 0,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Returns the handle that cancels the running request.
    #[must_use]
    pub const fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Returns the evaluator.
    #[must_use]
    pub const fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Returns the session bindings.
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.env
    }

    /// Returns the subprocess runner.
    #[must_use]
    pub const fn runner(&self) -> &Arc<ProcessRunner> {
        &self.runner
    }

    /// Returns the number of execute requests handled so far.
    #[must_use]
    pub const fn execution_count(&self) -> u32 {
        self.execution_count
    }

    /// Returns the files `:reload` would load again.
    #[must_use]
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }

    pub(crate) fn print_options(&self) -> PrintOptions {
        PrintOptions::default().with_colors(self.config.ansi_colors)
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Runs a cell.
    ///
    /// Failures never escape: they end the request and come back as an
    /// error record. Output already streamed stays delivered.
    #[instrument(skip_all, fields(count = self.execution_count + 1))]
    pub fn execute(&mut self, code: &str, out: &mut dyn Output) -> ExecuteReply {
        self.interrupt.reset();
        self.execution_count += 1;

        let chunks = split_cell(code);
        let last = chunks.len().saturating_sub(1);
        let mut result = None;
        for (i, chunk) in chunks.iter().enumerate() {
            let outcome = self.run_chunk(chunk, i == last, out);
            self.flush_traces(out);
            match outcome {
                Ok(value) => result = value,
                Err(err) => {
                    debug!(category = %err.category(), error = %err, "request failed");
                    return ExecuteReply {
                        status: Status::Error,
                        execution_count: self.execution_count,
                        value: None,
                        display: None,
                        error: Some(errors::translate(&err, self.config.show_trace)),
                    };
                }
            }
        }

        let (value, display) = result.unzip();
        ExecuteReply {
            status: Status::Ok,
            execution_count: self.execution_count,
            value,
            display,
            error: None,
        }
    }

    /// Completes `code` at character offset `cursor`.
    #[must_use]
    pub fn complete(&self, code: &str, cursor: usize) -> Completion {
        complete::complete(&self.evaluator, &self.env, code, cursor)
    }

    /// Looks up documentation for the word at character offset `cursor`.
    #[must_use]
    pub fn inspect(&self, code: &str, cursor: usize) -> Option<DocEntry> {
        inspect::inspect(&self.evaluator, &self.env, code, cursor)
    }

    /// Classifies `code` without running it.
    #[must_use]
    pub fn is_complete(&self, code: &str) -> Completeness {
        completeness::classify(code)
    }

    /// Returns the words the console completer offers.
    #[must_use]
    pub fn vocabulary(&self) -> Vec<String> {
        complete::vocabulary(&self.evaluator, &self.env)
    }

    fn run_chunk(&mut self, chunk: &Chunk, last: bool, out: &mut dyn Output) -> Result<Option<(Value, DisplayBundle)>> {
        match chunk {
            Chunk::Shell(block) => {
                shell::run(&self.runner, block, &self.config.working_dir, &self.interrupt, out)?;
                Ok(None)
            }
            Chunk::Command(line) => {
                self.dispatch(line.trim(), out)?;
                Ok(None)
            }
            Chunk::Source(text) => self.evaluate(text, last, out),
        }
    }

    fn evaluate(&mut self, text: &str, last: bool, out: &mut dyn Output) -> Result<Option<(Value, DisplayBundle)>> {
        match self.evaluator.parse_repl(text)? {
            ReplInput::Bindings(bindings) => {
                let mut added = 0;
                for (name, expr) in bindings {
                    let value = self.evaluator.eval(&expr, self.env.scope())?;
                    added += self.env.add([(name, Thunk::ready(value))], &Provenance::Literal);
                }
                out.stdout(&format!("Added {added} variables.\n"));
                Ok(None)
            }
            ReplInput::Expr(expr) => {
                let value = self.evaluator.eval(&expr, self.env.scope())?;
                let bundle = display::render(&self.evaluator, &value, &self.print_options())?;
                if last {
                    return Ok(Some((value, bundle)));
                }
                if let Some(text) = bundle.get(TEXT_PLAIN) {
                    out.stdout(&format!("{text}\n"));
                }
                Ok(None)
            }
        }
    }

    fn flush_traces(&self, out: &mut dyn Output) {
        for message in self.evaluator.take_traces() {
            out.stderr(&format!("trace: {message}\n"));
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("env", &self.env)
            .field("loaded_files", &self.loaded_files)
            .field("execution_count", &self.execution_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::output::Collector;

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let config = KernelConfig::default()
            .with_store_dir(dir.path().join("store"))
            .with_working_dir(dir.path())
            .with_system("test-system");
        (dir, Session::new(config).unwrap())
    }

    fn run(session: &mut Session, code: &str) -> (ExecuteReply, Collector) {
        let mut out = Collector::new();
        let reply = session.execute(code, &mut out);
        (reply, out)
    }

    fn plain(reply: &ExecuteReply) -> &str {
        reply.display.as_ref().and_then(|d| d.get(TEXT_PLAIN)).unwrap()
    }

    #[test]
    fn chunking() {
        let chunks = split_cell("x = 1\n\n# note\n:p x\n!echo a \\\n  b\n{\n  a = 1;\n}\n");
        assert_eq!(
            chunks,
            vec![
                Chunk::Source("x = 1\n".into()),
                Chunk::Command(":p x\n".into()),
                Chunk::Shell("!echo a \\\n  b\n".into()),
                Chunk::Source("{\n  a = 1;\n}\n".into()),
            ]
        );
    }

    #[test]
    fn multi_line_command_argument() {
        let chunks = split_cell(":p {\n  a = 1;\n}\n1 + 1");
        assert_eq!(
            chunks,
            vec![Chunk::Command(":p {\n  a = 1;\n}\n".into()), Chunk::Source("1 + 1\n".into())]
        );
    }

    #[test]
    fn incomplete_tail_is_kept() {
        assert_eq!(split_cell("let a ="), vec![Chunk::Source("let a =\n".into())]);
        assert!(split_cell("  \n# only a comment\n").is_empty());
    }

    #[test]
    fn expression_result() {
        let (_dir, mut session) = session();
        let (reply, _) = run(&mut session, "100 * 5");
        assert!(reply.is_ok());
        assert_eq!(plain(&reply), "500");
        assert_eq!(reply.execution_count, 1);

        let (reply, _) = run(&mut session, r#""foo" + "bar""#);
        assert_eq!(plain(&reply), "\"foobar\"");
        assert_eq!(session.execution_count(), 2);
    }

    #[test]
    fn bindings_are_added() {
        let (_dir, mut session) = session();
        let (reply, out) = run(&mut session, "a = 1\nb = a + 1");
        assert!(reply.is_ok());
        assert!(reply.display.is_none());
        assert_eq!(out.stdout_text(), "Added 1 variables.\nAdded 1 variables.\n");

        let (reply, _) = run(&mut session, "a + b");
        assert_eq!(plain(&reply), "3");
    }

    #[test]
    fn only_the_last_expression_is_the_result() {
        let (_dir, mut session) = session();
        let (reply, out) = run(&mut session, "1 + 1\n2 + 2");
        assert_eq!(out.stdout_text(), "2\n");
        assert_eq!(plain(&reply), "4");
    }

    #[test]
    fn first_failure_stops_the_cell() {
        let (_dir, mut session) = session();
        let (reply, out) = run(&mut session, "1\nan_undefined_variable\n3");
        assert_eq!(reply.status, Status::Error);
        assert_eq!(out.stdout_text(), "1\n");
        let error = reply.error.unwrap();
        assert_eq!(error.ename, "UndefinedVarError");
        assert!(error.evalue.contains("undefined variable"));
    }

    #[test]
    fn traces_go_to_stderr() {
        let (_dir, mut session) = session();
        let (reply, out) = run(&mut session, r#"builtins.trace "this is a trace" 1"#);
        assert_eq!(plain(&reply), "1");
        assert_eq!(out.stderr_text(), "trace: this is a trace\n");
    }

    #[test]
    fn shell_chunks_stream() {
        let (_dir, mut session) = session();
        let (reply, out) = run(&mut session, "!echo \"hello, world\"");
        assert!(reply.is_ok());
        assert_eq!(out.stdout_text(), "hello, world\n");

        let (reply, _) = run(&mut session, "!exit 3");
        assert_eq!(reply.error.unwrap().ename, "ShellCommandError");
    }

    #[test]
    fn rich_display_is_verbatim() {
        let (_dir, mut session) = session();
        let code = r#"
        {
          _toMime = {
            "text/html" = "<h1>Hello HTML</h1>";
            "text/plain" = "Hello Plain";
          };
        }
        "#;
        let (reply, _) = run(&mut session, code);
        let display = reply.display.unwrap();
        assert_eq!(display.len(), 2);
        assert_eq!(display.get("text/html"), Some("<h1>Hello HTML</h1>"));
        assert_eq!(display.get(TEXT_PLAIN), Some("Hello Plain"));
    }

    #[test]
    fn interrupt_is_cleared_per_request() {
        let (_dir, mut session) = session();
        session.interrupt().trigger();
        let (reply, _) = run(&mut session, "1 + 1");
        assert!(reply.is_ok());
    }

    #[test]
    fn requests_beside_execute() {
        let (_dir, mut session) = session();
        run(&mut session, "myValue = 1");
        assert_eq!(session.complete("myV", 3).matches, vec!["myValue"]);
        assert_eq!(session.inspect("builtins.map", 5).unwrap().name, "map");
        assert_eq!(session.is_complete("let a ="), Completeness::Incomplete);
        assert!(session.vocabulary().contains(&"myValue".to_string()));
    }
}

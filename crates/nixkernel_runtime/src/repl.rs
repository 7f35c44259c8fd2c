//! The interactive console.

use std::io::{self, Write};
use std::path::Path;

use nixkernel_foundation::{Error, Result};

use crate::completeness::{self, Completeness};
use crate::display::{DisplayBundle, TEXT_MARKDOWN, TEXT_PLAIN};
use crate::editor::{LineEditor, ReadResult, RustylineEditor};
use crate::errors::{self, ErrorRecord};
use crate::output::{Output, OutputStream};
use crate::session::{ExecuteReply, Session};

/// The interactive console.
pub struct Repl<E: LineEditor = RustylineEditor> {
    /// The line editor for input.
    editor: E,

    /// Session state.
    session: Session,

    /// Whether to show the welcome banner.
    show_banner: bool,

    /// Primary prompt.
    prompt: String,

    /// Continuation prompt (for multi-line input).
    continuation_prompt: String,
}

impl Repl<RustylineEditor> {
    /// Creates a console over `session` with the default rustyline editor.
    ///
    /// # Errors
    ///
    /// Returns an error if the editor fails to initialize.
    pub fn new(session: Session) -> Result<Self> {
        let editor = RustylineEditor::new()?;
        Ok(Self::with_editor(editor, session))
    }
}

impl<E: LineEditor> Repl<E> {
    /// Creates a console with the given editor.
    pub fn with_editor(mut editor: E, session: Session) -> Self {
        editor.set_keywords(session.vocabulary());
        Self {
            editor,
            session,
            show_banner: true,
            prompt: "nix> ".to_string(),
            continuation_prompt: "...> ".to_string(),
        }
    }

    /// Disables the welcome banner.
    #[must_use]
    pub const fn without_banner(mut self) -> Self {
        self.show_banner = false;
        self
    }

    /// Sets the primary prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Returns a reference to the session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns a mutable reference to the session.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Runs the console loop until end of input.
    ///
    /// # Errors
    ///
    /// Returns an error if reading input fails fatally.
    pub fn run(&mut self) -> Result<()> {
        if self.show_banner {
            self.print_banner();
        }

        loop {
            match self.read_eval_print() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => print_error(&errors::translate(&e, self.session.config().show_trace)),
            }
        }

        println!();
        Ok(())
    }

    /// Loads a file into the session as `:load` does, printing its notice.
    ///
    /// # Errors
    ///
    /// Returns errors from reading or evaluating the file.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        self.session.load_file(path, &mut Console)?;
        self.editor.set_keywords(self.session.vocabulary());
        Ok(())
    }

    /// Runs `input` and prints its output and result.
    pub fn execute(&mut self, input: &str) -> ExecuteReply {
        let reply = self.session.execute(input, &mut Console);
        if let Some(bundle) = &reply.display {
            Console.display(bundle.clone());
        }
        if let Some(error) = &reply.error {
            print_error(error);
        }
        self.editor.set_keywords(self.session.vocabulary());
        reply
    }

    /// Executes one read-eval-print iteration.
    ///
    /// Returns `Ok(true)` to continue, `Ok(false)` to exit.
    fn read_eval_print(&mut self) -> Result<bool> {
        let Some(input) = self.read_input()? else {
            return Ok(false);
        };

        if input.trim().is_empty() {
            return Ok(true);
        }

        self.editor.add_history(&input);
        self.execute(&input);
        Ok(true)
    }

    /// Reads a potentially multi-line input.
    fn read_input(&mut self) -> Result<Option<String>> {
        let mut input = String::new();
        let mut first_line = true;

        loop {
            let read = if first_line {
                self.editor.read_line(&self.prompt)?
            } else {
                self.editor.read_continuation(&self.continuation_prompt)?
            };

            match read {
                ReadResult::Line(line) => {
                    if !first_line {
                        input.push('\n');
                    }
                    input.push_str(&line);

                    if completeness::classify(&input) != Completeness::Incomplete {
                        return Ok(Some(input));
                    }

                    first_line = false;
                }
                ReadResult::Interrupted => {
                    if !first_line {
                        println!("\nInput cancelled.");
                    }
                    return Ok(Some(String::new()));
                }
                ReadResult::Eof => {
                    if first_line {
                        return Ok(None);
                    }
                    return Err(Error::eval("unexpected end of input in multi-line input"));
                }
            }
        }
    }

    /// Prints the welcome banner.
    #[allow(clippy::unused_self)]
    fn print_banner(&self) {
        println!("Welcome to nixkernel v{}", env!("CARGO_PKG_VERSION"));
        println!("Type :? for help. Use Ctrl+D to exit.\n");
        let _ = io::stdout().flush();
    }
}

fn print_error(error: &ErrorRecord) {
    eprint!("\x1b[31m{}\x1b[0m", error.render());
}

/// Writes session output straight to the terminal.
struct Console;

impl Output for Console {
    fn stream(&mut self, stream: OutputStream, text: &str) {
        match stream {
            OutputStream::Stdout => {
                let mut out = io::stdout().lock();
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
            OutputStream::Stderr => {
                let mut err = io::stderr().lock();
                let _ = err.write_all(text.as_bytes());
                let _ = err.flush();
            }
        }
    }

    fn display(&mut self, bundle: DisplayBundle) {
        let text = bundle
            .get(TEXT_PLAIN)
            .or_else(|| bundle.get(TEXT_MARKDOWN))
            .map_or_else(|| describe_bundle(&bundle), str::to_string);
        self.stdout(&format!("{text}\n"));
    }
}

fn describe_bundle(bundle: &DisplayBundle) -> String {
    let kinds: Vec<_> = bundle.iter().map(|(mime, _)| mime).collect();
    format!("<display data: {}>", kinds.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::session::Status;

    /// A simple mock editor for testing.
    struct MockEditor {
        inputs: Vec<ReadResult>,
        keywords: Vec<String>,
        history: Vec<String>,
    }

    impl MockEditor {
        fn new(inputs: Vec<&str>) -> Self {
            Self {
                inputs: inputs.into_iter().rev().map(|line| ReadResult::Line(line.to_string())).collect(),
                keywords: Vec::new(),
                history: Vec::new(),
            }
        }
    }

    impl LineEditor for MockEditor {
        fn read_line(&mut self, _prompt: &str) -> Result<ReadResult> {
            Ok(self.inputs.pop().unwrap_or(ReadResult::Eof))
        }

        fn read_continuation(&mut self, prompt: &str) -> Result<ReadResult> {
            self.read_line(prompt)
        }

        fn add_history(&mut self, line: &str) {
            self.history.push(line.to_string());
        }

        fn set_keywords(&mut self, keywords: Vec<String>) {
            self.keywords = keywords;
        }
    }

    fn repl(inputs: Vec<&str>) -> (tempfile::TempDir, Repl<MockEditor>) {
        let dir = tempfile::tempdir().unwrap();
        let config = KernelConfig::default()
            .with_store_dir(dir.path().join("store"))
            .with_working_dir(dir.path());
        let session = Session::new(config).unwrap();
        (dir, Repl::with_editor(MockEditor::new(inputs), session).without_banner())
    }

    #[test]
    fn execute_binds_and_evaluates() {
        let (_dir, mut repl) = repl(vec![]);
        assert_eq!(repl.execute("x = 20").status, Status::Ok);
        let reply = repl.execute("x * 2");
        assert_eq!(reply.display.unwrap().get(TEXT_PLAIN), Some("40"));
        assert!(repl.editor.keywords.contains(&"x".to_string()));
    }

    #[test]
    fn multi_line_input_is_joined() {
        let (_dir, mut repl) = repl(vec!["{", "  a = 1;", "}"]);
        let input = repl.read_input().unwrap().unwrap();
        assert_eq!(input, "{\n  a = 1;\n}");
    }

    #[test]
    fn run_consumes_all_input() {
        let (_dir, mut repl) = repl(vec!["y = 3", "", "y + 1"]);
        repl.run().unwrap();
        assert_eq!(repl.editor.history, vec!["y = 3", "y + 1"]);
        assert_eq!(repl.session().execution_count(), 2);
    }

    #[test]
    fn eof_inside_multi_line_input() {
        let (_dir, mut repl) = repl(vec!["let a = 1;"]);
        assert!(repl.read_input().is_err());
    }

    #[test]
    fn interrupted_line_is_dropped() {
        let (_dir, mut repl) = repl(vec![]);
        repl.editor.inputs = vec![ReadResult::Line("after".to_string()), ReadResult::Interrupted];
        assert_eq!(repl.read_input().unwrap().unwrap(), "");
        assert_eq!(repl.read_input().unwrap().unwrap(), "after");
    }

    #[test]
    fn load_file_updates_completion() {
        let (dir, mut repl) = repl(vec![]);
        let file = dir.path().join("lib.nix");
        std::fs::write(&file, "{ fromFile = 1; }").unwrap();
        repl.load_file(&file).unwrap();
        assert!(repl.editor.keywords.contains(&"fromFile".to_string()));
        assert_eq!(repl.session().loaded_files(), [file]);
    }

    #[test]
    fn bundles_without_text_are_described() {
        let bundle = DisplayBundle::single("text/html", "<b>x</b>");
        assert_eq!(describe_bundle(&bundle), "<display data: text/html>");
    }
}

//! Where a request's side output goes while it runs.

pub use nixkernel_store::OutputStream;

use crate::display::DisplayBundle;

/// Receives stream text and display data as they are produced.
///
/// Implementations forward immediately; nothing is held back until the
/// request finishes.
pub trait Output {
    /// Writes text to stdout or stderr.
    fn stream(&mut self, stream: OutputStream, text: &str);

    /// Shows rich display data outside the execution result.
    fn display(&mut self, bundle: DisplayBundle);

    /// Writes text to stdout.
    fn stdout(&mut self, text: &str) {
        self.stream(OutputStream::Stdout, text);
    }

    /// Writes text to stderr.
    fn stderr(&mut self, text: &str) {
        self.stream(OutputStream::Stderr, text);
    }
}

/// An output event, in the order it was produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Stream text.
    Stream(OutputStream, String),
    /// Display data.
    Display(DisplayBundle),
}

/// An [`Output`] that records everything, for tests and batch runs.
#[derive(Debug, Default)]
pub struct Collector {
    /// Recorded events.
    pub events: Vec<Event>,
}

impl Collector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all text written to `stream`, concatenated.
    #[must_use]
    pub fn text(&self, stream: OutputStream) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Stream(s, text) if *s == stream => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns all stdout text.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        self.text(OutputStream::Stdout)
    }

    /// Returns all stderr text.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        self.text(OutputStream::Stderr)
    }

    /// Returns the display bundles in order.
    #[must_use]
    pub fn displays(&self) -> Vec<&DisplayBundle> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Display(bundle) => Some(bundle),
                Event::Stream(..) => None,
            })
            .collect()
    }
}

impl Output for Collector {
    fn stream(&mut self, stream: OutputStream, text: &str) {
        if text.is_empty() {
            return;
        }
        self.events.push(Event::Stream(stream, text.to_string()));
    }

    fn display(&mut self, bundle: DisplayBundle) {
        self.events.push(Event::Display(bundle));
    }
}

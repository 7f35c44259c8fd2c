//! Session configuration.

use std::path::PathBuf;

use nixkernel_language::EvalConfig;
use nixkernel_language::eval::{DEFAULT_MAX_CALL_DEPTH, current_system, default_store_dir, parse_nix_path};
use nixkernel_store::process::DEFAULT_CHANNEL_CAPACITY;
use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::Session`].
///
/// Controls where builds go, how values are rendered and how errors are
/// reported.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Directory derivation outputs are built into.
    pub store_dir: PathBuf,

    /// Directory for `result-*` links, shell escapes and relative paths.
    pub working_dir: PathBuf,

    /// `<name>` lookup entries, consulted in order.
    pub search_path: Vec<(String, PathBuf)>,

    /// Colorize printed values.
    pub ansi_colors: bool,

    /// Include "while ..." frames in error tracebacks.
    pub show_trace: bool,

    /// Bound on nested function calls during evaluation.
    pub max_call_depth: usize,

    /// Lines buffered between a subprocess and the session.
    pub channel_capacity: usize,

    /// Value of `builtins.currentSystem` and the system builds run for.
    pub system: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            search_path: std::env::var("NIX_PATH")
                .map(|value| parse_nix_path(&value))
                .unwrap_or_default(),
            ansi_colors: false,
            show_trace: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            system: current_system(),
        }
    }
}

impl KernelConfig {
    /// Creates a configuration for the interactive console.
    #[must_use]
    pub fn console() -> Self {
        Self {
            ansi_colors: true,
            ..Self::default()
        }
    }

    /// Creates a configuration for serving notebook front-ends, which
    /// render ANSI colors in stream and result text.
    #[must_use]
    pub fn kernel() -> Self {
        Self {
            ansi_colors: true,
            ..Self::default()
        }
    }

    /// Builder method to set the store directory.
    #[must_use]
    pub fn with_store_dir(mut self, store_dir: impl Into<PathBuf>) -> Self {
        self.store_dir = store_dir.into();
        self
    }

    /// Builder method to set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    /// Builder method to add a `<name>` lookup entry ahead of the others.
    #[must_use]
    pub fn with_search_path_entry(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.search_path.insert(0, (name.into(), path.into()));
        self
    }

    /// Builder method to enable/disable colors.
    #[must_use]
    pub fn with_ansi_colors(mut self, ansi_colors: bool) -> Self {
        self.ansi_colors = ansi_colors;
        self
    }

    /// Builder method to enable/disable full error traces.
    #[must_use]
    pub fn with_show_trace(mut self, show_trace: bool) -> Self {
        self.show_trace = show_trace;
        self
    }

    /// Builder method to set the call depth bound.
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Builder method to set the subprocess channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Builder method to set the system string.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Returns the evaluator settings this configuration implies.
    #[must_use]
    pub fn eval_config(&self) -> EvalConfig {
        EvalConfig {
            store_dir: self.store_dir.clone(),
            search_path: self.search_path.clone(),
            current_system: self.system.clone(),
            max_call_depth: self.max_call_depth,
            base_dir: self.working_dir.clone(),
        }
    }
}

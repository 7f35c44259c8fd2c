//! Integration tests for Layer 3: Runtime
//!
//! Tests the session engine through its public requests.

mod completion;
mod properties;
mod session;

use nixkernel_runtime::display::TEXT_PLAIN;
use nixkernel_runtime::{Collector, ExecuteReply, KernelConfig, Session};

/// Creates a session whose store and working directory live in `dir`.
pub fn session_in(dir: &tempfile::TempDir) -> Session {
    let config = KernelConfig::default()
        .with_store_dir(dir.path().join("store"))
        .with_working_dir(dir.path())
        .with_system("test-system");
    Session::new(config).unwrap()
}

/// Runs one cell and returns the reply with everything it wrote.
pub fn run(session: &mut Session, code: &str) -> (ExecuteReply, Collector) {
    let mut out = Collector::new();
    let reply = session.execute(code, &mut out);
    (reply, out)
}

/// Runs one cell and returns its `text/plain` result.
pub fn plain(session: &mut Session, code: &str) -> String {
    let (reply, _) = run(session, code);
    reply
        .display
        .as_ref()
        .and_then(|display| display.get(TEXT_PLAIN))
        .map(str::to_string)
        .unwrap_or_else(|| panic!("no result for {code:?}: {:?}", reply.error))
}

//! End-to-end tests
//!
//! Drives the kernel over its JSON-lines transport the way a notebook
//! front-end would.

mod flakes;
mod notebook;

use nixkernel_runtime::{Kernel, KernelConfig, Session};
use serde_json::{Value, json};

/// Creates a kernel writing into a buffer, rooted in `dir`.
pub fn kernel_in(dir: &tempfile::TempDir) -> Kernel<Vec<u8>> {
    let config = KernelConfig::default()
        .with_store_dir(dir.path().join("store"))
        .with_working_dir(dir.path())
        .with_system("test-system");
    Kernel::new(Session::new(config).unwrap(), Vec::new())
}

/// Encodes one request line.
pub fn request(id: &str, msg_type: &str, content: Value) -> String {
    json!({"msg_id": id, "msg_type": msg_type, "content": content}).to_string()
}

/// Encodes an execute request.
pub fn execute(id: &str, code: &str) -> String {
    request(id, "execute_request", json!({"code": code}))
}

/// Feeds `lines` to a fresh kernel and returns every message it wrote.
pub fn converse(dir: &tempfile::TempDir, lines: &[String]) -> Vec<Value> {
    let mut kernel = kernel_in(dir);
    let mut input = lines.join("\n");
    input.push('\n');
    kernel.serve(input.as_bytes()).unwrap();
    parse(&kernel.into_writer())
}

/// Splits kernel output into messages.
pub fn parse(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Returns the messages answering request `id`, minus status messages.
pub fn replies<'a>(messages: &'a [Value], id: &str) -> Vec<&'a Value> {
    messages
        .iter()
        .filter(|m| m["parent_msg_id"] == id && m["msg_type"] != "status")
        .collect()
}

//! Message records exchanged with notebook front-ends.
//!
//! Requests arrive as an [`Envelope`] whose `content` is decoded according
//! to `msg_type`. Everything the kernel sends is a [`Message`]: replies and
//! IOPub-style notifications alike, each naming the request it belongs to.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::completeness::Completeness;
use crate::display::DisplayBundle;
use crate::errors::ErrorRecord;
use crate::session::Status;

/// Messaging protocol version announced in `kernel_info_reply`.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Implementation name announced in `kernel_info_reply`.
pub const IMPLEMENTATION: &str = "nixkernel";

/// Free-form metadata attached to display messages.
pub type Metadata = Map<String, serde_json::Value>;

// =============================================================================
// Requests
// =============================================================================

/// An incoming request before its content is decoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Identifier echoed as `parent_msg_id` on every resulting message.
    pub msg_id: String,
    /// Request kind, e.g. `execute_request`.
    pub msg_type: String,
    /// Kind-specific content.
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Content of `execute_request`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Cell text.
    pub code: String,
    /// Suppress the result and stream messages.
    #[serde(default)]
    pub silent: bool,
}

/// Content of `complete_request`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// Text being edited.
    pub code: String,
    /// Cursor position in characters.
    pub cursor_pos: usize,
}

/// Content of `inspect_request`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectRequest {
    /// Text being edited.
    pub code: String,
    /// Cursor position in characters.
    pub cursor_pos: usize,
    /// Requested detail, 0 or 1. Both get the same answer.
    #[serde(default)]
    pub detail_level: u8,
}

/// Content of `is_complete_request`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsCompleteRequest {
    /// Text to classify.
    pub code: String,
}

/// Content of `shutdown_request`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRequest {
    /// Whether the front-end intends to start a new kernel.
    #[serde(default)]
    pub restart: bool,
}

// =============================================================================
// Outgoing messages
// =============================================================================

/// A message sent to the front-end.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    /// `msg_id` of the request this message answers or accompanies.
    pub parent_msg_id: String,
    /// Kind and content.
    #[serde(flatten)]
    pub body: Body,
}

impl Message {
    /// Creates a message belonging to `parent`.
    #[must_use]
    pub fn new(parent: &str, body: Body) -> Self {
        Self {
            parent_msg_id: parent.to_string(),
            body,
        }
    }
}

/// Outgoing message kinds, serialized as `msg_type` plus `content`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "msg_type", content = "content", rename_all = "snake_case")]
pub enum Body {
    /// Kernel busy/idle notification.
    Status(StatusContent),
    /// Stream text.
    Stream(StreamContent),
    /// Rich output outside the execution result.
    DisplayData(DisplayData),
    /// The value of a cell.
    ExecuteResult(ExecuteResult),
    /// A failed cell.
    Error(ErrorRecord),
    /// Reply to `execute_request`.
    ExecuteReply(ExecuteReplyContent),
    /// Reply to `complete_request`.
    CompleteReply(CompleteReply),
    /// Reply to `inspect_request`.
    InspectReply(InspectReply),
    /// Reply to `is_complete_request`.
    IsCompleteReply(IsCompleteReply),
    /// Reply to `kernel_info_request`.
    KernelInfoReply(KernelInfoReply),
    /// Reply to `shutdown_request`.
    ShutdownReply(ShutdownReply),
    /// Reply to `interrupt_request`.
    InterruptReply(InterruptReply),
}

/// Reply to a request whose content could not be decoded.
///
/// Sent in place of the kind-specific reply so the front-end is never left
/// waiting on the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedReply {
    /// `msg_id` of the request.
    pub parent_msg_id: String,
    /// `<kind>_reply` for a `<kind>_request`.
    pub msg_type: String,
    /// Status and error fields.
    pub content: FailedReplyContent,
}

impl FailedReply {
    /// Creates the error reply to a `request_type` request.
    #[must_use]
    pub fn new(parent: &str, request_type: &str, error: ErrorRecord) -> Self {
        let kind = request_type.strip_suffix("_request").unwrap_or(request_type);
        Self {
            parent_msg_id: parent.to_string(),
            msg_type: format!("{kind}_reply"),
            content: FailedReplyContent {
                status: Status::Error,
                error,
            },
        }
    }
}

/// Content of a [`FailedReply`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedReplyContent {
    /// Always `error`.
    pub status: Status,
    /// What was wrong with the request.
    #[serde(flatten)]
    pub error: ErrorRecord,
}

/// Kernel activity state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    /// Handling a request.
    Busy,
    /// Waiting for the next request.
    Idle,
    /// Starting up.
    Starting,
}

/// Content of `status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusContent {
    /// Current state.
    pub execution_state: ExecutionState,
}

/// Content of `stream`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamContent {
    /// `stdout` or `stderr`.
    pub name: String,
    /// The text, newlines included.
    pub text: String,
}

/// Content of `display_data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayData {
    /// MIME type to content.
    pub data: DisplayBundle,
    /// Always empty.
    pub metadata: Metadata,
}

/// Content of `execute_result`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Count of the request that produced the value.
    pub execution_count: u32,
    /// MIME type to content.
    pub data: DisplayBundle,
    /// Always empty.
    pub metadata: Metadata,
}

/// Content of `execute_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteReplyContent {
    /// Outcome.
    pub status: Status,
    /// Count of this request.
    pub execution_count: u32,
    /// Error fields, present when `status` is `error`.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

/// Content of `complete_reply`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompleteReply {
    /// Always `ok`.
    pub status: Status,
    /// Candidates, best first.
    pub matches: Vec<String>,
    /// Start of the replaced range, in characters.
    pub cursor_start: usize,
    /// End of the replaced range, in characters.
    pub cursor_end: usize,
    /// Always empty.
    pub metadata: Metadata,
}

/// Content of `inspect_reply`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectReply {
    /// Always `ok`.
    pub status: Status,
    /// Whether documentation was found.
    pub found: bool,
    /// Markdown documentation when found, empty otherwise.
    pub data: DisplayBundle,
    /// Always empty.
    pub metadata: Metadata,
}

/// Content of `is_complete_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsCompleteReply {
    /// Classification of the text.
    pub status: Completeness,
    /// Indentation for the next line, sent with `incomplete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent: Option<String>,
}

/// Language description inside `kernel_info_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// Language name.
    pub name: String,
    /// Language version.
    pub version: String,
    /// MIME type of source files.
    pub mimetype: String,
    /// Source file extension, with the dot.
    pub file_extension: String,
}

/// Content of `kernel_info_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelInfoReply {
    /// Always `ok`.
    pub status: Status,
    /// Messaging protocol version.
    pub protocol_version: String,
    /// Kernel implementation name.
    pub implementation: String,
    /// Kernel implementation version.
    pub implementation_version: String,
    /// The language served.
    pub language_info: LanguageInfo,
    /// Text shown when a console connects.
    pub banner: String,
}

impl Default for KernelInfoReply {
    fn default() -> Self {
        Self {
            status: Status::Ok,
            protocol_version: PROTOCOL_VERSION.to_string(),
            implementation: IMPLEMENTATION.to_string(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            language_info: LanguageInfo {
                name: "nix".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                mimetype: "text/x-nix".to_string(),
                file_extension: ".nix".to_string(),
            },
            banner: format!("nixkernel {}: an interactive kernel for Nix", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Content of `shutdown_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReply {
    /// Always `ok`.
    pub status: Status,
    /// Echo of the request's flag.
    pub restart: bool,
}

/// Content of `interrupt_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptReply {
    /// Always `ok`.
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(body: Body) -> serde_json::Value {
        serde_json::to_value(Message::new("m1", body)).unwrap()
    }

    #[test]
    fn envelope_content_defaults() {
        let envelope: Envelope = serde_json::from_str(r#"{"msg_id":"a","msg_type":"kernel_info_request"}"#).unwrap();
        assert_eq!(envelope.content, serde_json::Value::Null);

        let envelope: Envelope =
            serde_json::from_str(r#"{"msg_id":"b","msg_type":"execute_request","content":{"code":"1"}}"#).unwrap();
        let request: ExecuteRequest = serde_json::from_value(envelope.content).unwrap();
        assert_eq!(request.code, "1");
        assert!(!request.silent);
    }

    #[test]
    fn message_layout() {
        let value = encode(Body::Status(StatusContent {
            execution_state: ExecutionState::Busy,
        }));
        assert_eq!(
            value,
            json!({"parent_msg_id": "m1", "msg_type": "status", "content": {"execution_state": "busy"}})
        );
    }

    #[test]
    fn execute_reply_flattens_errors() {
        let ok = encode(Body::ExecuteReply(ExecuteReplyContent {
            status: Status::Ok,
            execution_count: 3,
            error: None,
        }));
        assert_eq!(ok["content"], json!({"status": "ok", "execution_count": 3}));

        let failed = encode(Body::ExecuteReply(ExecuteReplyContent {
            status: Status::Error,
            execution_count: 4,
            error: Some(ErrorRecord {
                ename: "TypeError".to_string(),
                evalue: "expected a set".to_string(),
                traceback: vec!["error: expected a set".to_string()],
            }),
        }));
        assert_eq!(failed["content"]["status"], "error");
        assert_eq!(failed["content"]["ename"], "TypeError");
        assert_eq!(failed["content"]["traceback"][0], "error: expected a set");
    }

    #[test]
    fn failed_reply_names_the_reply_kind() {
        let error = ErrorRecord {
            ename: "EvaluationError".to_string(),
            evalue: "bad".to_string(),
            traceback: vec!["error: bad".to_string()],
        };
        let value = serde_json::to_value(FailedReply::new("m1", "complete_request", error)).unwrap();
        assert_eq!(value["parent_msg_id"], "m1");
        assert_eq!(value["msg_type"], "complete_reply");
        assert_eq!(value["content"]["status"], "error");
        assert_eq!(value["content"]["evalue"], "bad");
    }

    #[test]
    fn kernel_info() {
        let value = encode(Body::KernelInfoReply(KernelInfoReply::default()));
        assert_eq!(value["msg_type"], "kernel_info_reply");
        assert_eq!(value["content"]["protocol_version"], "5.3");
        assert_eq!(value["content"]["implementation"], "nixkernel");
        assert_eq!(value["content"]["language_info"]["name"], "nix");
        assert_eq!(value["content"]["language_info"]["mimetype"], "text/x-nix");
        assert_eq!(value["content"]["language_info"]["file_extension"], ".nix");
    }

    #[test]
    fn is_complete_indent_only_when_set() {
        let complete = encode(Body::IsCompleteReply(IsCompleteReply {
            status: Completeness::Complete,
            indent: None,
        }));
        assert_eq!(complete["content"], json!({"status": "complete"}));

        let incomplete = encode(Body::IsCompleteReply(IsCompleteReply {
            status: Completeness::Incomplete,
            indent: Some(String::new()),
        }));
        assert_eq!(incomplete["content"], json!({"status": "incomplete", "indent": ""}));
    }
}

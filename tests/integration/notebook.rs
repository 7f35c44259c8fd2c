//! Notebook sessions over the JSON-lines transport

use serde_json::json;

use crate::{converse, execute, replies, request};

// =============================================================================
// Execution
// =============================================================================

#[test]
fn cells_share_one_environment() {
    let dir = tempfile::tempdir().unwrap();
    let messages = converse(
        &dir,
        &[
            execute("1", "a = 20"),
            execute("2", "b = a + 1"),
            execute("3", "a + b"),
        ],
    );

    let first = replies(&messages, "1");
    assert_eq!(first[0]["msg_type"], "stream");
    assert_eq!(first[0]["content"]["text"], "Added 1 variables.\n");

    let third = replies(&messages, "3");
    assert_eq!(third[0]["msg_type"], "execute_result");
    assert_eq!(third[0]["content"]["data"]["text/plain"], "41");
    assert_eq!(third[1]["content"]["execution_count"], 3);
}

#[test]
fn every_request_is_bracketed_by_status() {
    let dir = tempfile::tempdir().unwrap();
    let messages = converse(&dir, &[execute("x", "1"), execute("y", "nope")]);
    for id in ["x", "y"] {
        let states: Vec<&str> = messages
            .iter()
            .filter(|m| m["parent_msg_id"] == id && m["msg_type"] == "status")
            .map(|m| m["content"]["execution_state"].as_str().unwrap())
            .collect();
        assert_eq!(states, ["busy", "idle"]);
    }
}

#[test]
fn errors_carry_a_traceback() {
    let dir = tempfile::tempdir().unwrap();
    let messages = converse(&dir, &[execute("e", "let f = x: x.missing; in f { }")]);
    let answer = replies(&messages, "e");
    assert_eq!(answer[0]["msg_type"], "error");
    assert_eq!(answer[0]["content"]["ename"], "EvaluationError");
    let traceback = answer[0]["content"]["traceback"].as_array().unwrap();
    assert!(traceback[0].as_str().unwrap().starts_with("error: "));
    assert_eq!(answer[1]["content"]["status"], "error");
}

#[test]
fn rich_values_publish_every_mime_type() {
    let dir = tempfile::tempdir().unwrap();
    let code = r#"{ _toMime = { "text/html" = "<b>x</b>"; "text/plain" = "x"; }; }"#;
    let messages = converse(&dir, &[execute("r", code)]);
    let result = &replies(&messages, "r")[0]["content"]["data"];
    assert_eq!(result, &json!({"text/html": "<b>x</b>", "text/plain": "x"}));
}

#[test]
fn shell_output_streams() {
    let dir = tempfile::tempdir().unwrap();
    let messages = converse(&dir, &[execute("s", "!echo out; echo err >&2")]);
    let streams: Vec<(&str, &str)> = replies(&messages, "s")
        .iter()
        .filter(|m| m["msg_type"] == "stream")
        .map(|m| (m["content"]["name"].as_str().unwrap(), m["content"]["text"].as_str().unwrap()))
        .collect();
    assert!(streams.contains(&("stdout", "out\n")));
    assert!(streams.contains(&("stderr", "err\n")));
}

// =============================================================================
// Side Requests
// =============================================================================

#[test]
fn completion_sees_earlier_cells() {
    let dir = tempfile::tempdir().unwrap();
    let messages = converse(
        &dir,
        &[
            execute("1", "projectName = \"demo\""),
            request("c", "complete_request", json!({"code": "proj", "cursor_pos": 4})),
        ],
    );
    let reply = replies(&messages, "c")[0];
    assert_eq!(reply["msg_type"], "complete_reply");
    assert_eq!(reply["content"]["matches"], json!(["projectName"]));
}

#[test]
fn inspect_reports_missing_names() {
    let dir = tempfile::tempdir().unwrap();
    let messages = converse(
        &dir,
        &[request("i", "inspect_request", json!({"code": "zzz", "cursor_pos": 1}))],
    );
    let reply = replies(&messages, "i")[0];
    assert_eq!(reply["content"]["found"], false);
}

#[test]
fn is_complete_gives_three_answers() {
    let dir = tempfile::tempdir().unwrap();
    let messages = converse(
        &dir,
        &[
            request("a", "is_complete_request", json!({"code": "1 + 1"})),
            request("b", "is_complete_request", json!({"code": "let x ="})),
            request("c", "is_complete_request", json!({"code": "1 + )"})),
        ],
    );
    assert_eq!(replies(&messages, "a")[0]["content"]["status"], "complete");
    assert_eq!(replies(&messages, "b")[0]["content"]["status"], "incomplete");
    assert_eq!(replies(&messages, "c")[0]["content"]["status"], "invalid");
}

#[test]
fn shutdown_ends_the_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let messages = converse(
        &dir,
        &[
            request("s", "shutdown_request", json!({"restart": true})),
            execute("late", "1"),
        ],
    );
    let reply = replies(&messages, "s")[0];
    assert_eq!(reply["msg_type"], "shutdown_reply");
    assert_eq!(reply["content"]["restart"], true);
    assert!(replies(&messages, "late").is_empty());
}

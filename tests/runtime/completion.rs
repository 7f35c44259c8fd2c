//! Integration tests for completion, inspection and completeness

use nixkernel_runtime::Completeness;

use crate::{run, session_in};

#[test]
fn session_names_complete_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    run(&mut session, "mapping = { }");
    let completion = session.complete("map", 3);
    assert_eq!(completion.matches.first().map(String::as_str), Some("mapping"));
    assert!(completion.matches.contains(&"map".to_string()));
    assert_eq!((completion.cursor_start, completion.cursor_end), (0, 3));
}

#[test]
fn attribute_paths_complete_against_values() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    run(&mut session, "cfg = { port = 80; portRange = [ ]; host = \"h\"; }");
    let completion = session.complete("cfg.po", 6);
    assert_eq!(completion.matches, vec!["port", "portRange"]);
    assert_eq!(completion.cursor_start, 4);
}

#[test]
fn completion_does_not_leak_traces() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    run(&mut session, "noisy = builtins.trace \"loud\" { a = 1; }");
    assert_eq!(session.complete("noisy.", 6).matches, vec!["a"]);
    let (_, out) = run(&mut session, "1");
    assert!(out.stderr_text().is_empty());
}

#[test]
fn inspection_finds_builtins_and_commands() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir);
    let doc = session.inspect("builtins.toJSON x", 10).unwrap();
    assert_eq!(doc.name, "toJSON");
    assert!(session.inspect(":help", 2).is_some());
    assert!(session.inspect("neverBound", 3).is_none());
}

#[test]
fn completeness_of_console_input() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir);
    assert_eq!(session.is_complete(""), Completeness::Complete);
    assert_eq!(session.is_complete("1 + 1"), Completeness::Complete);
    assert_eq!(session.is_complete("[ 1 2"), Completeness::Incomplete);
    assert_eq!(session.is_complete("1 + )"), Completeness::Invalid);
    assert_eq!(session.is_complete(":p {"), Completeness::Incomplete);
    assert_eq!(session.is_complete("!echo a \\"), Completeness::Incomplete);
}

//! Integration tests for cells, commands and the session environment

use std::fs;
use std::thread;
use std::time::Duration;

use nixkernel_runtime::{KernelConfig, Provenance, Session, Status, on_session_thread};

use crate::{plain, run, session_in};

// =============================================================================
// Cells
// =============================================================================

#[test]
fn bindings_persist_across_requests() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    run(&mut session, "base = 40");
    run(&mut session, "offset = 2");
    assert_eq!(plain(&mut session, "base + offset"), "42");
    assert_eq!(session.execution_count(), 3);
}

#[test]
fn later_bindings_shadow_earlier_ones() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    run(&mut session, "x = 1");
    run(&mut session, "x = x + 10");
    assert_eq!(plain(&mut session, "x"), "11");
    assert_eq!(session.environment().history().filter(|b| b.name == "x").count(), 2);
}

#[test]
fn mixed_cell_runs_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    let code = "greeting = \"hi\"\n:p greeting\n!echo from-shell\ngreeting + \"!\"";
    let (reply, out) = run(&mut session, code);
    assert!(reply.is_ok());
    assert_eq!(out.stdout_text(), "Added 1 variables.\nhi\nfrom-shell\n");
    assert_eq!(reply.display.unwrap().get("text/plain"), Some("\"hi!\""));
}

#[test]
fn failed_cell_keeps_earlier_bindings() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    let (reply, _) = run(&mut session, "kept = 5\nthrow \"stop\"\nlost = 6");
    assert_eq!(reply.status, Status::Error);
    assert!(session.environment().contains("kept"));
    assert!(!session.environment().contains("lost"));
}

// =============================================================================
// Error Reports
// =============================================================================

#[test]
fn tracebacks_start_with_the_message() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    let (reply, _) = run(&mut session, "missingName");
    let error = reply.error.unwrap();
    assert_eq!(error.ename, "UndefinedVarError");
    assert_eq!(error.traceback[0], "error: undefined variable 'missingName'");
}

#[test]
fn unknown_commands_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    let (reply, _) = run(&mut session, ":frobnicate");
    let error = reply.error.unwrap();
    assert_eq!(error.ename, "UnknownCommandError");
    assert_eq!(error.evalue, "unknown command ':frobnicate'");
}

#[test]
fn parse_errors_are_categorized() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    let (reply, _) = run(&mut session, "{ a = ; }");
    assert_eq!(reply.error.unwrap().ename, "ParseError");
}

#[test]
fn interrupt_stops_a_running_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    let interrupt = session.interrupt().clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        interrupt.trigger();
    });
    let code = "builtins.foldl' (a: _: builtins.foldl' (b: _: b + 1) a (builtins.genList (x: x) 1000)) \
                0 (builtins.genList (x: x) 1000000)";
    let (reply, _) = run(&mut session, code);
    handle.join().unwrap();
    assert_eq!(reply.status, Status::Error);
    assert_eq!(reply.error.unwrap().ename, "Interrupted");
    assert_eq!(plain(&mut session, "1 + 1"), "2");
}

#[test]
fn deep_recursion_reports_call_depth_on_the_session_thread() {
    let message = on_session_thread(|| {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(&dir);
        let code = "let f = n: if n == 0 then 0 else 1 + f (n - 1); in f 100000";
        let (reply, _) = run(&mut session, code);
        assert_eq!(reply.status, Status::Error);
        let evalue = reply.error.unwrap().evalue;
        (evalue, plain(&mut session, "1 + 1"))
    })
    .unwrap();
    let (evalue, after) = message;
    assert!(evalue.contains("max-call-depth"), "{evalue}");
    assert_eq!(after, "2");
}

// =============================================================================
// Files and Search Paths
// =============================================================================

#[test]
fn loaded_bindings_record_their_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("lib.nix");
    fs::write(&file, "{ double = x: x * 2; }").unwrap();
    let mut session = session_in(&dir);

    run(&mut session, ":load lib.nix");
    assert_eq!(plain(&mut session, "double 21"), "42");
    let binding = session.environment().get("double").unwrap();
    assert_eq!(binding.provenance, Provenance::File(file));
}

#[test]
fn search_path_entries_resolve_for_load() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("mylib");
    fs::create_dir(&lib).unwrap();
    fs::write(lib.join("default.nix"), "{ answer = 42; }").unwrap();

    let config = KernelConfig::default()
        .with_store_dir(dir.path().join("store"))
        .with_working_dir(dir.path())
        .with_search_path_entry("mylib", lib.clone())
        .with_system("test-system");
    let mut session = Session::new(config).unwrap();

    let (reply, _) = run(&mut session, ":l <mylib>");
    assert!(reply.is_ok(), "{:?}", reply.error);
    assert_eq!(plain(&mut session, "answer"), "42");
}

#[test]
fn reload_picks_up_edits() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("conf.nix");
    fs::write(&file, "{ level = 1; }").unwrap();
    let mut session = session_in(&dir);

    run(&mut session, ":l conf.nix");
    fs::write(&file, "{ level = 2; }").unwrap();
    assert_eq!(plain(&mut session, "level"), "1");
    run(&mut session, ":r");
    assert_eq!(plain(&mut session, "level"), "2");
}

// =============================================================================
// Builds
// =============================================================================

#[test]
fn build_command_realizes_bound_derivations() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(&dir);
    run(
        &mut session,
        r#"pkg = derivation { name = "pkg"; system = "test-system"; builder = "/bin/sh"; args = [ "-c" "echo built > $out" ]; }"#,
    );

    let (reply, out) = run(&mut session, ":b pkg");
    assert!(reply.is_ok(), "{:?}", reply.error);
    let stdout = out.stdout_text();
    assert!(stdout.contains("This derivation produced the following outputs:"));
    assert!(!dir.path().join("result-out").exists());

    let printed = plain(&mut session, "pkg");
    assert!(printed.starts_with("«derivation "));
}

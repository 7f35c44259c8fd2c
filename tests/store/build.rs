//! Integration tests for realizing evaluated derivations

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nixkernel_foundation::{ErrorCategory, Interrupt, Result};
use nixkernel_language::{EvalConfig, Evaluator, Value};
use nixkernel_store::{LocalStore, ProcessRunner, Store};

struct Fixture {
    _dir: tempfile::TempDir,
    ev: Evaluator,
    store: LocalStore,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store_dir = dir.path().join("store");
    let config = EvalConfig {
        store_dir: store_dir.clone(),
        current_system: "test-system".to_string(),
        base_dir: dir.path().to_path_buf(),
        ..EvalConfig::default()
    };
    let ev = Evaluator::new(config, Interrupt::new());
    let runner = Arc::new(ProcessRunner::new(16).unwrap());
    let store = LocalStore::new(store_dir, runner).with_system("test-system");
    Fixture { _dir: dir, ev, store }
}

fn eval(f: &Fixture, source: &str) -> Value {
    f.ev.eval_str(source, f.ev.globals()).unwrap()
}

fn realize(f: &Fixture, value: &Value, interrupt: &Interrupt) -> (Result<BTreeMap<String, PathBuf>>, Vec<String>) {
    let drv = f.ev.derivation_of(value).unwrap().unwrap();
    let mut lines = Vec::new();
    let resolve = |path: &str| f.ev.derivation(path);
    let result = f.store.realize(&drv, &resolve, &mut |line| lines.push(line.to_string()), interrupt);
    (result, lines)
}

const CHAIN: &str = r#"
let
  dep = derivation {
    name = "dep";
    system = "test-system";
    builder = "/bin/sh";
    args = [ "-c" "echo from-dep > $out" ];
  };
in derivation {
  name = "top";
  system = "test-system";
  builder = "/bin/sh";
  args = [ "-c" "while read line; do echo \"top sees $line\"; done < ${dep} > $out" ];
}
"#;

// =============================================================================
// Dependency Chains
// =============================================================================

#[test]
fn inputs_are_realized_before_dependents() {
    let f = fixture();
    let value = eval(&f, CHAIN);
    let (result, lines) = realize(&f, &value, &Interrupt::new());

    let outputs = result.unwrap();
    assert_eq!(fs::read_to_string(&outputs["out"]).unwrap(), "top sees from-dep\n");
    let building: Vec<&String> = lines.iter().filter(|l| l.starts_with("building '")).collect();
    assert_eq!(building.len(), 2);
    assert!(building[0].contains("-dep.drv"));
    assert!(building[1].contains("-top.drv"));
}

#[test]
fn second_realization_reuses_outputs() {
    let f = fixture();
    let value = eval(&f, CHAIN);
    realize(&f, &value, &Interrupt::new()).0.unwrap();
    let (result, lines) = realize(&f, &value, &Interrupt::new());
    assert!(result.is_ok());
    assert!(lines.is_empty());
}

#[test]
fn build_logs_are_kept_per_derivation() {
    let f = fixture();
    let value = eval(
        &f,
        r#"derivation { name = "chatty"; system = "test-system"; builder = "/bin/sh"; args = [ "-c" "echo one; echo two; echo > $out" ]; }"#,
    );
    realize(&f, &value, &Interrupt::new()).0.unwrap();
    let drv = f.ev.derivation_of(&value).unwrap().unwrap();
    let log = f.store.build_log(&drv.drv_path).unwrap();
    assert!(log.contains("one\ntwo\n"));
    assert!(f.store.build_log("/nowhere/missing.drv").is_none());
}

// =============================================================================
// Failure and Interruption
// =============================================================================

#[test]
fn foreign_systems_are_refused() {
    let f = fixture();
    let value = eval(
        &f,
        r#"derivation { name = "alien"; system = "other-system"; builder = "/bin/sh"; args = [ "-c" "echo > $out" ]; }"#,
    );
    let err = realize(&f, &value, &Interrupt::new()).0.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Build);
    assert!(err.to_string().contains("other-system"));
}

#[test]
fn interrupt_stops_a_running_builder() {
    let f = fixture();
    let value = eval(
        &f,
        r#"derivation { name = "spin"; system = "test-system"; builder = "/bin/sh"; args = [ "-c" "echo started; while :; do :; done" ]; }"#,
    );
    let interrupt = Interrupt::new();
    let trigger = interrupt.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        trigger.trigger();
    });

    let (result, _) = realize(&f, &value, &interrupt);
    handle.join().unwrap();
    assert_eq!(result.unwrap_err().category(), ErrorCategory::Interrupted);

    let drv = f.ev.derivation_of(&value).unwrap().unwrap();
    assert!(!drv.outputs["out"].exists());
}

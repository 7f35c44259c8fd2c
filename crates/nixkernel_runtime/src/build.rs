//! Realizing derivations for `:build` and `:build-local`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nixkernel_foundation::{Error, Interrupt, Result};
use nixkernel_language::{Evaluator, Value};
use nixkernel_store::{Store, link_name, replace_symlink};
use tracing::{info, instrument};

use crate::output::Output;

/// Message for values that are not derivations.
pub const NOT_A_DERIVATION: &str = "expression does not evaluate to a derivation.";

/// Where a build leaves its results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode<'a> {
    /// Only in the store.
    Store,
    /// In the store, with `result-<output>` links in the given directory.
    Local(&'a Path),
}

/// Builds the derivation `value` evaluates to and reports its outputs.
///
/// Builder lines go to stdout as they arrive, so a failing build has
/// already shown its log when the error is returned.
///
/// # Errors
///
/// Returns a build error if `value` is not a derivation or the build
/// fails, an I/O error if a result link cannot be created, and an
/// interruption error if `interrupt` is raised.
#[instrument(skip_all, fields(mode = ?mode))]
pub fn build(
    ev: &Evaluator,
    store: &dyn Store,
    value: &Value,
    mode: BuildMode<'_>,
    interrupt: &Interrupt,
    out: &mut dyn Output,
) -> Result<BTreeMap<String, PathBuf>> {
    let drv = ev
        .derivation_of(value)?
        .ok_or_else(|| Error::build(NOT_A_DERIVATION))?;

    out.stdout(&format!("Building {}\n", drv.drv_path));
    let outputs = store.realize(
        &drv,
        &|path| ev.derivation(path),
        &mut |line| out.stdout(&format!("{line}\n")),
        interrupt,
    )?;
    info!(drv = %drv.drv_path, outputs = outputs.len(), "build finished");

    out.stdout("\nThis derivation produced the following outputs:\n");
    for (output, path) in &outputs {
        match mode {
            BuildMode::Store => out.stdout(&format!("  {output} -> {}\n", path.display())),
            BuildMode::Local(dir) => {
                let link = link_name(output);
                replace_symlink(path, &dir.join(&link))
                    .map_err(|e| Error::build(e.to_string()))?;
                out.stdout(&format!("  ./{link} -> {}\n", path.display()));
            }
        }
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use nixkernel_foundation::ErrorCategory;
    use nixkernel_language::EvalConfig;
    use nixkernel_store::{LocalStore, ProcessRunner};

    use crate::output::Collector;

    struct Fixture {
        dir: tempfile::TempDir,
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
        Fixture { dir, ev, store }
    }

    fn drv_value(f: &Fixture, name: &str, script: &str) -> Value {
        let source = format!(
            r#"derivation {{ name = "{name}"; system = "test-system"; builder = "/bin/sh"; args = [ "-c" "{script}" ]; }}"#
        );
        f.ev.eval_str(&source, f.ev.globals()).unwrap()
    }

    #[test]
    fn store_build_reports_outputs() {
        let f = fixture();
        let value = drv_value(&f, "hello", "echo hello-build; echo done > $out");
        let mut out = Collector::new();
        let outputs = build(&f.ev, &f.store, &value, BuildMode::Store, &Interrupt::new(), &mut out).unwrap();

        let stdout = out.stdout_text();
        assert!(stdout.starts_with("Building "));
        assert!(stdout.contains("hello-build\n"));
        assert!(stdout.contains("This derivation produced the following outputs:"));
        assert!(stdout.contains(&format!("  out -> {}\n", outputs["out"].display())));
        assert_eq!(fs::read_to_string(&outputs["out"]).unwrap(), "done\n");
    }

    #[test]
    fn local_build_links_results() {
        let f = fixture();
        let work = f.dir.path().join("work");
        fs::create_dir(&work).unwrap();
        let value = drv_value(&f, "local", "echo local > $out");
        let mut out = Collector::new();
        let outputs = build(&f.ev, &f.store, &value, BuildMode::Local(&work), &Interrupt::new(), &mut out).unwrap();

        let link = work.join("result-out");
        assert_eq!(fs::read_link(&link).unwrap(), outputs["out"]);
        assert!(out.stdout_text().contains("  ./result-out -> "));

        let value = drv_value(&f, "local2", "echo second > $out");
        build(&f.ev, &f.store, &value, BuildMode::Local(&work), &Interrupt::new(), &mut Collector::new()).unwrap();
        assert_eq!(fs::read_to_string(&link).unwrap(), "second\n");
    }

    #[test]
    fn failing_builder_keeps_streamed_lines() {
        let f = fixture();
        let value = drv_value(&f, "broken", "echo partial-log; exit 3");
        let mut out = Collector::new();
        let err = build(&f.ev, &f.store, &value, BuildMode::Store, &Interrupt::new(), &mut out).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Build);
        assert!(out.stdout_text().contains("partial-log\n"));
        assert!(!out.stdout_text().contains("produced the following outputs"));
    }

    #[test]
    fn non_derivations_are_rejected() {
        let f = fixture();
        let value = f.ev.eval_str("{ a = 1; }", f.ev.globals()).unwrap();
        let err = build(&f.ev, &f.store, &value, BuildMode::Store, &Interrupt::new(), &mut Collector::new())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Build);
        assert_eq!(err.to_string(), NOT_A_DERIVATION);
    }
}

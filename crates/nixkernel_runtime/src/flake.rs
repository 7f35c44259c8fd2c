//! Loading local flakes for `:load-flake`.
//!
//! A flake is a directory with a `flake.nix` whose `outputs` function is
//! called with its resolved inputs and `self`. Only `path:` references and
//! plain directories are understood; inputs are resolved relative to the
//! flake that declares them.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use nixkernel_foundation::{Error, ErrorKind, Result};
use nixkernel_language::eval::normalize_path;
use nixkernel_language::{AttrSet, Evaluator, Thunk, Value};
use tracing::{debug, instrument};

/// File that marks a flake directory.
pub const FLAKE_FILE: &str = "flake.nix";

/// Resolves a flake reference to a directory.
///
/// # Errors
///
/// Fails for reference kinds other than `path:` and local paths.
pub fn resolve_reference(reference: &str, base: &Path) -> Result<PathBuf> {
    let path = match reference.strip_prefix("path:") {
        Some(rest) => rest.split('?').next().unwrap_or(rest),
        None if reference.contains(':') => {
            return Err(Error::eval(format!(
                "unsupported flake reference '{reference}'; only 'path:' references and local directories can be loaded"
            )));
        }
        None => reference,
    };
    if path.is_empty() {
        return Err(Error::eval(format!("flake reference '{reference}' has no path")));
    }
    let path = Path::new(path);
    let path = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    Ok(normalize_path(&path))
}

/// Loads the flake `reference` names and returns its outputs merged with
/// `outPath`, `inputs`, `outputs`, `sourceInfo` and `_type = "flake"`.
///
/// # Errors
///
/// Returns errors from resolving the reference or its inputs, evaluating
/// `flake.nix`, or calling `outputs`. Input cycles are rejected.
#[instrument(skip(ev, base))]
pub fn load(ev: &Evaluator, reference: &str, base: &Path) -> Result<Value> {
    let dir = resolve_reference(reference, base)?;
    let mut loading = Vec::new();
    call_flake(ev, &dir, &mut loading)
}

fn call_flake(ev: &Evaluator, dir: &Path, loading: &mut Vec<PathBuf>) -> Result<Value> {
    let dir = std::fs::canonicalize(dir)
        .map_err(|e| Error::io(format!("cannot open flake '{}'", dir.display()), &e))?;
    if loading.contains(&dir) {
        return Err(Error::eval(format!("flake input cycle through '{}'", dir.display())));
    }
    let file = dir.join(FLAKE_FILE);
    if !file.is_file() {
        return Err(Error::eval(format!("path '{}' does not contain a '{FLAKE_FILE}'", dir.display())));
    }
    debug!(dir = %dir.display(), "calling flake");

    let top = ev.import(&file)?;
    let top = top.as_attrs()?;
    let outputs_fn = top
        .get("outputs")
        .ok_or_else(|| Error::eval(format!("flake '{}' lacks attribute 'outputs'", dir.display())))?
        .force(ev)?;

    loading.push(dir.clone());
    let inputs = match top.get("inputs") {
        Some(declared) => resolve_inputs(ev, &declared.force(ev)?, &dir, loading),
        None => Ok(AttrSet::new()),
    };
    loading.pop();
    let inputs = Rc::new(inputs?);

    // `self` is the finished flake, which exists only after `outputs` ran.
    let finished: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    let self_thunk = {
        let finished = Rc::clone(&finished);
        Thunk::lazy(move |_| {
            finished
                .borrow()
                .clone()
                .ok_or_else(|| Error::new(ErrorKind::InfiniteRecursion))
        })
    };
    let mut args = (*inputs).clone();
    args.insert("self", self_thunk);

    let outputs = ev.call(&outputs_fn, Thunk::ready(Value::attrs(args)))?;
    let source_info: AttrSet = [("outPath".to_string(), path_thunk(&dir))].into_iter().collect();
    let extra: AttrSet = [
        ("outPath".to_string(), path_thunk(&dir)),
        ("inputs".to_string(), Thunk::ready(Value::Attrs(inputs))),
        ("outputs".to_string(), Thunk::ready(outputs.clone())),
        ("sourceInfo".to_string(), Thunk::ready(Value::attrs(source_info))),
        ("_type".to_string(), Thunk::ready(Value::string("flake"))),
    ]
    .into_iter()
    .collect();
    let flake = Value::attrs(outputs.as_attrs()?.update(&extra));
    *finished.borrow_mut() = Some(flake.clone());
    Ok(flake)
}

fn resolve_inputs(ev: &Evaluator, declared: &Value, dir: &Path, loading: &mut Vec<PathBuf>) -> Result<AttrSet> {
    let mut inputs = AttrSet::new();
    for (name, spec) in declared.as_attrs()?.iter() {
        let spec = spec.force(ev)?;
        let spec = spec.as_attrs()?;
        let url = spec
            .get("url")
            .ok_or_else(|| Error::eval(format!("flake input '{name}' has no 'url'")))?
            .force(ev)?;
        let path = resolve_reference(url.as_string()?.as_str(), dir)?;
        let is_flake = match spec.get("flake") {
            Some(flag) => flag.force(ev)?.as_bool()?,
            None => true,
        };
        let value = if is_flake {
            call_flake(ev, &path, loading)?
        } else {
            Value::attrs([("outPath".to_string(), path_thunk(&path))].into_iter().collect())
        };
        inputs.insert(name.clone(), Thunk::ready(value));
    }
    Ok(inputs)
}

fn path_thunk(path: &Path) -> Thunk {
    Thunk::ready(Value::Path(Rc::from(path)))
}

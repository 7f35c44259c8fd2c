//! Filesystem and environment access.

use std::path::PathBuf;

use nixkernel_foundation::{Error, Result};

use super::{PrimOp, force, string};
use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::Value;

pub(super) const PRIMOPS: &[PrimOp] = &[
    PrimOp {
        name: "import",
        args: &["path"],
        doc: "Load, parse and return the Nix expression in the file *path*.\n\nIf *path* \
              is a directory, the file `default.nix` in that directory is loaded.\n\n\
              Evaluation aborts if the file doesn't exist or contains an incorrect Nix \
              expression. `import` implements Nix's module system: you can put any Nix \
              expression (such as a set or a function) in a separate file, and use it \
              from Nix expressions in other files.",
        func: import,
    },
    PrimOp {
        name: "readFile",
        args: &["path"],
        doc: "Return the contents of the file *path* as a string.",
        func: read_file,
    },
    PrimOp {
        name: "pathExists",
        args: &["path"],
        doc: "Return `true` if the path *path* exists at evaluation time, and `false` \
              otherwise.",
        func: path_exists,
    },
    PrimOp {
        name: "getEnv",
        args: &["s"],
        doc: "`getEnv` returns the value of the environment variable *s*, or an empty \
              string if the variable doesn't exist. This function should be used with \
              care, as it can introduce all sorts of nasty environment dependencies in \
              your Nix expression.",
        func: get_env,
    },
];

/// Resolves a path or absolute path string argument.
fn path_arg(ev: &Evaluator, arg: &Thunk) -> Result<PathBuf> {
    let value = force(ev, arg)?;
    let text = ev.coerce_to_string(&value, false)?;
    let path = PathBuf::from(text.as_str());
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(Error::eval(format!(
            "string '{}' doesn't represent an absolute path",
            text.as_str()
        )))
    }
}

fn import(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let path = path_arg(ev, &args[0])?;
    ev.import(&path)
}

fn read_file(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let path = path_arg(ev, &args[0])?;
    let text = std::fs::read_to_string(&path)
        .map_err(|e| Error::io(format!("cannot read '{}'", path.display()), &e))?;
    Ok(Value::string(text))
}

fn path_exists(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let path = path_arg(ev, &args[0])?;
    Ok(Value::Bool(path.exists()))
}

fn get_env(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let name = string(ev, &args[0])?;
    Ok(Value::string(std::env::var(name.as_str()).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{eval, eval_json};

    #[test]
    fn reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, "hi there").unwrap();
        let source = format!("builtins.readFile \"{}\"", file.display());
        assert_eq!(eval_json(&source), r#""hi there""#);
        let source = format!("builtins.pathExists \"{}\"", dir.path().join("nope").display());
        assert_eq!(eval_json(&source), "false");
    }

    #[test]
    fn relative_strings_are_rejected() {
        let err = eval(r#"builtins.readFile "relative.txt""#).unwrap_err();
        assert!(err.to_string().contains("doesn't represent an absolute path"));
    }

    #[test]
    fn missing_environment_variables_are_empty() {
        assert_eq!(
            eval_json(r#"builtins.getEnv "NIXKERNEL_SURELY_UNSET_VARIABLE""#),
            r#""""#
        );
    }
}

//! Builtin functions and constants.
//!
//! Each category module exposes a `PRIMOPS` table. Every entry carries its
//! argument names and a markdown description, which is the documentation
//! source for `:doc` and inspection.

mod arith;
mod attrs;
mod control;
mod derivation;
mod io;
mod json;
mod lists;
mod strings;
mod types;

use std::fmt;
use std::rc::Rc;

use nixkernel_foundation::Result;

use crate::eval::{EvalConfig, Evaluator};
use crate::thunk::Thunk;
use crate::value::{AttrSet, NixString, PrimOpApp, Value};

/// Names bound in the global scope in addition to `builtins`.
pub const GLOBAL_NAMES: &[&str] = &[
    "abort",
    "baseNameOf",
    "derivation",
    "dirOf",
    "false",
    "import",
    "isNull",
    "map",
    "null",
    "removeAttrs",
    "throw",
    "toString",
    "true",
];

/// Version reported by `builtins.nixVersion`.
pub const NIX_VERSION: &str = "2.18.1";

/// Version reported by `builtins.langVersion`.
pub const LANG_VERSION: i64 = 6;

/// Native implementation of a builtin; receives exactly `arity` arguments.
pub type PrimOpFn = fn(&Evaluator, &[Thunk]) -> Result<Value>;

/// A builtin function.
pub struct PrimOp {
    /// Name under `builtins`.
    pub name: &'static str,
    /// Argument names, in order; the length is the arity.
    pub args: &'static [&'static str],
    /// Markdown description.
    pub doc: &'static str,
    /// Implementation.
    pub func: PrimOpFn,
}

impl PrimOp {
    /// Returns the number of arguments.
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.args.len()
    }

    /// Returns the call form, e.g. ``` `builtins.map` *f* *list* ```.
    #[must_use]
    pub fn synopsis(&self) -> String {
        let mut out = format!("`builtins.{}`", self.name);
        for arg in self.args {
            out.push_str(" *");
            out.push_str(arg);
            out.push('*');
        }
        out
    }

    /// Returns the documentation as markdown.
    #[must_use]
    pub fn markdown(&self) -> String {
        format!("**Synopsis:** {}\n\n{}", self.synopsis(), self.doc)
    }
}

impl fmt::Debug for PrimOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimOp")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Iterates over every builtin function.
pub fn primops() -> impl Iterator<Item = &'static PrimOp> {
    [
        types::PRIMOPS,
        arith::PRIMOPS,
        lists::PRIMOPS,
        attrs::PRIMOPS,
        strings::PRIMOPS,
        control::PRIMOPS,
        io::PRIMOPS,
        json::PRIMOPS,
        derivation::PRIMOPS,
    ]
    .into_iter()
    .flatten()
}

/// Finds a builtin function by name.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static PrimOp> {
    primops().find(|op| op.name == name)
}

/// Builds the `builtins` set.
#[must_use]
pub fn builtins_set(config: &EvalConfig) -> AttrSet {
    let mut set: AttrSet = primops()
        .map(|op| {
            let value = Value::PrimOp(Rc::new(PrimOpApp {
                op,
                args: Vec::new(),
            }));
            (op.name.to_string(), Thunk::ready(value))
        })
        .collect();
    let constants = [
        ("currentSystem", Value::string(config.current_system.as_str())),
        ("langVersion", Value::Int(LANG_VERSION)),
        ("nixVersion", Value::string(NIX_VERSION)),
        ("storeDir", Value::string(config.store_dir.display().to_string())),
        ("true", Value::Bool(true)),
        ("false", Value::Bool(false)),
        ("null", Value::Null),
    ];
    for (name, value) in constants {
        set.insert(name, Thunk::ready(value));
    }
    set
}

// =============================================================================
// Argument helpers
// =============================================================================

fn force(ev: &Evaluator, arg: &Thunk) -> Result<Value> {
    arg.force(ev)
}

fn int(ev: &Evaluator, arg: &Thunk) -> Result<i64> {
    arg.force(ev)?.as_int()
}

fn string(ev: &Evaluator, arg: &Thunk) -> Result<NixString> {
    Ok(arg.force(ev)?.as_string()?.clone())
}

fn list(ev: &Evaluator, arg: &Thunk) -> Result<Rc<Vec<Thunk>>> {
    Ok(Rc::clone(arg.force(ev)?.as_list()?))
}

fn attrs(ev: &Evaluator, arg: &Thunk) -> Result<Rc<AttrSet>> {
    Ok(Rc::clone(arg.force(ev)?.as_attrs()?))
}

/// Calls `f a b`.
fn call2(ev: &Evaluator, f: &Value, a: Thunk, b: Thunk) -> Result<Value> {
    let partial = ev.call(f, a)?;
    ev.call(&partial, b)
}

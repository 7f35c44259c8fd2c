//! Evaluation control: errors, strictness and tracing.

use nixkernel_foundation::{Error, ErrorKind, Result};

use super::{PrimOp, force};
use crate::eval::Evaluator;
use crate::pretty::{PrintOptions, print_value};
use crate::thunk::Thunk;
use crate::value::{AttrSet, Value};

pub(super) const PRIMOPS: &[PrimOp] = &[
    PrimOp {
        name: "abort",
        args: &["s"],
        doc: "Abort Nix expression evaluation and print the error message *s*.",
        func: abort,
    },
    PrimOp {
        name: "throw",
        args: &["s"],
        doc: "Throw an error message *s*. This usually aborts Nix expression evaluation, \
              but in `nix-env -qa` and other commands that try to evaluate a set of \
              derivations to get information about those derivations, a derivation that \
              throws an error is silently skipped (which is not the case for `abort`).",
        func: throw,
    },
    PrimOp {
        name: "seq",
        args: &["e1", "e2"],
        doc: "Evaluate *e1*, then evaluate and return *e2*. This ensures that a \
              computation is strict in the value of *e1*.",
        func: seq,
    },
    PrimOp {
        name: "deepSeq",
        args: &["e1", "e2"],
        doc: "This is like `seq e1 e2`, except that *e1* is evaluated *deeply*: if it's \
              a list or set, its elements or attributes are also evaluated recursively.",
        func: deep_seq,
    },
    PrimOp {
        name: "trace",
        args: &["e1", "e2"],
        doc: "Evaluate *e1* and print its abstract syntax representation on standard \
              error. Then return *e2*. This function is useful for debugging.",
        func: trace,
    },
    PrimOp {
        name: "tryEval",
        args: &["e"],
        doc: "Try to shallowly evaluate *e*. Return a set containing the attributes \
              `success` (`true` if *e* evaluated successfully, `false` if an error was \
              thrown) and `value`, equalling *e* if successful and `false` \
              otherwise.\n\n`tryEval` will only prevent errors created by `throw` or \
              `assert` from being thrown. Errors `tryEval` will not catch are, for \
              example, those created by `abort` and type errors generated by builtins.",
        func: try_eval,
    },
];

fn message(ev: &Evaluator, arg: &Thunk) -> Result<String> {
    let value = force(ev, arg)?;
    Ok(ev.coerce_to_string(&value, false)?.as_str().to_string())
}

fn abort(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Err(Error::new(ErrorKind::Aborted(message(ev, &args[0])?)))
}

fn throw(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Err(Error::new(ErrorKind::Thrown(message(ev, &args[0])?)))
}

fn seq(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    force(ev, &args[0])?;
    force(ev, &args[1])
}

fn deep_seq(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    ev.deep_force(&force(ev, &args[0])?)?;
    force(ev, &args[1])
}

fn trace(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let shown = match force(ev, &args[0])? {
        Value::String(s) => s.as_str().to_string(),
        other => print_value(ev, &other, &PrintOptions::plain())?,
    };
    ev.push_trace(shown);
    force(ev, &args[1])
}

fn try_eval(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let (success, value) = match force(ev, &args[0]) {
        Ok(value) => (true, value),
        Err(err) if matches!(err.kind, ErrorKind::Thrown(_) | ErrorKind::AssertionFailed(_)) => {
            (false, Value::Bool(false))
        }
        Err(err) => return Err(err),
    };
    let mut out = AttrSet::new();
    out.insert("success", Thunk::ready(Value::Bool(success)));
    out.insert("value", Thunk::ready(value));
    Ok(Value::attrs(out))
}

//! Type predicates.

use nixkernel_foundation::Result;

use super::{PrimOp, force};
use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::{Value, ValueKind};

pub(super) const PRIMOPS: &[PrimOp] = &[
    PrimOp {
        name: "isAttrs",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to a set, and `false` otherwise.",
        func: is_attrs,
    },
    PrimOp {
        name: "isBool",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to a bool, and `false` otherwise.",
        func: is_bool,
    },
    PrimOp {
        name: "isFloat",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to a float, and `false` otherwise.",
        func: is_float,
    },
    PrimOp {
        name: "isFunction",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to a function, and `false` otherwise.",
        func: is_function,
    },
    PrimOp {
        name: "isInt",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to an integer, and `false` otherwise.",
        func: is_int,
    },
    PrimOp {
        name: "isList",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to a list, and `false` otherwise.",
        func: is_list,
    },
    PrimOp {
        name: "isNull",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to `null`, and `false` otherwise.",
        func: is_null,
    },
    PrimOp {
        name: "isPath",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to a path, and `false` otherwise.",
        func: is_path,
    },
    PrimOp {
        name: "isString",
        args: &["e"],
        doc: "Return `true` if *e* evaluates to a string, and `false` otherwise.",
        func: is_string,
    },
    PrimOp {
        name: "typeOf",
        args: &["e"],
        doc: "Return a string representing the type of the value *e*, namely `\"int\"`, \
              `\"bool\"`, `\"string\"`, `\"path\"`, `\"null\"`, `\"set\"`, `\"list\"`, \
              `\"lambda\"` or `\"float\"`.",
        func: type_of,
    },
];

fn kind(ev: &Evaluator, arg: &Thunk) -> Result<ValueKind> {
    Ok(force(ev, arg)?.kind())
}

fn is_attrs(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(kind(ev, &args[0])? == ValueKind::Set))
}

fn is_bool(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(kind(ev, &args[0])? == ValueKind::Bool))
}

fn is_float(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(kind(ev, &args[0])? == ValueKind::Float))
}

fn is_function(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(force(ev, &args[0])?.is_function()))
}

fn is_int(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(kind(ev, &args[0])? == ValueKind::Int))
}

fn is_list(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(kind(ev, &args[0])? == ValueKind::List))
}

fn is_null(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(kind(ev, &args[0])? == ValueKind::Null))
}

fn is_path(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(kind(ev, &args[0])? == ValueKind::Path))
}

fn is_string(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Bool(kind(ev, &args[0])? == ValueKind::String))
}

fn type_of(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::string(kind(ev, &args[0])?.type_name()))
}

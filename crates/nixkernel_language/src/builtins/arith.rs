//! Arithmetic and bitwise builtins.

use std::cmp::Ordering;

use nixkernel_foundation::{Error, ErrorKind, Result};

use super::{PrimOp, force, int};
use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::Value;

pub(super) const PRIMOPS: &[PrimOp] = &[
    PrimOp {
        name: "add",
        args: &["e1", "e2"],
        doc: "Return the sum of the numbers *e1* and *e2*.",
        func: add,
    },
    PrimOp {
        name: "sub",
        args: &["e1", "e2"],
        doc: "Return the difference between the numbers *e1* and *e2*.",
        func: sub,
    },
    PrimOp {
        name: "mul",
        args: &["e1", "e2"],
        doc: "Return the product of the numbers *e1* and *e2*.",
        func: mul,
    },
    PrimOp {
        name: "div",
        args: &["e1", "e2"],
        doc: "Return the quotient of the numbers *e1* and *e2*.",
        func: div,
    },
    PrimOp {
        name: "bitAnd",
        args: &["e1", "e2"],
        doc: "Return the bitwise AND of the integers *e1* and *e2*.",
        func: bit_and,
    },
    PrimOp {
        name: "bitOr",
        args: &["e1", "e2"],
        doc: "Return the bitwise OR of the integers *e1* and *e2*.",
        func: bit_or,
    },
    PrimOp {
        name: "bitXor",
        args: &["e1", "e2"],
        doc: "Return the bitwise XOR of the integers *e1* and *e2*.",
        func: bit_xor,
    },
    PrimOp {
        name: "ceil",
        args: &["double"],
        doc: "Converts an IEEE-754 double-precision floating-point number (*double*) to \
              the next higher integer.\n\nIf the datatype is neither an integer nor a \
              \"float\", an evaluation error will be thrown.",
        func: ceil,
    },
    PrimOp {
        name: "floor",
        args: &["double"],
        doc: "Converts an IEEE-754 double-precision floating-point number (*double*) to \
              the next lower integer.\n\nIf the datatype is neither an integer nor a \
              \"float\", an evaluation error will be thrown.",
        func: floor,
    },
    PrimOp {
        name: "lessThan",
        args: &["e1", "e2"],
        doc: "Return `true` if the number *e1* is less than the number *e2*, and `false` \
              otherwise. Evaluation aborts if either *e1* or *e2* does not evaluate to a \
              number.",
        func: less_than,
    },
];

fn numeric(
    ev: &Evaluator,
    args: &[Thunk],
    symbol: &str,
    ints: fn(i64, i64) -> Option<i64>,
    floats: fn(f64, f64) -> f64,
) -> Result<Value> {
    let a = force(ev, &args[0])?;
    let b = force(ev, &args[1])?;
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => ints(*x, *y)
            .map(Value::Int)
            .ok_or_else(|| Error::new(ErrorKind::Overflow(format!("{x} {symbol} {y}")))),
        _ => Ok(Value::Float(floats(a.as_float()?, b.as_float()?))),
    }
}

fn add(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    numeric(ev, args, "+", i64::checked_add, |x, y| x + y)
}

fn sub(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    numeric(ev, args, "-", i64::checked_sub, |x, y| x - y)
}

fn mul(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    numeric(ev, args, "*", i64::checked_mul, |x, y| x * y)
}

fn div(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let divisor = force(ev, &args[1])?;
    if divisor.as_float()? == 0.0 {
        return Err(Error::new(ErrorKind::DivisionByZero));
    }
    numeric(ev, args, "/", i64::checked_div, |x, y| x / y)
}

fn bit_and(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Int(int(ev, &args[0])? & int(ev, &args[1])?))
}

fn bit_or(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Int(int(ev, &args[0])? | int(ev, &args[1])?))
}

fn bit_xor(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::Int(int(ev, &args[0])? ^ int(ev, &args[1])?))
}

#[allow(clippy::cast_possible_truncation)]
fn round_with(ev: &Evaluator, arg: &Thunk, f: fn(f64) -> f64) -> Result<Value> {
    match force(ev, arg)? {
        Value::Int(n) => Ok(Value::Int(n)),
        other => Ok(Value::Int(f(other.as_float()?) as i64)),
    }
}

fn ceil(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    round_with(ev, &args[0], f64::ceil)
}

fn floor(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    round_with(ev, &args[0], f64::floor)
}

fn less_than(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let a = force(ev, &args[0])?;
    let b = force(ev, &args[1])?;
    Ok(Value::Bool(ev.compare(&a, &b)? == Some(Ordering::Less)))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{eval, eval_json};
    use nixkernel_foundation::ErrorKind;

    #[test]
    fn arithmetic() {
        assert_eq!(eval_json("builtins.add 2 3"), "5");
        assert_eq!(eval_json("builtins.sub 2 3"), "-1");
        assert_eq!(eval_json("builtins.mul 4 2.5"), "10.0");
        assert_eq!(eval_json("builtins.div 7 2"), "3");
        assert!(matches!(
            eval("builtins.div 1 0").unwrap_err().kind,
            ErrorKind::DivisionByZero
        ));
    }

    #[test]
    fn bitwise_and_rounding() {
        assert_eq!(eval_json("builtins.bitAnd 12 10"), "8");
        assert_eq!(eval_json("builtins.bitOr 12 10"), "14");
        assert_eq!(eval_json("builtins.bitXor 12 10"), "6");
        assert_eq!(eval_json("builtins.ceil 1.2"), "2");
        assert_eq!(eval_json("builtins.floor (-1.2)"), "-2");
    }

    #[test]
    fn less_than_compares_numbers_and_strings() {
        assert_eq!(eval_json("builtins.lessThan 1 2"), "true");
        assert_eq!(eval_json("builtins.lessThan \"b\" \"a\""), "false");
    }
}

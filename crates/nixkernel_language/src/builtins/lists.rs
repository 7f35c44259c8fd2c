//! List builtins.

use std::rc::Rc;

use nixkernel_foundation::{Error, Result};

use super::{PrimOp, call2, force, int, list};
use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::Value;

/// Elements built between interrupt checks in bulk list construction.
const INTERRUPT_STRIDE: i64 = 4096;

pub(super) const PRIMOPS: &[PrimOp] = &[
    PrimOp {
        name: "all",
        args: &["pred", "list"],
        doc: "Return `true` if the function *pred* returns `true` for all elements of \
              *list*, and `false` otherwise.",
        func: all,
    },
    PrimOp {
        name: "any",
        args: &["pred", "list"],
        doc: "Return `true` if the function *pred* returns `true` for at least one \
              element of *list*, and `false` otherwise.",
        func: any,
    },
    PrimOp {
        name: "concatLists",
        args: &["lists"],
        doc: "Concatenate a list of lists into a single list.",
        func: concat_lists,
    },
    PrimOp {
        name: "concatMap",
        args: &["f", "list"],
        doc: "This function is equivalent to `builtins.concatLists (map f list)` but is \
              more efficient.",
        func: concat_map,
    },
    PrimOp {
        name: "elem",
        args: &["x", "xs"],
        doc: "Return `true` if a value equal to *x* occurs in the list *xs*, and `false` \
              otherwise.",
        func: elem,
    },
    PrimOp {
        name: "elemAt",
        args: &["xs", "n"],
        doc: "Return element *n* from the list *xs*. Elements are counted starting from \
              0. A fatal error occurs if the index is out of bounds.",
        func: elem_at,
    },
    PrimOp {
        name: "filter",
        args: &["f", "list"],
        doc: "Return a list consisting of the elements of *list* for which the function \
              *f* returns `true`.",
        func: filter,
    },
    PrimOp {
        name: "foldl'",
        args: &["op", "nul", "list"],
        doc: "Reduce a list by applying a binary operator, from left to right, e.g. \
              `foldl' op nul [x0 x1 x2 ...] = op (op (op nul x0) x1) x2) ...`.\n\nThe \
              operator is applied strictly, i.e., its arguments are evaluated first.",
        func: foldl_strict,
    },
    PrimOp {
        name: "genList",
        args: &["generator", "length"],
        doc: "Generate list of size *length*, with each element *i* equal to the value \
              returned by *generator* `i`. For example,\n\n```nix\nbuiltins.genList (x: x \
              * x) 5\n```\n\nreturns the list `[ 0 1 4 9 16 ]`.",
        func: gen_list,
    },
    PrimOp {
        name: "head",
        args: &["list"],
        doc: "Return the first element of a list; abort evaluation if the argument isn't \
              a list or is an empty list. You can test whether a list is empty by \
              comparing it with `[]`.",
        func: head,
    },
    PrimOp {
        name: "length",
        args: &["e"],
        doc: "Return the length of the list *e*.",
        func: length,
    },
    PrimOp {
        name: "map",
        args: &["f", "list"],
        doc: "Apply the function *f* to each element in the list *list*. For \
              example,\n\n```nix\nmap (x: \"foo\" + x) [ \"bar\" \"bla\" \"abc\" ]\n```\n\n\
              evaluates to `[ \"foobar\" \"foobla\" \"fooabc\" ]`.",
        func: map,
    },
    PrimOp {
        name: "sort",
        args: &["comparator", "list"],
        doc: "Return *list* in sorted order. It repeatedly calls the function \
              *comparator* with two elements. The comparator should return `true` if the \
              first element is less than the second, and `false` otherwise.\n\nThis is a \
              stable sort: it preserves the relative order of elements deemed equal by \
              the comparator.",
        func: sort,
    },
    PrimOp {
        name: "tail",
        args: &["list"],
        doc: "Return the list without its first item; abort evaluation if the argument \
              isn't a list or is an empty list.",
        func: tail,
    },
];

fn predicate(ev: &Evaluator, f: &Value, item: &Thunk) -> Result<bool> {
    ev.call(f, item.clone())?.as_bool()
}

fn all(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let pred = force(ev, &args[0])?;
    for item in list(ev, &args[1])?.iter() {
        if !predicate(ev, &pred, item)? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn any(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let pred = force(ev, &args[0])?;
    for item in list(ev, &args[1])?.iter() {
        if predicate(ev, &pred, item)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn concat_lists(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let mut out = Vec::new();
    for inner in list(ev, &args[0])?.iter() {
        out.extend(list(ev, inner)?.iter().cloned());
    }
    Ok(Value::list(out))
}

fn concat_map(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let f = force(ev, &args[0])?;
    let mut out = Vec::new();
    for item in list(ev, &args[1])?.iter() {
        let mapped = ev.call(&f, item.clone())?;
        out.extend(mapped.as_list()?.iter().cloned());
    }
    Ok(Value::list(out))
}

fn elem(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let needle = force(ev, &args[0])?;
    for item in list(ev, &args[1])?.iter() {
        if ev.equal(&needle, &item.force(ev)?)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn elem_at(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let items = list(ev, &args[0])?;
    let n = int(ev, &args[1])?;
    usize::try_from(n)
        .ok()
        .and_then(|i| items.get(i))
        .ok_or_else(|| Error::eval(format!("list index {n} is out of bounds")))?
        .force(ev)
}

fn filter(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let pred = force(ev, &args[0])?;
    let mut out = Vec::new();
    for item in list(ev, &args[1])?.iter() {
        if predicate(ev, &pred, item)? {
            out.push(item.clone());
        }
    }
    Ok(Value::list(out))
}

fn foldl_strict(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let op = force(ev, &args[0])?;
    let mut acc = force(ev, &args[1])?;
    for item in list(ev, &args[2])?.iter() {
        acc = call2(ev, &op, Thunk::ready(acc), item.clone())?;
    }
    Ok(acc)
}

fn gen_list(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let generator = args[0].clone();
    let n = int(ev, &args[1])?;
    let len = usize::try_from(n)
        .map_err(|_| Error::eval(format!("cannot create list of size {n}")))?;
    let mut items = Vec::new();
    items
        .try_reserve_exact(len)
        .map_err(|_| Error::eval(format!("cannot create list of size {n}")))?;
    for index in 0..n {
        if index % INTERRUPT_STRIDE == 0 {
            ev.interrupt().check()?;
        }
        let generator = generator.clone();
        items.push(Thunk::lazy(move |ev| {
            let f = generator.force(ev)?;
            ev.call(&f, Thunk::ready(Value::Int(index)))
        }));
    }
    Ok(Value::list(items))
}

fn head(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    list(ev, &args[0])?
        .first()
        .ok_or_else(|| Error::eval("'builtins.head' called on an empty list"))?
        .force(ev)
}

fn length(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let len = list(ev, &args[0])?.len();
    Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
}

fn map(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let f = args[0].clone();
    let items = list(ev, &args[1])?
        .iter()
        .map(|item| {
            let f = f.clone();
            let item = item.clone();
            Thunk::lazy(move |ev| {
                let f = f.force(ev)?;
                ev.call(&f, item.clone())
            })
        })
        .collect();
    Ok(Value::list(items))
}

fn sort(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let comparator = force(ev, &args[0])?;
    let items = list(ev, &args[1])?;
    let sorted = merge_sort(ev, &comparator, items.as_slice())?;
    Ok(Value::list(sorted))
}

/// Stable merge sort with a fallible comparator.
fn merge_sort(ev: &Evaluator, less: &Value, items: &[Thunk]) -> Result<Vec<Thunk>> {
    if items.len() <= 1 {
        return Ok(items.to_vec());
    }
    let (left, right) = items.split_at(items.len() / 2);
    let left = merge_sort(ev, less, left)?;
    let right = merge_sort(ev, less, right)?;

    let mut out = Vec::with_capacity(items.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let right_first = call2(ev, less, right[j].clone(), left[i].clone())?.as_bool()?;
        if right_first {
            out.push(right[j].clone());
            j += 1;
        } else {
            out.push(left[i].clone());
            i += 1;
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
    Ok(out)
}

fn tail(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let items = list(ev, &args[0])?;
    match items.split_first() {
        Some((_, rest)) => Ok(Value::List(Rc::new(rest.to_vec()))),
        None => Err(Error::eval("'builtins.tail' called on an empty list")),
    }
}

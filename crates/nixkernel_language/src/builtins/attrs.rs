//! Attribute set builtins.

use nixkernel_foundation::{Error, Result};

use super::{PrimOp, attrs, force, list, string};
use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::{AttrSet, Value};

pub(super) const PRIMOPS: &[PrimOp] = &[
    PrimOp {
        name: "attrNames",
        args: &["set"],
        doc: "Return the names of the attributes in the set *set* in an alphabetically \
              sorted list. For instance, `builtins.attrNames { y = 1; x = \"foo\"; }` \
              evaluates to `[ \"x\" \"y\" ]`.",
        func: attr_names,
    },
    PrimOp {
        name: "attrValues",
        args: &["set"],
        doc: "Return the values of the attributes in the set *set* in the order \
              corresponding to the sorted attribute names.",
        func: attr_values,
    },
    PrimOp {
        name: "catAttrs",
        args: &["attr", "list"],
        doc: "Collect each attribute named *attr* from a list of attribute sets. \
              Attrsets that don't contain the named attribute are ignored. For \
              example,\n\n```nix\nbuiltins.catAttrs \"a\" [{a = 1;} {b = 0;} {a = \
              2;}]\n```\n\nevaluates to `[1 2]`.",
        func: cat_attrs,
    },
    PrimOp {
        name: "getAttr",
        args: &["s", "set"],
        doc: "`getAttr` returns the attribute named *s* from *set*. Evaluation aborts if \
              the attribute doesn't exist. This is a dynamic version of the `.` operator, \
              since *s* is an expression rather than an identifier.",
        func: get_attr,
    },
    PrimOp {
        name: "hasAttr",
        args: &["s", "set"],
        doc: "`hasAttr` returns `true` if *set* has an attribute named *s*, and `false` \
              otherwise. This is a dynamic version of the `?` operator, since *s* is an \
              expression rather than an identifier.",
        func: has_attr,
    },
    PrimOp {
        name: "intersectAttrs",
        args: &["e1", "e2"],
        doc: "Return a set consisting of the attributes in the set *e2* which have the \
              same name as some attribute in *e1*.",
        func: intersect_attrs,
    },
    PrimOp {
        name: "listToAttrs",
        args: &["e"],
        doc: "Construct a set from a list specifying the names and values of each \
              attribute. Each element of the list should be a set consisting of a string \
              valued attribute `name` specifying the name of the attribute, and an \
              attribute `value` specifying its value.\n\nIn case of duplicate \
              occurrences of the same name, the first takes precedence.",
        func: list_to_attrs,
    },
    PrimOp {
        name: "mapAttrs",
        args: &["f", "attrset"],
        doc: "Apply function *f* to every element of *attrset*. For \
              example,\n\n```nix\nbuiltins.mapAttrs (name: value: value * 10) { a = 1; b \
              = 2; }\n```\n\nevaluates to `{ a = 10; b = 20; }`.",
        func: map_attrs,
    },
    PrimOp {
        name: "removeAttrs",
        args: &["set", "list"],
        doc: "Remove the attributes listed in *list* from *set*. The attributes don't \
              have to exist in *set*. For instance,\n\n```nix\nremoveAttrs { x = 1; y = \
              2; z = 3; } [ \"a\" \"x\" \"z\" ]\n```\n\nevaluates to `{ y = 2; }`.",
        func: remove_attrs,
    },
];

fn attr_names(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let set = attrs(ev, &args[0])?;
    Ok(Value::list(
        set.names().map(|name| Thunk::ready(Value::string(name))).collect(),
    ))
}

fn attr_values(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let set = attrs(ev, &args[0])?;
    Ok(Value::list(set.iter().map(|(_, value)| value.clone()).collect()))
}

fn cat_attrs(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let name = string(ev, &args[0])?;
    let mut out = Vec::new();
    for item in list(ev, &args[1])?.iter() {
        if let Some(value) = item.force(ev)?.as_attrs()?.get(name.as_str()) {
            out.push(value.clone());
        }
    }
    Ok(Value::list(out))
}

fn get_attr(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let name = string(ev, &args[0])?;
    attrs(ev, &args[1])?
        .get(name.as_str())
        .ok_or_else(|| Error::missing_attribute(name.as_str()))?
        .force(ev)
}

fn has_attr(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let name = string(ev, &args[0])?;
    Ok(Value::Bool(attrs(ev, &args[1])?.contains(name.as_str())))
}

fn intersect_attrs(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let names = attrs(ev, &args[0])?;
    let set = attrs(ev, &args[1])?;
    Ok(Value::attrs(
        set.iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
    ))
}

fn list_to_attrs(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let mut out = AttrSet::new();
    for item in list(ev, &args[0])?.iter() {
        let entry = item.force(ev)?;
        let entry = entry.as_attrs()?;
        let name = entry
            .get("name")
            .ok_or_else(|| Error::missing_attribute("name"))?
            .force(ev)?;
        let name = name.as_string()?.as_str().to_string();
        if out.contains(&name) {
            continue;
        }
        let value = entry
            .get("value")
            .ok_or_else(|| Error::missing_attribute("value"))?
            .clone();
        out.insert(name, value);
    }
    Ok(Value::attrs(out))
}

fn map_attrs(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let f = args[0].clone();
    let set = attrs(ev, &args[1])?;
    Ok(Value::attrs(
        set.iter()
            .map(|(name, value)| {
                let f = f.clone();
                let key = Thunk::ready(Value::string(name.as_str()));
                let value = value.clone();
                let thunk = Thunk::lazy(move |ev| {
                    let f = f.force(ev)?;
                    let partial = ev.call(&f, key.clone())?;
                    ev.call(&partial, value.clone())
                });
                (name.clone(), thunk)
            })
            .collect(),
    ))
}

fn remove_attrs(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let mut set = (*attrs(ev, &args[0])?).clone();
    for name in list(ev, &args[1])?.iter() {
        set.remove(force(ev, name)?.as_string()?.as_str());
    }
    Ok(Value::attrs(set))
}

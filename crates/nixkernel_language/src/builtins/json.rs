//! JSON conversion.

use im::OrdSet;
use nixkernel_foundation::{Error, ErrorKind, Result};
use serde_json::{Map, Number};

use super::{PrimOp, force, string};
use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::{AttrSet, NixString, Value};

pub(super) const PRIMOPS: &[PrimOp] = &[
    PrimOp {
        name: "fromJSON",
        args: &["e"],
        doc: "Convert a JSON string to a Nix value. For example,\n\n```nix\n\
              builtins.fromJSON ''{\"x\": [1, 2, 3], \"y\": null}''\n```\n\nreturns the \
              value `{ x = [ 1 2 3 ]; y = null; }`.",
        func: from_json,
    },
    PrimOp {
        name: "toJSON",
        args: &["e"],
        doc: "Return a string containing a JSON representation of *e*. Strings, \
              integers, floats, Booleans, nulls and lists are mapped to their JSON \
              equivalents. Sets (except derivations) are represented as objects. \
              Derivations are translated to a JSON string containing the derivation's \
              output path. Paths are represented as strings.",
        func: to_json,
    },
];

fn json_error(err: &serde_json::Error) -> Error {
    Error::new(ErrorKind::Json(err.to_string()))
}

fn to_json(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let mut context = OrdSet::new();
    let json = to_json_value(ev, &force(ev, &args[0])?, &mut context)?;
    let text = serde_json::to_string(&json).map_err(|e| json_error(&e))?;
    Ok(Value::String(NixString::with_context(text, context)))
}

/// Converts a value to JSON, forcing it deeply and collecting string
/// contexts.
///
/// # Errors
/// Fails for functions, non-finite floats and any error raised while
/// forcing.
pub fn to_json_value(
    ev: &Evaluator,
    value: &Value,
    context: &mut OrdSet<String>,
) -> Result<serde_json::Value> {
    ev.interrupt().check()?;
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::eval(format!("cannot convert float {f} to JSON")))?,
        Value::String(s) => {
            context.extend(s.context().iter().cloned());
            serde_json::Value::String(s.as_str().to_string())
        }
        Value::Path(p) => serde_json::Value::String(p.display().to_string()),
        Value::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| to_json_value(ev, &item.force(ev)?, context))
                .collect::<Result<_>>()?,
        ),
        Value::Attrs(attrs) => {
            if attrs.contains("__toString") {
                let s = ev.coerce_to_string(value, false)?;
                context.extend(s.context().iter().cloned());
                return Ok(serde_json::Value::String(s.as_str().to_string()));
            }
            if let Some(out_path) = attrs.get("outPath") {
                return to_json_value(ev, &out_path.force(ev)?, context);
            }
            let mut map = Map::new();
            for (name, item) in attrs.iter() {
                let item = item
                    .force(ev)
                    .map_err(|e| e.with_frame(format!("while evaluating attribute '{name}'")))?;
                map.insert(name.clone(), to_json_value(ev, &item, context)?);
            }
            serde_json::Value::Object(map)
        }
        Value::Lambda(_) | Value::PrimOp(_) => {
            return Err(Error::eval("cannot convert a function to JSON"));
        }
    })
}

fn from_json(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let text = string(ev, &args[0])?;
    let json: serde_json::Value = serde_json::from_str(text.as_str()).map_err(|e| json_error(&e))?;
    Ok(from_json_value(&json))
}

/// Converts parsed JSON to a fully evaluated Nix value.
#[must_use]
pub fn from_json_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN)), Value::Int),
        serde_json::Value::String(s) => Value::string(s.as_str()),
        serde_json::Value::Array(items) => Value::list(
            items
                .iter()
                .map(|item| Thunk::ready(from_json_value(item)))
                .collect(),
        ),
        serde_json::Value::Object(map) => Value::attrs(
            map.iter()
                .map(|(name, item)| (name.clone(), Thunk::ready(from_json_value(item))))
                .collect::<AttrSet>(),
        ),
    }
}

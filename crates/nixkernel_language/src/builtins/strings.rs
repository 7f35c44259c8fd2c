//! String builtins.

use nixkernel_foundation::{Error, Result};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use super::{PrimOp, force, int, list, string};
use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::{NixString, Value};

pub(super) const PRIMOPS: &[PrimOp] = &[
    PrimOp {
        name: "baseNameOf",
        args: &["s"],
        doc: "Return the *base name* of the string *s*, that is, everything following \
              the final slash in the string. This is similar to the GNU `basename` \
              command.",
        func: base_name_of,
    },
    PrimOp {
        name: "dirOf",
        args: &["s"],
        doc: "Return the directory part of the string *s*, that is, everything before \
              the final slash in the string. This is similar to the GNU `dirname` \
              command.",
        func: dir_of,
    },
    PrimOp {
        name: "concatStringsSep",
        args: &["separator", "list"],
        doc: "Concatenate a list of strings with a separator between each element, e.g. \
              `concatStringsSep \"/\" [\"usr\" \"local\" \"bin\"] == \"usr/local/bin\"`.",
        func: concat_strings_sep,
    },
    PrimOp {
        name: "hashString",
        args: &["type", "s"],
        doc: "Return a base-16 representation of the cryptographic hash of string *s*. \
              The hash algorithm specified by *type* must be one of `\"sha224\"`, \
              `\"sha256\"`, `\"sha384\"` or `\"sha512\"`.",
        func: hash_string,
    },
    PrimOp {
        name: "replaceStrings",
        args: &["from", "to", "s"],
        doc: "Given string *s*, replace every occurrence of the strings in *from* with \
              the corresponding string in *to*.\n\nThe argument *to* is lazy, that is, it \
              is only evaluated when its corresponding pattern in *from* is \
              matched.\n\nExample:\n\n```nix\nbuiltins.replaceStrings [\"oo\" \"a\"] \
              [\"a\" \"i\"] \"foobar\"\n```\n\nevaluates to `\"fabir\"`.",
        func: replace_strings,
    },
    PrimOp {
        name: "stringLength",
        args: &["e"],
        doc: "Return the length of the string *e*. If *e* is not a string, evaluation is \
              aborted.",
        func: string_length,
    },
    PrimOp {
        name: "substring",
        args: &["start", "len", "s"],
        doc: "Return the substring of *s* from character position *start* (zero-based) \
              up to but not including *start + len*. If *start* is greater than the \
              length of the string, an empty string is returned. If *start + len* lies \
              beyond the end of the string or *len* is `-1`, only the substring up to the \
              end of the string is returned. *start* must be non-negative. For \
              example,\n\n```nix\nbuiltins.substring 0 3 \"nixos\"\n```\n\nevaluates to \
              `\"nix\"`.",
        func: substring,
    },
    PrimOp {
        name: "toString",
        args: &["e"],
        doc: "Convert the expression *e* to a string. *e* can be:\n\n- A string (in \
              which case the string is returned unmodified).\n- A path (e.g., `toString \
              /foo/bar` yields `\"/foo/bar\"`.\n- A set containing `{ __toString = self: \
              ...; }` or `{ outPath = ...; }`.\n- An integer.\n- A list, in which case \
              the string representations of its elements are joined with spaces.\n- A \
              Boolean (`false` yields `\"\"`, `true` yields `\"1\"`).\n- `null`, which \
              yields the empty string.",
        func: to_string,
    },
];

fn coerced(ev: &Evaluator, arg: &Thunk) -> Result<NixString> {
    ev.coerce_to_string(&force(ev, arg)?, false)
}

fn base_name_of(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let s = coerced(ev, &args[0])?;
    let trimmed = s.as_str().strip_suffix('/').unwrap_or(s.as_str());
    let base = trimmed.rsplit_once('/').map_or(trimmed, |(_, base)| base);
    Ok(Value::String(NixString::with_context(base, s.context().clone())))
}

fn dir_of(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let value = force(ev, &args[0])?;
    if let Value::Path(path) = &value {
        let parent = path.parent().unwrap_or(&**path);
        return Ok(Value::Path(parent.into()));
    }
    let s = ev.coerce_to_string(&value, false)?;
    let dir = match s.as_str().rfind('/') {
        Some(0) => "/",
        Some(i) => &s.as_str()[..i],
        None => ".",
    };
    Ok(Value::String(NixString::with_context(dir, s.context().clone())))
}

fn concat_strings_sep(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let separator = string(ev, &args[0])?;
    let mut out = NixString::default();
    for (i, item) in list(ev, &args[1])?.iter().enumerate() {
        if i > 0 {
            out = out.concat(&separator);
        }
        out = out.concat(&coerced(ev, item)?);
    }
    Ok(Value::String(out))
}

fn hash_string(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let kind = string(ev, &args[0])?;
    let s = string(ev, &args[1])?;
    let bytes = s.as_str().as_bytes();
    let digest = match kind.as_str() {
        "sha224" => Sha224::digest(bytes).to_vec(),
        "sha256" => Sha256::digest(bytes).to_vec(),
        "sha384" => Sha384::digest(bytes).to_vec(),
        "sha512" => Sha512::digest(bytes).to_vec(),
        other => return Err(Error::eval(format!("unknown hash algorithm '{other}'"))),
    };
    Ok(Value::string(hex::encode(digest)))
}

fn replace_strings(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let from = list(ev, &args[0])?;
    let to = list(ev, &args[1])?;
    if from.len() != to.len() {
        return Err(Error::eval(
            "'from' and 'to' arguments passed to builtins.replaceStrings have different lengths",
        ));
    }
    let patterns = from
        .iter()
        .map(|p| string(ev, p))
        .collect::<Result<Vec<_>>>()?;
    let s = string(ev, &args[2])?;
    let text = s.as_str();

    let mut out = String::with_capacity(text.len());
    let mut context = s.context().clone();
    let mut i = 0;
    while i <= text.len() {
        let rest = &text[i..];
        let next_char = rest.chars().next().map_or(1, char::len_utf8);
        let matched = patterns
            .iter()
            .position(|pattern| rest.starts_with(pattern.as_str()));
        match matched {
            Some(index) => {
                let replacement = string(ev, &to[index])?;
                out.push_str(replacement.as_str());
                context = context.union(replacement.context().clone());
                let pattern_len = patterns[index].as_str().len();
                if pattern_len == 0 {
                    out.push_str(&rest[..next_char.min(rest.len())]);
                    i += next_char;
                } else {
                    i += pattern_len;
                }
            }
            None => {
                out.push_str(&rest[..next_char.min(rest.len())]);
                i += next_char;
            }
        }
    }
    Ok(Value::String(NixString::with_context(out, context)))
}

fn string_length(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let s = coerced(ev, &args[0])?;
    Ok(Value::Int(i64::try_from(s.as_str().len()).unwrap_or(i64::MAX)))
}

fn substring(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let start = int(ev, &args[0])?;
    let len = int(ev, &args[1])?;
    let s = coerced(ev, &args[2])?;
    let start = usize::try_from(start)
        .map_err(|_| Error::eval(format!("negative start position in 'substring': {start}")))?;
    let bytes = s.as_str().as_bytes();
    let start = start.min(bytes.len());
    let end = usize::try_from(len).map_or(bytes.len(), |len| start.saturating_add(len).min(bytes.len()));
    let text = String::from_utf8_lossy(&bytes[start..end]).into_owned();
    Ok(Value::String(NixString::with_context(text, s.context().clone())))
}

fn to_string(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    Ok(Value::String(ev.coerce_to_string(&force(ev, &args[0])?, true)?))
}

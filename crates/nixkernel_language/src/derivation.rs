//! Derivation records.
//!
//! `derivation { ... }` turns an attribute set into a [`Derivation`]: the
//! builder invocation, its environment and the store paths of its outputs.
//! Paths are derived from a SHA-256 hash of the record, so evaluating the
//! same attributes twice yields the same paths.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use im::OrdSet;
use nixkernel_foundation::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::{AttrSet, NixString, Value};

/// Number of hex digits kept from a hash in a store path.
const HASH_LEN: usize = 32;

/// A buildable description produced by evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    /// Derivation name, the suffix of every store path.
    pub name: String,
    /// System the builder runs on.
    pub system: String,
    /// Program to execute.
    pub builder: String,
    /// Builder arguments.
    pub args: Vec<String>,
    /// Builder environment, including one variable per output.
    pub env: BTreeMap<String, String>,
    /// Output name to store path.
    pub outputs: BTreeMap<String, PathBuf>,
    /// `.drv` paths this derivation depends on.
    pub input_derivations: BTreeSet<String>,
    /// Store path of this record.
    pub drv_path: String,
}

impl Derivation {
    /// Returns the store path of an output.
    #[must_use]
    pub fn output_path(&self, output: &str) -> Option<&Path> {
        self.outputs.get(output).map(PathBuf::as_path)
    }

    /// Returns true if every output path exists on disk.
    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.outputs.values().all(|path| path.exists())
    }
}

#[derive(Serialize)]
struct HashInput<'a> {
    name: &'a str,
    system: &'a str,
    builder: &'a str,
    args: &'a [String],
    env: &'a BTreeMap<String, String>,
    outputs: &'a [String],
    input_derivations: &'a BTreeSet<String>,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Checks a derivation or output name.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+-._?=".contains(c));
    if valid {
        Ok(())
    } else {
        Err(Error::eval(format!("invalid derivation name '{name}'")))
    }
}

fn required(env: &BTreeMap<String, String>, name: &str) -> Result<String> {
    env.get(name)
        .cloned()
        .ok_or_else(|| Error::eval(format!("required attribute '{name}' missing")))
}

/// Evaluates the attributes of a `derivation` call into a registered
/// [`Derivation`] and returns the derivation value.
///
/// # Errors
/// Fails if `name`, `system` or `builder` is missing, a name is invalid,
/// outputs are duplicated or an attribute cannot be coerced to a string.
pub fn instantiate(ev: &Evaluator, attrs: &AttrSet) -> Result<Value> {
    let mut env = BTreeMap::new();
    let mut args = Vec::new();
    let mut inputs = BTreeSet::new();
    let mut output_names = vec!["out".to_string()];

    for (name, thunk) in attrs.iter() {
        let value = thunk.force(ev).map_err(|e| {
            e.with_frame(format!("while evaluating the attribute '{name}' of the derivation"))
        })?;
        match name.as_str() {
            "args" => {
                for item in value.as_list()?.iter() {
                    let arg = ev.coerce_to_string(&item.force(ev)?, true)?;
                    inputs.extend(arg.context().iter().cloned());
                    args.push(arg.as_str().to_string());
                }
                continue;
            }
            "outputs" => {
                output_names = value
                    .as_list()?
                    .iter()
                    .map(|item| Ok(item.force(ev)?.as_string()?.as_str().to_string()))
                    .collect::<Result<_>>()?;
                if output_names.is_empty() {
                    return Err(Error::eval("derivation must have at least one output"));
                }
                let unique: BTreeSet<_> = output_names.iter().collect();
                if unique.len() != output_names.len() {
                    return Err(Error::eval("duplicate derivation output"));
                }
                for output in &output_names {
                    validate_name(output)?;
                }
            }
            _ => {}
        }
        let text = ev.coerce_to_string(&value, true)?;
        inputs.extend(text.context().iter().cloned());
        env.insert(name.clone(), text.as_str().to_string());
    }

    let name = required(&env, "name")?;
    validate_name(&name)?;
    let system = required(&env, "system")?;
    let builder = required(&env, "builder")?;

    let hash_input = HashInput {
        name: &name,
        system: &system,
        builder: &builder,
        args: &args,
        env: &env,
        outputs: &output_names,
        input_derivations: &inputs,
    };
    let serialized =
        serde_json::to_vec(&hash_input).map_err(|e| Error::new(ErrorKind::Json(e.to_string())))?;
    let full_hash = sha256_hex(&serialized);
    let store_dir = &ev.config().store_dir;
    let drv_path = store_dir
        .join(format!("{}-{name}.drv", &full_hash[..HASH_LEN]))
        .display()
        .to_string();

    let mut outputs = BTreeMap::new();
    for output in &output_names {
        let hash = sha256_hex(format!("output:{output}:{full_hash}").as_bytes());
        let file_name = if output == "out" {
            format!("{}-{name}", &hash[..HASH_LEN])
        } else {
            format!("{}-{name}-{output}", &hash[..HASH_LEN])
        };
        let path = store_dir.join(file_name);
        env.insert(output.clone(), path.display().to_string());
        outputs.insert(output.clone(), path);
    }

    let drv = ev.register_derivation(Derivation {
        name,
        system,
        builder,
        args,
        env,
        outputs,
        input_derivations: inputs,
        drv_path,
    });
    Ok(derivation_value(attrs, &drv, &output_names))
}

/// Builds the value `derivation` returns: the original attributes plus
/// `type`, `drvPath`, `outPath`, `outputName`, `all` and one set per
/// output.
fn derivation_value(attrs: &AttrSet, drv: &Derivation, output_names: &[String]) -> Value {
    let context: OrdSet<String> = OrdSet::unit(drv.drv_path.clone());
    let with_context = |text: String| {
        Thunk::ready(Value::String(NixString::with_context(text, context.clone())))
    };

    let mut base = attrs.clone();
    base.insert("type", Thunk::ready(Value::string("derivation")));
    base.insert("drvPath", with_context(drv.drv_path.clone()));

    let per_output: Vec<(String, Value)> = output_names
        .iter()
        .map(|output| {
            let mut set = base.clone();
            let path = drv
                .output_path(output)
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            set.insert("outPath", with_context(path));
            set.insert("outputName", Thunk::ready(Value::string(output.as_str())));
            (output.clone(), Value::attrs(set))
        })
        .collect();

    let mut result = base;
    if let Some((_, Value::Attrs(first))) = per_output.first() {
        for key in ["outPath", "outputName"] {
            if let Some(thunk) = first.get(key) {
                result.insert(key, thunk.clone());
            }
        }
    }
    result.insert(
        "all",
        Thunk::ready(Value::list(
            per_output
                .iter()
                .map(|(_, value)| Thunk::ready(value.clone()))
                .collect(),
        )),
    );
    for (output, value) in per_output {
        result.insert(output, Thunk::ready(value));
    }
    Value::attrs(result)
}

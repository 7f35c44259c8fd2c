//! The `derivation` builtin.

use nixkernel_foundation::Result;

use super::{PrimOp, attrs};
use crate::derivation::instantiate;
use crate::eval::Evaluator;
use crate::thunk::Thunk;
use crate::value::Value;

pub(super) const PRIMOPS: &[PrimOp] = &[PrimOp {
    name: "derivation",
    args: &["attrs"],
    doc: "Construct a derivation from a set of attributes. The attributes `name`, \
          `system` and `builder` are required; `args` is the list of builder \
          arguments and `outputs` the list of output names (default `[ \"out\" ]`). \
          Every other attribute is passed to the builder as an environment variable, \
          with lists joined by spaces and Booleans mapped to `\"1\"` or `\"\"`.\n\nThe \
          result is the original set extended with `type = \"derivation\"`, `drvPath`, \
          `outPath` and one attribute per output.",
    func: derivation,
}];

fn derivation(ev: &Evaluator, args: &[Thunk]) -> Result<Value> {
    let attrs = attrs(ev, &args[0])?;
    instantiate(ev, &attrs)
}

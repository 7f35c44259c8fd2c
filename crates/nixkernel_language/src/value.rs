//! Runtime values of the Nix language.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use im::{OrdMap, OrdSet};
use nixkernel_foundation::{Error, Result};

use crate::ast::Lambda;
use crate::builtins::PrimOp;
use crate::pretty::format_float;
use crate::scope::Scope;
use crate::thunk::Thunk;

/// A Nix value in weak head normal form.
///
/// Composite values hold thunks, so a `Value` is only evaluated at its
/// outermost constructor. Cloning is O(1).
#[derive(Clone, Debug)]
pub enum Value {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// String with its derivation context
    String(NixString),
    /// Absolute filesystem path
    Path(Rc<Path>),
    /// List of lazy elements
    List(Rc<Vec<Thunk>>),
    /// Attribute set
    Attrs(Rc<AttrSet>),
    /// User-defined function with its captured scope
    Lambda(Rc<Closure>),
    /// Builtin function, possibly partially applied
    PrimOp(Rc<PrimOpApp>),
}

/// A string carrying the derivation paths it was built from.
#[derive(Clone, Debug, Default)]
pub struct NixString {
    text: Rc<str>,
    context: OrdSet<String>,
}

impl NixString {
    /// Creates a string without context.
    #[must_use]
    pub fn new(text: impl Into<Rc<str>>) -> Self {
        Self {
            text: text.into(),
            context: OrdSet::new(),
        }
    }

    /// Creates a string with the given context.
    #[must_use]
    pub fn with_context(text: impl Into<Rc<str>>, context: OrdSet<String>) -> Self {
        Self {
            text: text.into(),
            context,
        }
    }

    /// Returns the string contents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns the derivation paths this string depends on.
    #[must_use]
    pub const fn context(&self) -> &OrdSet<String> {
        &self.context
    }

    /// Concatenates two strings, merging their contexts.
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut text = String::with_capacity(self.text.len() + other.text.len());
        text.push_str(&self.text);
        text.push_str(&other.text);
        Self {
            text: text.into(),
            context: self.context.clone().union(other.context.clone()),
        }
    }
}

impl PartialEq for NixString {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl fmt::Display for NixString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for NixString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for NixString {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// An attribute set, ordered by name.
#[derive(Clone, Debug, Default)]
pub struct AttrSet {
    attrs: OrdMap<String, Thunk>,
}

impl AttrSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing map.
    #[must_use]
    pub const fn from_map(attrs: OrdMap<String, Thunk>) -> Self {
        Self { attrs }
    }

    /// Returns the thunk bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Thunk> {
        self.attrs.get(name)
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Binds `name`, replacing any previous binding.
    pub fn insert(&mut self, name: impl Into<String>, value: Thunk) {
        self.attrs.insert(name.into(), value);
    }

    /// Removes `name` if present.
    pub fn remove(&mut self, name: &str) {
        self.attrs.remove(name);
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Returns true if the set has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Iterates over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Thunk)> {
        self.attrs.iter()
    }

    /// Iterates over attribute names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Returns `self // other`: the union where `other` wins.
    #[must_use]
    pub fn update(&self, other: &Self) -> Self {
        Self {
            attrs: other.attrs.clone().union(self.attrs.clone()),
        }
    }

    /// Returns the underlying persistent map.
    #[must_use]
    pub const fn as_map(&self) -> &OrdMap<String, Thunk> {
        &self.attrs
    }
}

impl FromIterator<(String, Thunk)> for AttrSet {
    fn from_iter<T: IntoIterator<Item = (String, Thunk)>>(iter: T) -> Self {
        Self {
            attrs: iter.into_iter().collect(),
        }
    }
}

/// A lambda together with the scope it closes over.
pub struct Closure {
    /// The function literal.
    pub lambda: Rc<Lambda>,
    /// The defining scope.
    pub scope: Rc<Scope>,
}

impl Closure {
    /// Returns the binding name the lambda was defined under.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.lambda.name.as_deref()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.lambda.name)
            .field("span", &self.lambda.span)
            .finish_non_exhaustive()
    }
}

/// A builtin with the arguments supplied so far.
#[derive(Debug)]
pub struct PrimOpApp {
    /// The builtin.
    pub op: &'static PrimOp,
    /// Arguments collected so far, fewer than the arity.
    pub args: Vec<Thunk>,
}

/// The kind of a value, as reported to users.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// `null`
    Null,
    /// Boolean
    Bool,
    /// Integer
    Int,
    /// Float
    Float,
    /// String
    String,
    /// Path
    Path,
    /// List
    List,
    /// Attribute set
    Set,
    /// Attribute set with `type = "derivation"`
    Derivation,
    /// Lambda
    Lambda,
    /// Builtin
    PrimOp,
    /// Partially applied builtin
    PartialPrimOp,
}

impl ValueKind {
    /// Describes the kind the way the Nix REPL's `:t` does.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "a Boolean",
            Self::Int => "an integer",
            Self::Float => "a float",
            Self::String => "a string",
            Self::Path => "a path",
            Self::List => "a list",
            Self::Set => "a set",
            Self::Derivation => "a derivation",
            Self::Lambda => "a function",
            Self::PrimOp => "a built-in function",
            Self::PartialPrimOp => "a partially applied built-in function",
        }
    }

    /// Returns the name `builtins.typeOf` reports.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Path => "path",
            Self::List => "list",
            Self::Set | Self::Derivation => "set",
            Self::Lambda | Self::PrimOp | Self::PartialPrimOp => "lambda",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl Value {
    /// Returns the kind of this value without forcing anything.
    ///
    /// Derivations are reported as sets; see `Evaluator::kind_of`.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Path(_) => ValueKind::Path,
            Self::List(_) => ValueKind::List,
            Self::Attrs(_) => ValueKind::Set,
            Self::Lambda(_) => ValueKind::Lambda,
            Self::PrimOp(app) if app.args.is_empty() => ValueKind::PrimOp,
            Self::PrimOp(_) => ValueKind::PartialPrimOp,
        }
    }

    /// Describes the value for error messages, e.g. `an integer: 5`.
    #[must_use]
    pub fn describe(&self) -> String {
        let kind = self.kind().describe();
        match self {
            Self::Bool(b) => format!("{kind}: {b}"),
            Self::Int(n) => format!("{kind}: {n}"),
            Self::Float(n) => format!("{kind}: {}", format_float(*n)),
            Self::String(s) => format!("{kind}: {:?}", s.as_str()),
            Self::Path(p) => format!("{kind}: {}", p.display()),
            _ => kind.to_string(),
        }
    }

    /// Returns true for lambdas and builtins.
    #[must_use]
    pub const fn is_function(&self) -> bool {
        matches!(self, Self::Lambda(_) | Self::PrimOp(_))
    }

    /// Returns the boolean or a type error.
    ///
    /// # Errors
    /// Fails if the value is not a Boolean.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(Error::type_mismatch("a Boolean", other.describe())),
        }
    }

    /// Returns the integer or a type error.
    ///
    /// # Errors
    /// Fails if the value is not an integer.
    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            other => Err(Error::type_mismatch("an integer", other.describe())),
        }
    }

    /// Returns the number as a float, promoting integers.
    ///
    /// # Errors
    /// Fails if the value is not a number.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Float(n) => Ok(*n),
            other => Err(Error::type_mismatch("a float", other.describe())),
        }
    }

    /// Returns the string or a type error.
    ///
    /// # Errors
    /// Fails if the value is not a string.
    pub fn as_string(&self) -> Result<&NixString> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(Error::type_mismatch("a string", other.describe())),
        }
    }

    /// Returns the list or a type error.
    ///
    /// # Errors
    /// Fails if the value is not a list.
    pub fn as_list(&self) -> Result<&Rc<Vec<Thunk>>> {
        match self {
            Self::List(items) => Ok(items),
            other => Err(Error::type_mismatch("a list", other.describe())),
        }
    }

    /// Returns the attribute set or a type error.
    ///
    /// # Errors
    /// Fails if the value is not a set.
    pub fn as_attrs(&self) -> Result<&Rc<AttrSet>> {
        match self {
            Self::Attrs(attrs) => Ok(attrs),
            other => Err(Error::type_mismatch("a set", other.describe())),
        }
    }

    /// Creates a string value without context.
    #[must_use]
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        Self::String(NixString::new(text))
    }

    /// Creates a list value.
    #[must_use]
    pub fn list(items: Vec<Thunk>) -> Self {
        Self::List(Rc::new(items))
    }

    /// Creates an attribute set value.
    #[must_use]
    pub fn attrs(attrs: AttrSet) -> Self {
        Self::Attrs(Rc::new(attrs))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<NixString> for Value {
    fn from(s: NixString) -> Self {
        Self::String(s)
    }
}

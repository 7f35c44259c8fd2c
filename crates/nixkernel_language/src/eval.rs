//! Lazy evaluator for Nix expressions.
//!
//! The evaluator walks the AST directly. Laziness comes from [`Thunk`]s:
//! function arguments, list elements and attribute values are wrapped
//! unevaluated and forced on demand.
//!
//! All methods take `&self`; mutable state (source table, import cache,
//! derivation registry, traces, call depth) lives in cells so thunks can
//! re-enter the evaluator while being forced.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use im::{OrdMap, OrdSet};
use nixkernel_foundation::{Error, ErrorKind, Interrupt, Result};
use tracing::debug;

use crate::ast::{AttrName, AttrValue, BinaryOp, Bindings, Expr, ExprKind, ExprRef, Param, ReplInput, StrPart};
use crate::builtins;
use crate::derivation::Derivation;
use crate::parser::Parser;
use crate::scope::Scope;
use crate::span::{SourceId, Span};
use crate::thunk::Thunk;
use crate::value::{AttrSet, Closure, NixString, PrimOpApp, Value, ValueKind};

/// Default bound on nested function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Name shown for interactive input in positions and errors.
pub const INTERACTIVE_SOURCE: &str = "«string»";

/// Evaluator settings.
#[derive(Clone, Debug)]
pub struct EvalConfig {
    /// Directory derivation and output paths are placed under.
    pub store_dir: PathBuf,
    /// `<name>` lookup entries; an empty prefix matches any name.
    pub search_path: Vec<(String, PathBuf)>,
    /// Value of `builtins.currentSystem`.
    pub current_system: String,
    /// Maximum nesting of function calls.
    pub max_call_depth: usize,
    /// Directory relative paths in interactive input resolve against.
    pub base_dir: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            search_path: std::env::var("NIX_PATH")
                .map(|value| parse_nix_path(&value))
                .unwrap_or_default(),
            current_system: current_system(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }
}

/// Returns `$NIXKERNEL_STORE_DIR`, or `nixkernel/store` under the temp dir.
#[must_use]
pub fn default_store_dir() -> PathBuf {
    std::env::var_os("NIXKERNEL_STORE_DIR").map_or_else(
        || std::env::temp_dir().join("nixkernel").join("store"),
        PathBuf::from,
    )
}

/// Returns the Nix system double of this machine, e.g. `x86_64-linux`.
#[must_use]
pub fn current_system() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{os}", std::env::consts::ARCH)
}

/// Parses a `NIX_PATH`-style list: `name=path` or bare `path` entries
/// separated by `:`.
#[must_use]
pub fn parse_nix_path(value: &str) -> Vec<(String, PathBuf)> {
    value
        .split(':')
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, path)) => (name.to_string(), PathBuf::from(path)),
            None => (String::new(), PathBuf::from(entry)),
        })
        .collect()
}

/// Resolves `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}

struct Source {
    name: String,
    dir: PathBuf,
    text: Rc<str>,
}

/// The Nix evaluator.
pub struct Evaluator {
    config: EvalConfig,
    interrupt: Interrupt,
    globals: Rc<Scope>,
    builtins: Rc<AttrSet>,
    sources: RefCell<Vec<Source>>,
    file_cache: RefCell<HashMap<PathBuf, Value>>,
    derivations: RefCell<HashMap<String, Rc<Derivation>>>,
    traces: RefCell<Vec<String>>,
    depth: Cell<usize>,
}

impl Evaluator {
    /// Creates an evaluator with the builtins in its global scope.
    #[must_use]
    pub fn new(config: EvalConfig, interrupt: Interrupt) -> Self {
        let builtins = Rc::new(builtins::builtins_set(&config));
        let globals = Scope::root();
        globals.define("builtins", Thunk::ready(Value::Attrs(Rc::clone(&builtins))));
        for name in builtins::GLOBAL_NAMES {
            if let Some(thunk) = builtins.get(name) {
                globals.define(*name, thunk.clone());
            }
        }
        let interactive = Source {
            name: INTERACTIVE_SOURCE.to_string(),
            dir: config.base_dir.clone(),
            text: Rc::from(""),
        };
        Self {
            config,
            interrupt,
            globals,
            builtins,
            sources: RefCell::new(vec![interactive]),
            file_cache: RefCell::new(HashMap::new()),
            derivations: RefCell::new(HashMap::new()),
            traces: RefCell::new(Vec::new()),
            depth: Cell::new(0),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Returns the interrupt handle polled during evaluation.
    #[must_use]
    pub const fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Returns the global scope holding `builtins` and the global names.
    #[must_use]
    pub const fn globals(&self) -> &Rc<Scope> {
        &self.globals
    }

    /// Returns the `builtins` set.
    #[must_use]
    pub const fn builtins(&self) -> &Rc<AttrSet> {
        &self.builtins
    }

    // =========================================================================
    // Sources
    // =========================================================================

    fn add_source(&self, name: &str, dir: &Path, text: &str) -> SourceId {
        let mut sources = self.sources.borrow_mut();
        sources.push(Source {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            text: Rc::from(text),
        });
        SourceId(u32::try_from(sources.len() - 1).unwrap_or(u32::MAX))
    }

    /// Returns the display name of a source.
    #[must_use]
    pub fn source_name(&self, id: SourceId) -> String {
        self.sources
            .borrow()
            .get(id.0 as usize)
            .map_or_else(|| INTERACTIVE_SOURCE.to_string(), |s| s.name.clone())
    }

    fn source_dir(&self, id: SourceId) -> PathBuf {
        self.sources
            .borrow()
            .get(id.0 as usize)
            .map_or_else(|| self.config.base_dir.clone(), |s| s.dir.clone())
    }

    /// Returns the source text a span covers.
    #[must_use]
    pub fn source_text(&self, span: Span) -> String {
        self.sources
            .borrow()
            .get(span.source.0 as usize)
            .and_then(|s| s.text.get(span.start..span.end).map(str::to_string))
            .unwrap_or_default()
    }

    /// Formats a span as `source:line:column`.
    #[must_use]
    pub fn position(&self, span: Span) -> String {
        format!("{}:{}:{}", self.source_name(span.source), span.line, span.column)
    }

    fn locate(&self, err: Error, span: Span) -> Error {
        if matches!(err.kind, ErrorKind::Interrupted | ErrorKind::CallDepthExceeded(_)) {
            return err;
        }
        err.at(&self.source_name(span.source), span.line, span.column)
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Parses source text registered under `name`, resolving relative paths
    /// against `dir`.
    ///
    /// # Errors
    /// Returns a located parse error.
    pub fn parse(&self, text: &str, name: &str, dir: &Path) -> Result<ExprRef> {
        let id = self.add_source(name, dir, text);
        Parser::with_source_id(text, id)
            .parse()
            .map_err(|err| locate_parse_error(err, name))
    }

    /// Parses interactive input: bindings or an expression.
    ///
    /// # Errors
    /// Returns a located parse error.
    pub fn parse_repl(&self, text: &str) -> Result<ReplInput> {
        let id = self.add_source(INTERACTIVE_SOURCE, &self.config.base_dir, text);
        Parser::with_source_id(text, id)
            .parse_repl_input()
            .map_err(|err| locate_parse_error(err, INTERACTIVE_SOURCE))
    }

    /// Parses and evaluates interactive text in `scope`.
    ///
    /// # Errors
    /// Returns parse or evaluation errors.
    pub fn eval_str(&self, text: &str, scope: &Rc<Scope>) -> Result<Value> {
        let expr = self.parse(text, INTERACTIVE_SOURCE, &self.config.base_dir)?;
        self.eval(&expr, scope)
    }

    /// Evaluates a file (or a directory's `default.nix`), caching by
    /// canonical path.
    ///
    /// # Errors
    /// Returns I/O, parse or evaluation errors.
    pub fn import(&self, path: &Path) -> Result<Value> {
        let mut path = path.to_path_buf();
        if path.is_dir() {
            path.push("default.nix");
        }
        let key = std::fs::canonicalize(&path)
            .map_err(|e| Error::io(format!("cannot read '{}'", path.display()), &e))?;
        let cached = self.file_cache.borrow().get(&key).cloned();
        if let Some(value) = cached {
            return Ok(value);
        }

        debug!(path = %key.display(), "importing file");
        let text = std::fs::read_to_string(&key)
            .map_err(|e| Error::io(format!("cannot read '{}'", key.display()), &e))?;
        let dir = key.parent().map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
        let expr = self.parse(&text, &key.display().to_string(), &dir)?;
        let value = self.eval(&expr, &self.globals)?;
        self.file_cache.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    /// Forgets every imported file.
    pub fn clear_import_cache(&self) {
        self.file_cache.borrow_mut().clear();
    }

    /// Calls a pattern lambda with an empty set so its defaults apply.
    /// Other values are returned unchanged.
    ///
    /// # Errors
    /// Fails if the function has arguments without defaults.
    pub fn auto_call(&self, value: Value) -> Result<Value> {
        match &value {
            Value::Lambda(closure) if matches!(closure.lambda.param, Param::Pattern { .. }) => {
                self.call(&value, Thunk::ready(Value::attrs(AttrSet::new())))
            }
            _ => Ok(value),
        }
    }

    // =========================================================================
    // Traces and derivations
    // =========================================================================

    /// Records a `builtins.trace` message.
    pub fn push_trace(&self, message: String) {
        self.traces.borrow_mut().push(message);
    }

    /// Removes and returns the collected trace messages.
    #[must_use]
    pub fn take_traces(&self) -> Vec<String> {
        std::mem::take(&mut *self.traces.borrow_mut())
    }

    /// Registers a derivation so it can be recovered from its path.
    pub fn register_derivation(&self, drv: Derivation) -> Rc<Derivation> {
        let drv = Rc::new(drv);
        self.derivations
            .borrow_mut()
            .insert(drv.drv_path.clone(), Rc::clone(&drv));
        drv
    }

    /// Looks up a registered derivation by its `.drv` path.
    #[must_use]
    pub fn derivation(&self, drv_path: &str) -> Option<Rc<Derivation>> {
        self.derivations.borrow().get(drv_path).cloned()
    }

    /// Returns the derivation record behind a derivation value.
    ///
    /// # Errors
    /// Propagates errors from forcing `type` or `drvPath`.
    pub fn derivation_of(&self, value: &Value) -> Result<Option<Rc<Derivation>>> {
        let Value::Attrs(attrs) = value else {
            return Ok(None);
        };
        if !self.is_derivation(attrs)? {
            return Ok(None);
        }
        let Some(drv_path) = attrs.get("drvPath") else {
            return Ok(None);
        };
        let drv_path = drv_path.force(self)?;
        Ok(self.derivation(drv_path.as_string()?.as_str()))
    }

    /// Returns true if the set has `type = "derivation"`.
    ///
    /// # Errors
    /// Propagates errors from forcing `type`.
    pub fn is_derivation(&self, attrs: &AttrSet) -> Result<bool> {
        match attrs.get("type") {
            Some(kind) => Ok(matches!(kind.force(self)?, Value::String(s) if s.as_str() == "derivation")),
            None => Ok(false),
        }
    }

    /// Returns the value kind, telling derivations apart from sets.
    ///
    /// # Errors
    /// Propagates errors from forcing `type`.
    pub fn kind_of(&self, value: &Value) -> Result<ValueKind> {
        match value {
            Value::Attrs(attrs) if self.is_derivation(attrs)? => Ok(ValueKind::Derivation),
            other => Ok(other.kind()),
        }
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Evaluates an expression to weak head normal form.
    ///
    /// # Errors
    /// Returns any evaluation error, located at the innermost failing
    /// expression.
    pub fn eval(&self, expr: &ExprRef, scope: &Rc<Scope>) -> Result<Value> {
        self.eval_expr(expr, scope)
            .map_err(|err| self.locate(err, expr.span))
    }

    fn eval_expr(&self, expr: &ExprRef, scope: &Rc<Scope>) -> Result<Value> {
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(n) => Ok(Value::Float(*n)),
            ExprKind::Str(parts) => self.eval_string(parts, scope),
            ExprKind::Path(text) => Ok(Value::Path(self.resolve_path(text, expr.span.source)?.into())),
            ExprKind::SearchPath(name) => Ok(Value::Path(self.find_search_path(name)?.into())),
            ExprKind::Var(name) => self.lookup(name, scope)?.force(self),
            ExprKind::Select {
                target,
                path,
                default,
            } => self.eval_select(target, path, default.as_ref(), scope),
            ExprKind::HasAttr { target, path } => self.eval_has_attr(target, path, scope),
            ExprKind::Apply { func, arg } => {
                let func = self.eval(func, scope)?;
                self.call(&func, self.thunk_for(arg, scope))
            }
            ExprKind::Lambda(lambda) => Ok(Value::Lambda(Rc::new(Closure {
                lambda: Rc::clone(lambda),
                scope: Rc::clone(scope),
            }))),
            ExprKind::Let { bindings, body } => {
                let (inner, _) = self.bind_recursive(bindings, scope)?;
                self.eval(body, &inner)
            }
            ExprKind::AttrSet {
                recursive,
                bindings,
            } => self.build_attrs(bindings, scope, *recursive),
            ExprKind::List(items) => Ok(Value::list(
                items.iter().map(|item| self.thunk_for(item, scope)).collect(),
            )),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, scope)?.as_bool()? {
                    self.eval(then_branch, scope)
                } else {
                    self.eval(else_branch, scope)
                }
            }
            ExprKind::With { scope: set, body } => {
                let inner = Scope::with_set(scope, self.thunk_for(set, scope));
                self.eval(body, &inner)
            }
            ExprKind::Assert { cond, body } => {
                if self.eval(cond, scope)?.as_bool()? {
                    self.eval(body, scope)
                } else {
                    Err(Error::new(ErrorKind::AssertionFailed(self.source_text(cond.span))))
                }
            }
            ExprKind::Not(operand) => Ok(Value::Bool(!self.eval(operand, scope)?.as_bool()?)),
            ExprKind::Negate(operand) => match self.eval(operand, scope)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| Error::new(ErrorKind::Overflow(format!("-{n}")))),
                Value::Float(n) => Ok(Value::Float(-n)),
                other => Err(Error::type_mismatch("a number", other.describe())),
            },
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, scope),
        }
    }

    /// Wraps an expression in a thunk, sharing existing thunks for
    /// variables and skipping the deferral for constants.
    ///
    /// `scope` must be fully populated; recursive scopes under
    /// construction use [`Thunk::deferred`] directly.
    #[must_use]
    pub fn thunk_for(&self, expr: &ExprRef, scope: &Rc<Scope>) -> Thunk {
        match &expr.kind {
            ExprKind::Var(name) => scope
                .lookup(name)
                .unwrap_or_else(|| Thunk::deferred(Rc::clone(expr), Rc::clone(scope))),
            ExprKind::Int(n) => Thunk::ready(Value::Int(*n)),
            ExprKind::Float(n) => Thunk::ready(Value::Float(*n)),
            ExprKind::Str(parts) if parts.iter().all(|p| matches!(p, StrPart::Literal(_))) => {
                let text: String = parts
                    .iter()
                    .filter_map(|p| match p {
                        StrPart::Literal(s) => Some(s.as_str()),
                        StrPart::Interpolation(_) => None,
                    })
                    .collect();
                Thunk::ready(Value::string(text))
            }
            ExprKind::Lambda(lambda) => Thunk::ready(Value::Lambda(Rc::new(Closure {
                lambda: Rc::clone(lambda),
                scope: Rc::clone(scope),
            }))),
            _ => Thunk::deferred(Rc::clone(expr), Rc::clone(scope)),
        }
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Result<Thunk> {
        if let Some(thunk) = scope.lookup(name) {
            return Ok(thunk);
        }
        for set in scope.with_sets() {
            let value = set.force(self)?;
            if let Some(thunk) = value.as_attrs()?.get(name) {
                return Ok(thunk.clone());
            }
        }
        Err(Error::undefined_variable(name))
    }

    fn eval_string(&self, parts: &[StrPart], scope: &Rc<Scope>) -> Result<Value> {
        let mut text = String::new();
        let mut context = OrdSet::new();
        for part in parts {
            match part {
                StrPart::Literal(literal) => text.push_str(literal),
                StrPart::Interpolation(expr) => {
                    let value = self.eval(expr, scope)?;
                    let piece = self.coerce_to_string(&value, false)?;
                    text.push_str(piece.as_str());
                    context = context.union(piece.context().clone());
                }
            }
        }
        Ok(Value::String(NixString::with_context(text, context)))
    }

    fn resolve_path(&self, text: &str, source: SourceId) -> Result<PathBuf> {
        let path = if let Some(rest) = text.strip_prefix("~/") {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| Error::eval(format!("cannot resolve '{text}' without HOME")))?;
            PathBuf::from(home).join(rest)
        } else if text.starts_with('/') {
            PathBuf::from(text)
        } else {
            self.source_dir(source).join(text)
        };
        Ok(normalize_path(&path))
    }

    /// Resolves `<name>` through the configured search path.
    ///
    /// # Errors
    /// Fails if no entry provides the name.
    pub fn find_search_path(&self, name: &str) -> Result<PathBuf> {
        for (prefix, root) in &self.config.search_path {
            let candidate = if prefix.is_empty() {
                root.join(name)
            } else if name == prefix {
                root.clone()
            } else if let Some(rest) = name.strip_prefix(prefix.as_str()).and_then(|r| r.strip_prefix('/')) {
                root.join(rest)
            } else {
                continue;
            };
            if candidate.exists() {
                return Ok(normalize_path(&candidate));
            }
        }
        Err(Error::eval(format!(
            "file '{name}' was not found in the Nix search path (add it using $NIX_PATH or -I)"
        )))
    }

    fn attr_name(&self, name: &AttrName, scope: &Rc<Scope>) -> Result<String> {
        match name {
            AttrName::Static(name) => Ok(name.clone()),
            AttrName::Dynamic(expr) => Ok(self.eval(expr, scope)?.as_string()?.as_str().to_string()),
        }
    }

    fn eval_select(
        &self,
        target: &ExprRef,
        path: &[AttrName],
        default: Option<&ExprRef>,
        scope: &Rc<Scope>,
    ) -> Result<Value> {
        let mut value = self.eval(target, scope)?;
        for name in path {
            let name = self.attr_name(name, scope)?;
            let next = match &value {
                Value::Attrs(attrs) => attrs.get(&name).cloned(),
                _ if default.is_some() => None,
                other => {
                    return Err(Error::type_mismatch("a set", other.describe())
                        .with_frame(format!("while selecting attribute '{name}'")));
                }
            };
            match (next, default) {
                (Some(thunk), _) => {
                    value = thunk
                        .force(self)
                        .map_err(|e| e.with_frame(format!("while evaluating the attribute '{name}'")))?;
                }
                (None, Some(default)) => return self.eval(default, scope),
                (None, None) => return Err(Error::missing_attribute(name)),
            }
        }
        Ok(value)
    }

    fn eval_has_attr(&self, target: &ExprRef, path: &[AttrName], scope: &Rc<Scope>) -> Result<Value> {
        let mut value = self.eval(target, scope)?;
        for name in path {
            let name = self.attr_name(name, scope)?;
            let next = match &value {
                Value::Attrs(attrs) => attrs.get(&name).cloned(),
                _ => None,
            };
            match next {
                Some(thunk) => value = thunk.force(self)?,
                None => return Ok(Value::Bool(false)),
            }
        }
        Ok(Value::Bool(true))
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Creates the scope of a `let` or `rec` set and the attributes bound in
    /// it.
    fn bind_recursive(&self, bindings: &Rc<Bindings>, outer: &Rc<Scope>) -> Result<(Rc<Scope>, AttrSet)> {
        let scope = Scope::child(outer);
        let statics = self.static_attrs(bindings, outer, &scope, true)?;
        for (name, thunk) in &statics {
            scope.define(name.clone(), thunk.clone());
        }
        let mut attrs = AttrSet::from_map(statics);
        self.dynamic_attrs(bindings, &scope, &mut attrs)?;
        Ok((scope, attrs))
    }

    /// Builds a set literal evaluated in `scope`.
    ///
    /// # Errors
    /// Fails on invalid or duplicate dynamic attribute names.
    pub fn build_attrs(&self, bindings: &Rc<Bindings>, scope: &Rc<Scope>, recursive: bool) -> Result<Value> {
        if recursive {
            let (_, attrs) = self.bind_recursive(bindings, scope)?;
            return Ok(Value::attrs(attrs));
        }
        let mut attrs = AttrSet::from_map(self.static_attrs(bindings, scope, scope, false)?);
        self.dynamic_attrs(bindings, scope, &mut attrs)?;
        Ok(Value::attrs(attrs))
    }

    /// Creates thunks for the statically named attributes. Values see
    /// `values`; plain `inherit` looks in `outer`.
    fn static_attrs(
        &self,
        bindings: &Bindings,
        outer: &Rc<Scope>,
        values: &Rc<Scope>,
        recursive: bool,
    ) -> Result<OrdMap<String, Thunk>> {
        let sources: Vec<Thunk> = bindings
            .inherit_sources
            .iter()
            .map(|expr| Thunk::deferred(Rc::clone(expr), Rc::clone(values)))
            .collect();

        let mut map = OrdMap::new();
        for def in &bindings.attrs {
            let thunk = match &def.value {
                AttrValue::Expr(expr) if recursive => Thunk::deferred(Rc::clone(expr), Rc::clone(values)),
                AttrValue::Expr(expr) => self.thunk_for(expr, values),
                AttrValue::Inherit => outer.lookup(&def.name).unwrap_or_else(|| {
                    Thunk::deferred(Expr::new(ExprKind::Var(def.name.clone()), def.span), Rc::clone(outer))
                }),
                AttrValue::InheritFrom(index) => {
                    let source = sources
                        .get(*index)
                        .cloned()
                        .ok_or_else(|| Error::new(ErrorKind::Internal("inherit source out of range".into())))?;
                    let name = def.name.clone();
                    Thunk::lazy(move |ev| {
                        let set = source.force(ev)?;
                        match set.as_attrs()?.get(&name) {
                            Some(thunk) => thunk.force(ev),
                            None => Err(Error::missing_attribute(name.clone())),
                        }
                    })
                }
                AttrValue::Nested(nested) => {
                    let nested = Rc::clone(nested);
                    let values = Rc::clone(values);
                    Thunk::lazy(move |ev| ev.build_attrs(&nested, &values, false))
                }
            };
            map.insert(def.name.clone(), thunk);
        }
        Ok(map)
    }

    fn dynamic_attrs(&self, bindings: &Bindings, scope: &Rc<Scope>, attrs: &mut AttrSet) -> Result<()> {
        for dynamic in &bindings.dynamic {
            let name = match self.eval(&dynamic.name, scope)? {
                Value::Null => continue,
                other => other.as_string()?.as_str().to_string(),
            };
            if attrs.contains(&name) {
                return Err(self.locate(
                    Error::eval(format!("dynamic attribute '{name}' already defined")),
                    dynamic.span,
                ));
            }
            attrs.insert(name, Thunk::deferred(Rc::clone(&dynamic.value), Rc::clone(scope)));
        }
        Ok(())
    }

    // =========================================================================
    // Function calls
    // =========================================================================

    /// Applies a function value to an argument.
    ///
    /// # Errors
    /// Fails if `func` is not callable, on call depth overflow, on
    /// interruption, or with any error raised by the function body.
    pub fn call(&self, func: &Value, arg: Thunk) -> Result<Value> {
        self.interrupt.check()?;
        let depth = self.depth.get();
        if depth >= self.config.max_call_depth {
            return Err(Error::new(ErrorKind::CallDepthExceeded(self.config.max_call_depth)));
        }
        self.depth.set(depth + 1);
        let result = self.call_value(func, arg);
        self.depth.set(depth);
        result
    }

    fn call_value(&self, func: &Value, arg: Thunk) -> Result<Value> {
        match func {
            Value::Lambda(closure) => self.call_lambda(closure, arg),
            Value::PrimOp(app) => {
                let mut args = app.args.clone();
                args.push(arg);
                if args.len() < app.op.arity() {
                    return Ok(Value::PrimOp(Rc::new(PrimOpApp { op: app.op, args })));
                }
                (app.op.func)(self, &args)
                    .map_err(|e| e.with_frame(format!("while calling the '{}' builtin", app.op.name)))
            }
            Value::Attrs(attrs) => match attrs.get("__functor") {
                Some(functor) => {
                    let functor = functor.force(self)?;
                    let bound = self.call(&functor, Thunk::ready(func.clone()))?;
                    self.call(&bound, arg)
                }
                None => Err(not_callable(func)),
            },
            other => Err(not_callable(other)),
        }
    }

    fn call_lambda(&self, closure: &Closure, arg: Thunk) -> Result<Value> {
        let lambda = &closure.lambda;
        let name = lambda.name.as_deref().unwrap_or("anonymous lambda");
        let scope = Scope::child(&closure.scope);
        match &lambda.param {
            Param::Ident(param) => scope.define(param.clone(), arg),
            Param::Pattern {
                formals,
                ellipsis,
                bind,
            } => {
                let value = arg.force(self)?;
                let attrs = value.as_attrs()?;
                for formal in formals {
                    let thunk = match (attrs.get(&formal.name), &formal.default) {
                        (Some(thunk), _) => thunk.clone(),
                        (None, Some(default)) => Thunk::deferred(Rc::clone(default), Rc::clone(&scope)),
                        (None, None) => {
                            return Err(Error::eval(format!(
                                "function '{name}' called without required argument '{}'",
                                formal.name
                            )));
                        }
                    };
                    scope.define(formal.name.clone(), thunk);
                }
                if !ellipsis {
                    if let Some(extra) = attrs
                        .names()
                        .find(|attr| !formals.iter().any(|f| f.name == *attr))
                    {
                        return Err(Error::eval(format!(
                            "function '{name}' called with unexpected argument '{extra}'"
                        )));
                    }
                }
                if let Some(bind) = bind {
                    scope.define(bind.clone(), arg);
                }
            }
        }
        self.eval(&lambda.body, &scope)
            .map_err(|e| e.with_frame(format!("while calling '{name}'")))
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn eval_binary(&self, op: BinaryOp, lhs: &ExprRef, rhs: &ExprRef, scope: &Rc<Scope>) -> Result<Value> {
        match op {
            BinaryOp::And => {
                return Ok(Value::Bool(
                    self.eval(lhs, scope)?.as_bool()? && self.eval(rhs, scope)?.as_bool()?,
                ));
            }
            BinaryOp::Or => {
                return Ok(Value::Bool(
                    self.eval(lhs, scope)?.as_bool()? || self.eval(rhs, scope)?.as_bool()?,
                ));
            }
            BinaryOp::Implies => {
                return Ok(Value::Bool(
                    !self.eval(lhs, scope)?.as_bool()? || self.eval(rhs, scope)?.as_bool()?,
                ));
            }
            _ => {}
        }

        let a = self.eval(lhs, scope)?;
        let b = self.eval(rhs, scope)?;
        match op {
            BinaryOp::Eq => Ok(Value::Bool(self.equal(&a, &b)?)),
            BinaryOp::NotEq => Ok(Value::Bool(!self.equal(&a, &b)?)),
            BinaryOp::Lt => Ok(Value::Bool(self.compare(&a, &b)? == Some(Ordering::Less))),
            BinaryOp::LtEq => Ok(Value::Bool(matches!(
                self.compare(&a, &b)?,
                Some(Ordering::Less | Ordering::Equal)
            ))),
            BinaryOp::Gt => Ok(Value::Bool(self.compare(&a, &b)? == Some(Ordering::Greater))),
            BinaryOp::GtEq => Ok(Value::Bool(matches!(
                self.compare(&a, &b)?,
                Some(Ordering::Greater | Ordering::Equal)
            ))),
            BinaryOp::Update => Ok(Value::attrs(a.as_attrs()?.update(b.as_attrs()?))),
            BinaryOp::Concat => {
                let mut items: Vec<Thunk> = a.as_list()?.iter().cloned().collect();
                items.extend(b.as_list()?.iter().cloned());
                Ok(Value::list(items))
            }
            BinaryOp::Add => self.add(&a, &b),
            _ => arithmetic(op, &a, &b),
        }
    }

    fn add(&self, a: &Value, b: &Value) -> Result<Value> {
        match (a, b) {
            (Value::String(x), Value::String(y)) => Ok(Value::String(x.concat(y))),
            (Value::String(x), Value::Path(p)) => {
                Ok(Value::String(x.concat(&NixString::new(p.display().to_string()))))
            }
            (Value::Path(p), Value::String(s)) => {
                if !s.context().is_empty() {
                    return Err(Error::eval(
                        "a string that refers to a store path cannot be appended to a path",
                    ));
                }
                let joined = format!("{}{}", p.display(), s.as_str());
                Ok(Value::Path(normalize_path(Path::new(&joined)).into()))
            }
            (Value::Path(p), Value::Path(q)) => {
                let joined = format!("{}{}", p.display(), q.display());
                Ok(Value::Path(normalize_path(Path::new(&joined)).into()))
            }
            (Value::Attrs(_), _) | (_, Value::Attrs(_)) => {
                let x = self.coerce_to_string(a, false)?;
                let y = self.coerce_to_string(b, false)?;
                Ok(Value::String(x.concat(&y)))
            }
            _ => arithmetic(BinaryOp::Add, a, b),
        }
    }

    /// Deep equality as `==` computes it.
    ///
    /// # Errors
    /// Propagates errors from forcing nested values.
    #[allow(clippy::float_cmp)]
    pub fn equal(&self, a: &Value, b: &Value) -> Result<bool> {
        Ok(match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                a.as_float()? == b.as_float()?
            }
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Path(x), Value::Path(y)) => x == y,
            (Value::List(x), Value::List(y)) => {
                if Rc::ptr_eq(x, y) {
                    return Ok(true);
                }
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (l, r) in x.iter().zip(y.iter()) {
                    if !l.ptr_eq(r) && !self.equal(&l.force(self)?, &r.force(self)?)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Attrs(x), Value::Attrs(y)) => {
                if Rc::ptr_eq(x, y) {
                    return Ok(true);
                }
                if self.is_derivation(x)? && self.is_derivation(y)? {
                    if let (Some(l), Some(r)) = (x.get("outPath"), y.get("outPath")) {
                        return self.equal(&l.force(self)?, &r.force(self)?);
                    }
                }
                if x.len() != y.len() {
                    return Ok(false);
                }
                for ((lk, l), (rk, r)) in x.iter().zip(y.iter()) {
                    if lk != rk {
                        return Ok(false);
                    }
                    if !l.ptr_eq(r) && !self.equal(&l.force(self)?, &r.force(self)?)? {
                        return Ok(false);
                    }
                }
                true
            }
            _ => false,
        })
    }

    /// Orders two values as `<` does. `None` means unordered (NaN).
    ///
    /// # Errors
    /// Fails for values that cannot be compared.
    pub fn compare(&self, a: &Value, b: &Value) -> Result<Option<Ordering>> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => Ok(Some(x.cmp(y))),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                Ok(a.as_float()?.partial_cmp(&b.as_float()?))
            }
            (Value::String(x), Value::String(y)) => Ok(Some(x.as_str().cmp(y.as_str()))),
            (Value::Path(x), Value::Path(y)) => Ok(Some(x.cmp(y))),
            (Value::List(x), Value::List(y)) => {
                for (l, r) in x.iter().zip(y.iter()) {
                    match self.compare(&l.force(self)?, &r.force(self)?)? {
                        Some(Ordering::Equal) => {}
                        other => return Ok(other),
                    }
                }
                Ok(Some(x.len().cmp(&y.len())))
            }
            _ => Err(Error::eval(format!(
                "cannot compare {} with {}",
                a.kind().describe(),
                b.kind().describe()
            ))),
        }
    }

    /// Converts a value to a string.
    ///
    /// Interpolation (`extended = false`) accepts strings, paths and sets
    /// with `__toString` or `outPath`. `toString` (`extended = true`) also
    /// accepts numbers, Booleans, null and lists.
    ///
    /// # Errors
    /// Fails with a coercion error for other values.
    pub fn coerce_to_string(&self, value: &Value, extended: bool) -> Result<NixString> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Path(p) => Ok(NixString::new(p.display().to_string())),
            Value::Attrs(attrs) => {
                if let Some(to_string) = attrs.get("__toString") {
                    let to_string = to_string.force(self)?;
                    let result = self.call(&to_string, Thunk::ready(value.clone()))?;
                    return self.coerce_to_string(&result, extended);
                }
                if let Some(out_path) = attrs.get("outPath") {
                    return self.coerce_to_string(&out_path.force(self)?, extended);
                }
                Err(coercion_error(value))
            }
            Value::Int(n) if extended => Ok(NixString::new(n.to_string())),
            Value::Float(n) if extended => Ok(NixString::new(format!("{n:.6}"))),
            Value::Bool(b) if extended => Ok(NixString::new(if *b { "1" } else { "" })),
            Value::Null if extended => Ok(NixString::default()),
            Value::List(items) if extended => {
                let mut out = NixString::default();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out = out.concat(&NixString::new(" "));
                    }
                    out = out.concat(&self.coerce_to_string(&item.force(self)?, true)?);
                }
                Ok(out)
            }
            other => Err(coercion_error(other)),
        }
    }

    /// Forces a value and everything reachable from it.
    ///
    /// # Errors
    /// Propagates the first error found.
    pub fn deep_force(&self, value: &Value) -> Result<()> {
        self.deep_force_inner(value, &mut HashSet::new())
    }

    fn deep_force_inner(&self, value: &Value, seen: &mut HashSet<usize>) -> Result<()> {
        match value {
            Value::List(items) => {
                if !seen.insert(Rc::as_ptr(items) as usize) {
                    return Ok(());
                }
                for item in items.iter() {
                    self.deep_force_inner(&item.force(self)?, seen)?;
                }
            }
            Value::Attrs(attrs) => {
                if !seen.insert(Rc::as_ptr(attrs) as usize) {
                    return Ok(());
                }
                for (_, item) in attrs.iter() {
                    self.deep_force_inner(&item.force(self)?, seen)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let result = match op {
                BinaryOp::Add => x.checked_add(*y),
                BinaryOp::Sub => x.checked_sub(*y),
                BinaryOp::Mul => x.checked_mul(*y),
                BinaryOp::Div if *y == 0 => return Err(Error::new(ErrorKind::DivisionByZero)),
                BinaryOp::Div => x.checked_div(*y),
                _ => return Err(Error::new(ErrorKind::Internal(format!("'{}' is not arithmetic", op.symbol())))),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| Error::new(ErrorKind::Overflow(format!("{x} {} {y}", op.symbol()))))
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let x = a.as_float()?;
            let y = b.as_float()?;
            match op {
                BinaryOp::Add => Ok(Value::Float(x + y)),
                BinaryOp::Sub => Ok(Value::Float(x - y)),
                BinaryOp::Mul => Ok(Value::Float(x * y)),
                BinaryOp::Div if y == 0.0 => Err(Error::new(ErrorKind::DivisionByZero)),
                BinaryOp::Div => Ok(Value::Float(x / y)),
                _ => Err(Error::new(ErrorKind::Internal(format!("'{}' is not arithmetic", op.symbol())))),
            }
        }
        (Value::Int(_) | Value::Float(_), other) | (other, _) => {
            if op == BinaryOp::Add {
                Err(Error::eval(format!("cannot add {} to {}", b.describe(), a.describe())))
            } else {
                Err(Error::type_mismatch("a number", other.describe()))
            }
        }
    }
}

fn not_callable(value: &Value) -> Error {
    Error::eval(format!(
        "attempt to call something which is not a function but {}",
        value.describe()
    ))
}

fn coercion_error(value: &Value) -> Error {
    Error::new(ErrorKind::Coercion(value.kind().describe().to_string()))
}

fn locate_parse_error(err: Error, name: &str) -> Error {
    let position = match &err.kind {
        ErrorKind::ParseError { line, column, .. } => Some((*line, *column)),
        _ => None,
    };
    match position {
        Some((line, column)) => err.at(name, line, column),
        None => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> Result<Value> {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let value = ev.eval_str(source, &Rc::clone(ev.globals()))?;
        ev.deep_force(&value)?;
        Ok(value)
    }

    fn eval_int(source: &str) -> i64 {
        match eval(source) {
            Ok(Value::Int(n)) => n,
            other => panic!("{source}: {other:?}"),
        }
    }

    fn eval_err(source: &str) -> Error {
        match eval(source) {
            Ok(value) => panic!("{source} evaluated to {value:?}"),
            Err(err) => err,
        }
    }

    // =========================================================================
    // Basics
    // =========================================================================

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval_int("100 * 5"), 500);
        assert_eq!(eval_int("1 + 2 * 3 - 4 / 2"), 5);
        assert_eq!(eval_int("-(3 - 5)"), 2);
        assert!(matches!(eval("1 + 0.5"), Ok(Value::Float(f)) if (f - 1.5).abs() < f64::EPSILON));
    }

    #[test]
    fn integer_errors() {
        assert!(matches!(eval_err("1 / 0").kind, ErrorKind::DivisionByZero));
        assert!(matches!(eval_err("9223372036854775807 + 1").kind, ErrorKind::Overflow(_)));
    }

    #[test]
    fn let_and_rec_bindings() {
        assert_eq!(eval_int("let a = 1; b = a + 1; in b"), 2);
        assert_eq!(eval_int("rec { a = 1; b = a + 1; }.b"), 2);
        assert_eq!(eval_int("let a = 1; in rec { b = a; a = 2; }.b"), 2);
        assert_eq!(eval_int("let x = { a.b = 1; a.c = 2; }; in x.a.b + x.a.c"), 3);
    }

    #[test]
    fn inherit_forms() {
        assert_eq!(eval_int("let a = 1; s = { inherit a; }; in s.a"), 1);
        assert_eq!(eval_int("let s = { x = 5; }; t = { inherit (s) x; }; in t.x"), 5);
    }

    #[test]
    fn with_is_consulted_after_lexical_scope() {
        assert_eq!(eval_int("let a = 1; in with { a = 2; b = 3; }; a + b"), 4);
    }

    #[test]
    fn functions_and_patterns() {
        assert_eq!(eval_int("(x: x * 2) 21"), 42);
        assert_eq!(eval_int("({ a, b ? 10 }: a + b) { a = 1; }"), 11);
        assert_eq!(eval_int("(args@{ a, ... }: args.b) { a = 1; b = 2; }"), 2);
        let err = eval_err("let f = { a }: a; in f { }");
        assert!(err.to_string().contains("called without required argument 'a'"));
        let err = eval_err("let f = { a }: a; in f { a = 1; b = 2; }");
        assert!(err.to_string().contains("unexpected argument 'b'"));
    }

    #[test]
    fn functor_sets_are_callable() {
        assert_eq!(eval_int("let f = { n = 2; __functor = self: x: self.n * x; }; in f 4"), 8);
    }

    #[test]
    fn select_default_and_has_attr() {
        assert_eq!(eval_int("{ a = 1; }.b or 7"), 7);
        assert!(matches!(eval("{ a.b = 1; } ? a.b"), Ok(Value::Bool(true))));
        assert!(matches!(eval("1 ? a"), Ok(Value::Bool(false))));
        assert!(matches!(eval_err("{ }.x").kind, ErrorKind::MissingAttribute(_)));
    }

    #[test]
    fn dynamic_attributes() {
        assert_eq!(eval_int(r#"let n = "x"; in { ${n} = 3; }.x"#), 3);
        assert_eq!(eval_int(r#"{ "${"a" + "b"}" = 4; }.ab"#), 4);
    }

    #[test]
    fn strings_and_interpolation() {
        let value = eval(r#"let n = "world"; in "hello ${n}""#).unwrap();
        assert_eq!(value.as_string().unwrap().as_str(), "hello world");
        let value = eval(r#""a" + "b""#).unwrap();
        assert_eq!(value.as_string().unwrap().as_str(), "ab");
        let err = eval_err(r#""${1}""#);
        assert_eq!(err.to_string(), "cannot coerce an integer to a string");
        let value = eval(r#""${{ outPath = "/x"; }}""#).unwrap();
        assert_eq!(value.as_string().unwrap().as_str(), "/x");
    }

    #[test]
    fn equality_and_ordering() {
        assert!(matches!(eval("[ 1 { a = 2; } ] == [ 1 { a = 2; } ]"), Ok(Value::Bool(true))));
        assert!(matches!(eval("1 == 1.0"), Ok(Value::Bool(true))));
        assert!(matches!(eval(r#""a" < "b""#), Ok(Value::Bool(true))));
        assert!(matches!(eval("[ 1 2 ] < [ 1 3 ]"), Ok(Value::Bool(true))));
        assert!(eval_err("{ } < 1").to_string().contains("cannot compare"));
    }

    #[test]
    fn laziness() {
        assert_eq!(eval_int("let x = throw \"no\"; in 1"), 1);
        assert_eq!(eval_int("builtins.length [ (throw \"no\") 2 ]"), 2);
    }

    #[test]
    fn infinite_recursion_detected() {
        let err = eval_err("let x = x + 1; in x");
        assert!(matches!(err.kind, ErrorKind::InfiniteRecursion));
    }

    #[test]
    fn call_depth_is_bounded() {
        let config = EvalConfig {
            max_call_depth: 32,
            ..EvalConfig::default()
        };
        let ev = Evaluator::new(config, Interrupt::new());
        let err = ev
            .eval_str("let f = x: f x; in f 1", &Rc::clone(ev.globals()))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::CallDepthExceeded(32)));
    }

    #[test]
    fn interrupt_stops_evaluation() {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        ev.interrupt().trigger();
        let err = ev
            .eval_str("(x: x) 1", &Rc::clone(ev.globals()))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Interrupted));
    }

    #[test]
    fn errors_carry_positions() {
        let err = eval_err("let\n  a = b;\nin a");
        let ctx = err.context.unwrap();
        assert_eq!(ctx.source.as_deref(), Some(INTERACTIVE_SOURCE));
        assert_eq!(ctx.line, Some(2));
        assert_eq!(ctx.column, Some(7));
    }

    #[test]
    fn assertion_message_quotes_condition() {
        let err = eval_err("assert 1 == 2; 3");
        assert_eq!(err.to_string(), "assertion '1 == 2' failed");
    }

    // =========================================================================
    // Paths and imports
    // =========================================================================

    #[test]
    fn normalize_removes_dots() {
        assert_eq!(normalize_path(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize_path(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn nix_path_entries() {
        let entries = parse_nix_path("nixpkgs=/x/y:/z");
        assert_eq!(entries[0], ("nixpkgs".to_string(), PathBuf::from("/x/y")));
        assert_eq!(entries[1], (String::new(), PathBuf::from("/z")));
    }

    #[test]
    fn import_resolves_relative_paths_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.nix"), "{ b = import ./b.nix; }").unwrap();
        std::fs::write(dir.path().join("b.nix"), "40 + 2").unwrap();
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let value = ev.import(&dir.path().join("a.nix")).unwrap();
        let b = value.as_attrs().unwrap().get("b").unwrap().force(&ev).unwrap();
        assert!(matches!(b, Value::Int(42)));
        std::fs::write(dir.path().join("b.nix"), "0").unwrap();
        let again = ev.import(&dir.path().join("b.nix")).unwrap();
        assert!(matches!(again, Value::Int(42)));
        ev.clear_import_cache();
        assert!(matches!(ev.import(&dir.path().join("b.nix")).unwrap(), Value::Int(0)));
    }

    #[test]
    fn search_path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkgs")).unwrap();
        std::fs::write(dir.path().join("pkgs").join("default.nix"), "7").unwrap();
        let config = EvalConfig {
            search_path: vec![("pkgs".into(), dir.path().join("pkgs"))],
            ..EvalConfig::default()
        };
        let ev = Evaluator::new(config, Interrupt::new());
        let value = ev.eval_str("import <pkgs>", &Rc::clone(ev.globals())).unwrap();
        assert!(matches!(value, Value::Int(7)));
        let err = ev.eval_str("<missing>", &Rc::clone(ev.globals())).unwrap_err();
        assert!(err.to_string().contains("was not found in the Nix search path"));
    }

    #[test]
    fn auto_call_applies_defaults() {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let f = ev.eval_str("{ x ? 3 }: x * 2", &Rc::clone(ev.globals())).unwrap();
        assert!(matches!(ev.auto_call(f).unwrap(), Value::Int(6)));
    }
}

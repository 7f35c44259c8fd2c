//! Session bindings.
//!
//! Every batch of additions becomes a new scope frame below the previous
//! one. Lookups see the newest binding of a name, while thunks created
//! earlier keep the frame they closed over, so shadowing never rewrites
//! history.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use im::{OrdMap, Vector};
use nixkernel_language::{Scope, Thunk};

/// Where a binding came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// `x = ...` input or `:add`.
    Literal,
    /// `:load` of a file.
    File(PathBuf),
    /// `:load-flake` of a flake reference.
    Flake(String),
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal => f.write_str("literal"),
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Flake(reference) => write!(f, "flake {reference}"),
        }
    }
}

/// A named, deferred session value.
#[derive(Clone, Debug)]
pub struct Binding {
    /// Variable name.
    pub name: String,
    /// The value, evaluated on first use.
    pub value: Thunk,
    /// Origin of the binding.
    pub provenance: Provenance,
}

/// The ordered set of session bindings.
#[derive(Clone)]
pub struct Environment {
    scope: Rc<Scope>,
    history: Vector<Binding>,
    index: OrdMap<String, usize>,
}

impl Environment {
    /// Creates an empty environment whose lookups fall back to `globals`.
    #[must_use]
    pub fn new(globals: &Rc<Scope>) -> Self {
        Self {
            scope: Scope::child(globals),
            history: Vector::new(),
            index: OrdMap::new(),
        }
    }

    /// Returns the scope session expressions evaluate in.
    #[must_use]
    pub const fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    /// Adds bindings, shadowing earlier ones of the same name. Returns the
    /// number of bindings added.
    pub fn add<I>(&mut self, bindings: I, provenance: &Provenance) -> usize
    where
        I: IntoIterator<Item = (String, Thunk)>,
    {
        let mut frame = HashMap::new();
        for (name, value) in bindings {
            self.index.insert(name.clone(), self.history.len());
            self.history.push_back(Binding {
                name: name.clone(),
                value: value.clone(),
                provenance: provenance.clone(),
            });
            frame.insert(name, value);
        }
        let added = frame.len();
        if added > 0 {
            self.scope = Scope::with_vars(&self.scope, frame);
        }
        added
    }

    /// Returns the current binding of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.index.get(name).and_then(|&i| self.history.get(i))
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns the number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if nothing has been bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the bound names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Returns every binding ever added, oldest first, shadowed ones
    /// included.
    pub fn history(&self) -> impl Iterator<Item = &Binding> {
        self.history.iter()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.index.keys().collect::<Vec<_>>())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nixkernel_foundation::Interrupt;
    use nixkernel_language::{EvalConfig, Evaluator, Value};

    fn int(ev: &Evaluator, thunk: &Thunk) -> i64 {
        thunk.force(ev).unwrap().as_int().unwrap()
    }

    #[test]
    fn added_names_are_visible() {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let mut env = Environment::new(ev.globals());
        let added = env.add(
            [
                ("a".to_string(), Thunk::ready(Value::Int(1))),
                ("b".to_string(), Thunk::ready(Value::Int(2))),
            ],
            &Provenance::Literal,
        );
        assert_eq!(added, 2);
        assert_eq!(env.len(), 2);
        let value = ev.eval_str("a + b", env.scope()).unwrap();
        assert_eq!(value.as_int().unwrap(), 3);
        assert_eq!(env.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn shadowing_keeps_history() {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let mut env = Environment::new(ev.globals());
        env.add([("x".to_string(), Thunk::ready(Value::Int(1)))], &Provenance::Literal);
        let before = ev.thunk_for(&ev.parse("x * 10", "test", std::path::Path::new("/")).unwrap(), env.scope());

        env.add(
            [("x".to_string(), Thunk::ready(Value::Int(2)))],
            &Provenance::File(PathBuf::from("/a.nix")),
        );

        assert_eq!(int(&ev, &env.get("x").unwrap().value), 2);
        assert_eq!(env.get("x").unwrap().provenance, Provenance::File(PathBuf::from("/a.nix")));
        assert_eq!(int(&ev, &before), 10);
        assert_eq!(env.len(), 1);
        assert_eq!(env.history().count(), 2);
    }

    #[test]
    fn builtins_remain_reachable() {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let env = Environment::new(ev.globals());
        let value = ev.eval_str("builtins.length [ 1 2 ]", env.scope()).unwrap();
        assert_eq!(value.as_int().unwrap(), 2);
        assert!(env.is_empty());
    }

    #[test]
    fn empty_batch_adds_no_frame() {
        let ev = Evaluator::new(EvalConfig::default(), Interrupt::new());
        let mut env = Environment::new(ev.globals());
        let scope = Rc::clone(env.scope());
        assert_eq!(env.add(Vec::new(), &Provenance::Literal), 0);
        assert!(Rc::ptr_eq(&scope, env.scope()));
    }
}

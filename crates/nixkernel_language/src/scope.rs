//! Lexical scopes.
//!
//! A scope is a chain of frames. Variable frames bind names to thunks;
//! `with` frames hold a thunk for a set whose attributes are consulted only
//! after every variable frame missed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::thunk::Thunk;

/// What a scope frame binds.
pub enum ScopeKind {
    /// Names bound by `let`, `rec`, lambda parameters or the session.
    Vars(RefCell<HashMap<String, Thunk>>),
    /// The set introduced by `with e;`.
    With(Thunk),
}

/// One frame in a scope chain.
pub struct Scope {
    kind: ScopeKind,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    /// Creates a root frame with no bindings.
    #[must_use]
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            kind: ScopeKind::Vars(RefCell::new(HashMap::new())),
            parent: None,
        })
    }

    /// Creates an empty variable frame below `parent`.
    #[must_use]
    pub fn child(parent: &Rc<Self>) -> Rc<Self> {
        Self::with_vars(parent, HashMap::new())
    }

    /// Creates a variable frame below `parent` holding `vars`.
    #[must_use]
    pub fn with_vars(parent: &Rc<Self>, vars: HashMap<String, Thunk>) -> Rc<Self> {
        Rc::new(Self {
            kind: ScopeKind::Vars(RefCell::new(vars)),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Creates a `with` frame below `parent`.
    #[must_use]
    pub fn with_set(parent: &Rc<Self>, set: Thunk) -> Rc<Self> {
        Rc::new(Self {
            kind: ScopeKind::With(set),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Binds `name` in this frame. Has no effect on `with` frames.
    pub fn define(&self, name: impl Into<String>, value: Thunk) {
        if let ScopeKind::Vars(vars) = &self.kind {
            vars.borrow_mut().insert(name.into(), value);
        }
    }

    /// Finds `name` in the variable frames, innermost first.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Thunk> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let ScopeKind::Vars(vars) = &scope.kind {
                if let Some(value) = vars.borrow().get(name) {
                    return Some(value.clone());
                }
            }
            frame = scope.parent.as_deref();
        }
        None
    }

    /// Returns the `with` sets in the chain, innermost first.
    #[must_use]
    pub fn with_sets(&self) -> Vec<Thunk> {
        let mut sets = Vec::new();
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let ScopeKind::With(set) = &scope.kind {
                sets.push(set.clone());
            }
            frame = scope.parent.as_deref();
        }
        sets
    }

    /// Returns every name bound by variable frames.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let ScopeKind::Vars(vars) = &scope.kind {
                names.extend(vars.borrow().keys().cloned());
            }
            frame = scope.parent.as_deref();
        }
        names.sort();
        names.dedup();
        names
    }
}

//! Call-by-need thunks.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use nixkernel_foundation::{Error, ErrorKind, Result};

use crate::ast::ExprRef;
use crate::eval::Evaluator;
use crate::scope::Scope;
use crate::value::Value;

/// Native computation producing a value on demand.
pub type LazyFn = Rc<dyn Fn(&Evaluator) -> Result<Value>>;

enum ThunkState {
    /// Expression not yet evaluated.
    Deferred { expr: ExprRef, scope: Rc<Scope> },
    /// Native computation not yet run.
    Lazy(LazyFn),
    /// Being forced right now; forcing again is a cycle.
    Forcing,
    /// Memoized result.
    Ready(Value),
}

/// A shared, memoizing cell holding a deferred value.
///
/// Clones share the cell, so forcing one forces all.
#[derive(Clone)]
pub struct Thunk(Rc<RefCell<ThunkState>>);

impl Thunk {
    /// Creates an already evaluated thunk.
    #[must_use]
    pub fn ready(value: Value) -> Self {
        Self::from_state(ThunkState::Ready(value))
    }

    /// Creates a thunk evaluating `expr` in `scope` when forced.
    #[must_use]
    pub fn deferred(expr: ExprRef, scope: Rc<Scope>) -> Self {
        Self::from_state(ThunkState::Deferred { expr, scope })
    }

    /// Creates a thunk running `f` when forced.
    #[must_use]
    pub fn lazy(f: impl Fn(&Evaluator) -> Result<Value> + 'static) -> Self {
        Self::from_state(ThunkState::Lazy(Rc::new(f)))
    }

    fn from_state(state: ThunkState) -> Self {
        Self(Rc::new(RefCell::new(state)))
    }

    /// Returns the value if the thunk has been forced.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        match &*self.0.borrow() {
            ThunkState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns true if the thunk has been forced.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(&*self.0.borrow(), ThunkState::Ready(_))
    }

    /// Returns true if both handles share one cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Forces the thunk, memoizing the result.
    ///
    /// # Errors
    /// Propagates evaluation errors; fails with infinite recursion if the
    /// thunk is already being forced. A failed force leaves the thunk
    /// deferred so forcing again re-raises.
    pub fn force(&self, evaluator: &Evaluator) -> Result<Value> {
        if let Some(value) = self.value() {
            return Ok(value);
        }
        evaluator.interrupt().check()?;

        let state = self.0.replace(ThunkState::Forcing);
        let result = match &state {
            ThunkState::Deferred { expr, scope } => evaluator.eval(expr, scope),
            ThunkState::Lazy(f) => f(evaluator),
            ThunkState::Forcing => Err(Error::new(ErrorKind::InfiniteRecursion)),
            ThunkState::Ready(value) => Ok(value.clone()),
        };
        match result {
            Ok(value) => {
                *self.0.borrow_mut() = ThunkState::Ready(value.clone());
                Ok(value)
            }
            Err(err) => {
                *self.0.borrow_mut() = state;
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.borrow() {
            ThunkState::Ready(value) => f.debug_tuple("Thunk").field(value).finish(),
            ThunkState::Deferred { expr, .. } => write!(f, "Thunk(<deferred {:?}>)", expr.span),
            ThunkState::Lazy(_) => f.write_str("Thunk(<lazy>)"),
            ThunkState::Forcing => f.write_str("Thunk(<forcing>)"),
        }
    }
}

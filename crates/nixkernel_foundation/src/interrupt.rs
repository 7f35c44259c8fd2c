//! Cancellation handle shared between the signal handler, the evaluator and
//! subprocess supervision.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::error::{Error, Result};

/// A cloneable interrupt flag.
///
/// The evaluator polls [`Interrupt::check`]; async code awaits
/// [`Interrupt::wait`]. Both observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    /// Creates an untriggered handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the interrupt and wakes every waiter.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Clears the flag at the start of a new request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Returns whether the interrupt has been raised.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fails with [`crate::ErrorKind::Interrupted`] if the interrupt is raised.
    ///
    /// # Errors
    ///
    /// Returns an interruption error when triggered.
    pub fn check(&self) -> Result<()> {
        if self.is_triggered() {
            Err(Error::interrupted())
        } else {
            Ok(())
        }
    }

    /// Completes once the interrupt is raised.
    pub async fn wait(&self) {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

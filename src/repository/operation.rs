// src/repository/operation.rs

//! Operation scopes
//!
//! Callers can tell a repository that a multi-step operation (an install, a
//! restore) is running, so remote repositories can tag their requests with it.
//! The operation ends when the returned guard is dropped.

use std::fmt;

/// Ends an operation on one or more repositories when dropped
pub struct OperationGuard {
    on_end: Vec<Box<dyn FnOnce() + Send>>,
}

impl OperationGuard {
    /// A guard with nothing to end
    pub fn noop() -> Self {
        Self { on_end: Vec::new() }
    }

    /// A guard that runs `on_end` when dropped
    pub fn new(on_end: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_end: vec![Box::new(on_end)],
        }
    }

    /// Combine guards into one; dropping it ends them in the given order
    pub fn all(guards: impl IntoIterator<Item = OperationGuard>) -> Self {
        let mut on_end = Vec::new();
        for mut guard in guards {
            on_end.append(&mut guard.on_end);
        }
        Self { on_end }
    }

    pub fn is_noop(&self) -> bool {
        self.on_end.is_empty()
    }
}

impl Default for OperationGuard {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for OperationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationGuard")
            .field("pending", &self.on_end.len())
            .finish()
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        for end in self.on_end.drain(..) {
            end();
        }
    }
}

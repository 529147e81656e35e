//! Cooperative cancellation tokens
//!
//! Every subagent task receives a [`CancellationToken`]. Cancellation is
//! cooperative: callers check the token at each suspension point (model
//! calls, tool invocations, registry polls, disk I/O) and stop at the next
//! checkpoint. Cancelling a parent token cancels every descendant, which is
//! how parent-subagent cancellation cascades without the registry holding
//! ownership pointers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CoreError, Result};

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }
}

/// Cheap, cloneable cancellation handle
///
/// Clones observe the same flag. Child tokens (via [`child`]) additionally
/// observe their parent: cancelling the parent cancels the child, but
/// cancelling the child leaves the parent running.
///
/// [`child`]: CancellationToken::child
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a root token
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// Create a child token that observes this token's cancellation
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                parent: Some(Arc::clone(&self.inner)),
            }),
        }
    }

    /// Request cancellation for this token and all descendants
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// True if this token or any ancestor has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Cooperative checkpoint: return `Err(Cancelled)` if fired
    ///
    /// Call at every suspension point:
    ///
    /// ```rust
    /// use sunwell_core::cancel::CancellationToken;
    /// use sunwell_core::error::Result;
    ///
    /// async fn slow_step(token: &CancellationToken) -> Result<()> {
    ///     token.checkpoint()?;
    ///     // ... model call ...
    ///     token.checkpoint()?;
    ///     // ... tool invocation ...
    ///     Ok(())
    /// }
    /// ```
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

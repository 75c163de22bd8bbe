//! Cancellation signal shared by a run and everyone who may stop it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Handle for cancellation of a run.
///
/// `AbortHandle` can be cloned and shared across threads and tasks; any
/// clone can trigger the abort, which is visible to all other clones.
/// Blocking code polls [`is_aborted`](Self::is_aborted), async code awaits
/// [`aborted`](Self::aborted).
///
/// # Example
///
/// ```
/// use runbox_core::execute::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_aborted());
/// handle_clone.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Request abort. Idempotent.
    pub fn abort(&self) {
        if !self.inner.aborted.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Resolves once abort has been requested.
    pub async fn aborted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

//! Cancellable background operations.

use crate::backup::{RestorePhase, RestoreProgress};
use crate::error::{CoreError, CoreResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Shared cancellation flag.
///
/// Streams driven by a backup or restore check the token before every read
/// or write and fail with [`CoreError::Cancelled`] once it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A backup or restore running on its own thread.
///
/// Dropping the task detaches the thread; it still runs to completion or
/// to its next cancellation check.
pub struct OperationTask<T> {
    handle: JoinHandle<CoreResult<T>>,
    cancel: CancelToken,
    progress: Option<RestoreProgress>,
}

impl<T: Send + 'static> OperationTask<T> {
    pub(crate) fn spawn<F>(
        label: String,
        cancel: CancelToken,
        progress: Option<RestoreProgress>,
        op: F,
    ) -> CoreResult<Self>
    where
        F: FnOnce() -> CoreResult<T> + Send + 'static,
    {
        let handle = thread::Builder::new().name(label).spawn(op)?;
        Ok(Self {
            handle,
            cancel,
            progress,
        })
    }

    /// Requests cancellation at the next stream read or write.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The token this task checks.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Returns whether the operation has finished, successfully or not.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Current phase, for restore tasks.
    #[must_use]
    pub fn restore_phase(&self) -> Option<RestorePhase> {
        self.progress.as_ref().map(RestoreProgress::phase)
    }

    /// Waits for the operation and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error, or [`CoreError::TaskPanicked`] if
    /// the thread panicked.
    pub fn join(self) -> CoreResult<T> {
        self.handle.join().map_err(|_| CoreError::TaskPanicked)?
    }
}

impl<T> fmt::Debug for OperationTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTask")
            .field("thread", &self.handle.thread().name())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

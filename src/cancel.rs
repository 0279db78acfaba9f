use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A cooperative cancellation flag shared between an archive and whoever
/// wants to stop it.
///
/// Clones share the same flag. Long running operations poll it once per
/// entry read and once per directory child appended; when they find it set
/// they clear it and fail with [`Error::Interrupted`]. Bytes already copied
/// are not rolled back.
///
/// A request stays pending until some operation observes it, even across
/// calls: cancelling while no operation runs makes the next `next_entry`,
/// `extract_all`, `extract_glob` or `append_tree` on a handle polling this
/// token fail straight away. Call [`reset`](CancelToken::reset) before
/// starting an operation to discard a stale request.
///
/// ```
/// use tarstream::CancelToken;
///
/// let token = CancelToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
///
/// // Nothing observed the request; drop it before the next operation.
/// token.reset();
/// assert!(!handle.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token which is not cancelled.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Requests cancellation. Safe to call from any thread, including a
    /// signal handling thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested and not yet observed.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Withdraws a pending cancellation request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    // Observes the flag: a pending request is consumed and reported.
    pub(crate) fn check(&self) -> Result<()> {
        if self.flag.swap(false, Ordering::SeqCst) {
            log::debug!("cancellation observed");
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

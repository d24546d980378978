use std::fmt;

/// Cancellation token returned by every push-based query.
///
/// Cancelling is the only way to stop a subscription. `cancel` runs the
/// runtime's cancel hook at most once; dropping the token cancels it.
#[must_use = "dropping a CancelSubscription cancels the subscription"]
pub struct CancelSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl CancelSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A token with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for CancelSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for CancelSubscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CancelSubscription")
            .field("active", &self.is_active())
            .finish()
    }
}

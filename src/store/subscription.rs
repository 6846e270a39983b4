use parking_lot::Mutex;
use std::sync::Arc;

/// Callback shape shared by store subscribers and derivation links.
pub type WatchCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

type Cancel = Box<dyn FnOnce() + Send>;

/// Guard for an active subscription.
///
/// Dropping the guard unsubscribes, mirroring the usual RAII watcher idiom.
/// [`unsubscribe`](Subscription::unsubscribe) is explicit and idempotent:
/// calling it twice, or after the source store was disposed, is a no-op.
/// [`detach`](Subscription::detach) keeps the registration alive for the
/// lifetime of its source instead.
pub struct Subscription {
    cancel: Mutex<Option<Cancel>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription that was never registered, returned by disposed stores.
    pub(crate) fn inert() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    /// Remove the subscriber. Safe to call any number of times, including
    /// from inside a notification pass of the store being unsubscribed from.
    pub fn unsubscribe(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether the registration is still live.
    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Consume the guard without unsubscribing. The subscriber then stays
    /// registered for as long as its source exists.
    pub fn detach(self) {
        let _ = self.cancel.lock().take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

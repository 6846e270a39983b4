use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use crate::equality::{shallow, Comparator, ShallowEq};
use crate::runtime::ids;
use crate::store::actions::{Actions, ActionsConfig};
use crate::store::lifecycle::{Hooks, Phase};
use crate::store::subscription::{Subscription, WatchCallback};

/// A shareable, subscribable state container.
///
/// A `Store` owns its state value and an ordered set of subscribers. Handles
/// are cheap to clone and share one underlying store. State is replaced
/// wholesale on every mutation; subscribers are notified synchronously, in
/// subscription order, from a snapshot of the subscriber list, so re-entrant
/// `set`, `subscribe`, and `unsubscribe` calls from inside a callback are
/// all legal. When a callback sets state again, last write wins.
///
/// A second value, the metadata, rides along for bookkeeping. It shares the
/// accessor surface but never triggers subscriber notification.
///
/// # Examples
///
/// ```
/// use canister::Store;
///
/// let store = Store::new(1i32);
/// let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
/// let seen_clone = std::sync::Arc::clone(&seen);
///
/// let _sub = store.subscribe(move |value| {
///     seen_clone.lock().unwrap().push(*value);
/// });
///
/// store.update(|n| n * 10);
/// assert_eq!(store.get(), 10);
/// assert_eq!(*seen.lock().unwrap(), vec![1, 10]);
/// ```
pub struct Store<T, M = ()> {
    pub(super) inner: Arc<StoreInner<T, M>>,
}

impl<T, M> Clone for Store<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, M> std::fmt::Debug for Store<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

pub(super) struct StoreInner<T, M> {
    pub(super) name: String,
    pub(super) state: RwLock<T>,
    pub(super) metadata: RwLock<M>,
    pub(super) subscribers: Mutex<BTreeMap<u64, WatchCallback<T>>>,
    pub(super) phase: Mutex<Phase>,
    pub(super) hooks: Hooks<T, M>,
    pub(super) actions: Option<ActionsConfig<T, M>>,
}

/// Options for plain subscriptions.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubscribeOptions {
    /// Suppress the immediate synchronous call delivered on subscription.
    pub skip_first: bool,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_first(mut self, skip: bool) -> Self {
        self.skip_first = skip;
        self
    }
}

/// Options for selector subscriptions.
pub struct SelectorOptions<D> {
    /// Suppress the immediate synchronous call delivered on subscription.
    pub skip_first: bool,
    /// Comparator deciding whether a newly projected value counts as a
    /// change. Defaults to shallow equality.
    pub comparator: Option<Comparator<D>>,
}

impl<D> Default for SelectorOptions<D> {
    fn default() -> Self {
        Self {
            skip_first: false,
            comparator: None,
        }
    }
}

impl<D> SelectorOptions<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_first(mut self, skip: bool) -> Self {
        self.skip_first = skip;
        self
    }

    pub fn comparator(mut self, cmp: impl Fn(&D, &D) -> bool + Send + Sync + 'static) -> Self {
        self.comparator = Some(Arc::new(cmp));
        self
    }
}

impl<T> Store<T, ()>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a store with the given initial state and no hooks, actions,
    /// metadata, or persistence. Use [`Store::builder`] for the full
    /// configuration surface.
    pub fn new(initial: T) -> Self {
        crate::store::StoreBuilder::new(initial).build()
    }

    /// Start configuring a store with unit metadata. Use
    /// [`StoreBuilder::new`](crate::StoreBuilder::new) directly for a custom
    /// metadata type.
    pub fn builder(initial: T) -> crate::store::StoreBuilder<T, ()> {
        crate::store::StoreBuilder::new(initial)
    }
}

impl<T, M> Store<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    pub(super) fn from_inner(inner: Arc<StoreInner<T, M>>) -> Self {
        Self { inner }
    }

    /// Diagnostic name of this store.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current state, cloned.
    pub fn get(&self) -> T {
        self.inner.state.read().clone()
    }

    /// Read the state in place without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.read())
    }

    /// Replace the state and notify subscribers.
    ///
    /// The configured veto hook runs first and can cancel the transition,
    /// in which case nothing happens: no mutation, no notification, no
    /// change hook. After disposal this is a silent no-op.
    pub fn set(&self, next: T) {
        self.commit(next);
    }

    /// Replace the state with the result of `f` applied to the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let candidate = {
            let state = self.inner.state.read();
            f(&state)
        };
        self.commit(candidate);
    }

    fn commit(&self, candidate: T) {
        if self.is_disposed() {
            return;
        }

        if let Some(veto) = &self.inner.hooks.prevent_state_change {
            let current = self.inner.state.read().clone();
            if veto(&candidate, &current) {
                trace!(store = %self.inner.name, "state change vetoed");
                return;
            }
        }

        let previous = {
            let mut state = self.inner.state.write();
            std::mem::replace(&mut *state, candidate.clone())
        };
        trace!(store = %self.inner.name, "state committed");

        self.notify(&candidate);

        // A subscriber may have disposed the store mid-notification.
        if self.is_disposed() {
            return;
        }
        if let Some(changed) = &self.inner.hooks.on_state_changed {
            changed(self, &candidate, &previous);
        }
    }

    // Snapshot the subscriber list before calling out so callbacks can
    // subscribe, unsubscribe, or set state without corrupting the pass.
    fn notify(&self, state: &T) {
        let snapshot: Vec<WatchCallback<T>> =
            self.inner.subscribers.lock().values().cloned().collect();
        for callback in snapshot {
            callback(state);
        }
    }

    /// Current metadata, cloned.
    pub fn metadata(&self) -> M
    where
        M: Clone,
    {
        self.inner.metadata.read().clone()
    }

    /// Read the metadata in place without cloning.
    pub fn with_metadata<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.inner.metadata.read())
    }

    /// Replace the metadata. Never notifies subscribers.
    pub fn set_metadata(&self, next: M) {
        if self.is_disposed() {
            return;
        }
        *self.inner.metadata.write() = next;
    }

    /// Replace the metadata with the result of `f` applied to the current
    /// value. Never notifies subscribers.
    pub fn update_metadata(&self, f: impl FnOnce(&M) -> M) {
        if self.is_disposed() {
            return;
        }
        let next = {
            let metadata = self.inner.metadata.read();
            f(&metadata)
        };
        *self.inner.metadata.write() = next;
    }

    /// Subscribe to state changes.
    ///
    /// The callback is invoked immediately with the current value, so a new
    /// observer is synchronized without waiting for the next mutation.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.subscribe_with(SubscribeOptions::default(), callback)
    }

    /// Subscribe with options; `skip_first` suppresses only the immediate
    /// synchronous call.
    pub fn subscribe_with(
        &self,
        options: SubscribeOptions,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        if self.is_disposed() {
            return Subscription::inert();
        }

        let callback: WatchCallback<T> = Arc::new(callback);
        let subscription = self.register(Arc::clone(&callback));

        if !options.skip_first {
            let current = self.get();
            callback(&current);
        }
        if let Some(hook) = &self.inner.hooks.on_subscribed {
            hook(self);
        }
        subscription
    }

    /// Subscribe to a projection of the state with the default shallow
    /// comparator. The callback fires only when the projected value differs
    /// from the previous projection.
    pub fn subscribe_selector<D>(
        &self,
        selector: impl Fn(&T) -> D + Send + Sync + 'static,
        callback: impl Fn(&D) + Send + Sync + 'static,
    ) -> Subscription
    where
        D: ShallowEq + Clone + Send + Sync + 'static,
    {
        self.subscribe_selector_with(selector, SelectorOptions::default(), callback)
    }

    /// Selector subscription with an explicit comparator and/or `skip_first`.
    ///
    /// The cached baseline is updated after every projection, whether or not
    /// the callback fired, so repeated no-op states never compare against a
    /// stale baseline.
    pub fn subscribe_selector_with<D>(
        &self,
        selector: impl Fn(&T) -> D + Send + Sync + 'static,
        options: SelectorOptions<D>,
        callback: impl Fn(&D) + Send + Sync + 'static,
    ) -> Subscription
    where
        D: ShallowEq + Clone + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return Subscription::inert();
        }

        let comparator = options.comparator.unwrap_or_else(shallow::<D>);
        let callback: Arc<dyn Fn(&D) + Send + Sync> = Arc::new(callback);
        let current = self.with(&selector);
        let last = Mutex::new(current.clone());

        let record = {
            let callback = Arc::clone(&callback);
            move |state: &T| {
                let next = selector(state);
                let changed = {
                    let mut last = last.lock();
                    let changed = !comparator(&last, &next);
                    *last = next.clone();
                    changed
                };
                if changed {
                    callback(&next);
                }
            }
        };
        let subscription = self.register(Arc::new(record));

        if !options.skip_first {
            callback(&current);
        }
        if let Some(hook) = &self.inner.hooks.on_subscribed {
            hook(self);
        }
        subscription
    }

    /// Register a raw subscriber without the immediate first call and without
    /// firing the subscription hook. Used by derivations.
    pub(crate) fn register(&self, callback: WatchCallback<T>) -> Subscription {
        let id = ids::next_id();
        self.inner.subscribers.lock().insert(id, callback);

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.lock().remove(&id);
            }
        })
    }

    /// Bound action map, if an actions configuration was supplied at
    /// construction.
    pub fn actions(&self) -> Option<Actions<T, M>> {
        self.inner
            .actions
            .as_ref()
            .map(|_| Actions::new(self.clone()))
    }

    pub(super) fn actions_config(&self) -> Option<&ActionsConfig<T, M>> {
        self.inner.actions.as_ref()
    }

    /// Number of currently registered subscribers, including derivation
    /// links. Diagnostic only.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Tear the store down: remove every subscriber and mark the store
    /// inert. Afterwards `set`, `set_metadata`, and `subscribe` are silent
    /// no-ops; reads keep returning the last committed values.
    pub fn dispose(&self) {
        *self.inner.phase.lock() = Phase::Disposed;
        self.inner.subscribers.lock().clear();
        trace!(store = %self.inner.name, "store disposed");
    }

    pub fn is_disposed(&self) -> bool {
        matches!(*self.inner.phase.lock(), Phase::Disposed)
    }
}

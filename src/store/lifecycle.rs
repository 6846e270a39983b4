use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::persist::{PersistOptions, PersistenceBridge};
use crate::runtime::ids;
use crate::store::actions::ActionsConfig;
use crate::store::store::{Store, StoreInner};

/// Store lifecycle phase. `Initializing` covers construction and the
/// synchronous `on_init` run; `Disposed` is terminal.
pub(super) enum Phase {
    Initializing,
    Ready,
    Disposed,
}

/// Lifecycle callbacks held by the store after construction.
pub(super) struct Hooks<T, M> {
    pub(super) on_subscribed: Option<Arc<dyn Fn(&Store<T, M>) + Send + Sync>>,
    pub(super) on_state_changed: Option<Arc<dyn Fn(&Store<T, M>, &T, &T) + Send + Sync>>,
    pub(super) prevent_state_change: Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>>,
}

enum Initial<V> {
    Value(V),
    Producer(Box<dyn FnOnce() -> V + Send>),
}

impl<V> Initial<V> {
    // Invoked exactly once, during build.
    fn produce(self) -> V {
        match self {
            Initial::Value(value) => value,
            Initial::Producer(f) => f(),
        }
    }
}

type InitHook<T, M> = Box<dyn FnOnce(&Store<T, M>) + Send>;
type ChangeHook<T, M> = Arc<dyn Fn(&Store<T, M>, &T, &T) + Send + Sync>;

/// Configuration surface for a store.
///
/// Construction runs in a fixed order: the state and metadata initializers
/// are invoked exactly once, persistence (if configured) restores from its
/// backing store, then `on_init` runs synchronously with full access to the
/// store. Any `set` or action call made inside `on_init` is fully effective
/// before the store is handed out and before the first subscriber attaches.
///
/// # Examples
///
/// ```
/// use canister::Store;
///
/// let store = Store::builder(0i32)
///     .name("counter")
///     .prevent_state_change(|candidate, _current| *candidate < 0)
///     .on_init(|store| store.set(10))
///     .build();
///
/// assert_eq!(store.get(), 10);
/// store.set(-5); // vetoed
/// assert_eq!(store.get(), 10);
/// ```
pub struct StoreBuilder<T, M = ()> {
    name: Option<String>,
    initial: Initial<T>,
    metadata: Initial<M>,
    on_init: Option<InitHook<T, M>>,
    on_subscribed: Option<Arc<dyn Fn(&Store<T, M>) + Send + Sync>>,
    on_state_changed: Option<ChangeHook<T, M>>,
    prevent_state_change: Option<Arc<dyn Fn(&T, &T) -> bool + Send + Sync>>,
    actions: Option<ActionsConfig<T, M>>,
}

impl<T, M> StoreBuilder<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self
    where
        M: Default,
    {
        Self::with_initial(Initial::Value(initial), Initial::Producer(Box::new(M::default)))
    }

    /// Defer the initial state to a producer invoked exactly once at build.
    pub fn from_producer(producer: impl FnOnce() -> T + Send + 'static) -> Self
    where
        M: Default,
    {
        Self::with_initial(
            Initial::Producer(Box::new(producer)),
            Initial::Producer(Box::new(M::default)),
        )
    }

    /// Builder with explicit initial metadata. This is the entry point for
    /// metadata types without a `Default` impl.
    pub fn with_metadata(initial: T, metadata: M) -> Self {
        Self::with_initial(Initial::Value(initial), Initial::Value(metadata))
    }

    fn with_initial(initial: Initial<T>, metadata: Initial<M>) -> Self {
        Self {
            name: None,
            initial,
            metadata,
            on_init: None,
            on_subscribed: None,
            on_state_changed: None,
            prevent_state_change: None,
            actions: None,
        }
    }

    /// Diagnostic name, used in log fields and persistence errors.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn metadata(mut self, metadata: M) -> Self {
        self.metadata = Initial::Value(metadata);
        self
    }

    /// Defer the initial metadata to a producer invoked exactly once at build.
    pub fn metadata_with(mut self, producer: impl FnOnce() -> M + Send + 'static) -> Self {
        self.metadata = Initial::Producer(Box::new(producer));
        self
    }

    /// Run once, synchronously, at the end of construction.
    pub fn on_init(mut self, hook: impl FnOnce(&Store<T, M>) + Send + 'static) -> Self {
        self.on_init = Some(Box::new(hook));
        self
    }

    /// Run after each subscriber registers and receives its immediate call.
    pub fn on_subscribed(mut self, hook: impl Fn(&Store<T, M>) + Send + Sync + 'static) -> Self {
        self.on_subscribed = Some(Arc::new(hook));
        self
    }

    /// Run after each committed transition, once subscribers were notified.
    /// Receives the new and the previous state.
    pub fn on_state_changed(
        mut self,
        hook: impl Fn(&Store<T, M>, &T, &T) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_changed = Some(Arc::new(hook));
        self
    }

    /// Veto hook. Receives the candidate and the current state before any
    /// commit; returning `true` cancels the transition entirely.
    pub fn prevent_state_change(
        mut self,
        hook: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.prevent_state_change = Some(Arc::new(hook));
        self
    }

    /// Attach an action map. The configuration is fixed at construction;
    /// executors are validated lazily at call time.
    pub fn actions(mut self, config: ActionsConfig<T, M>) -> Self {
        self.actions = Some(config);
        self
    }

    /// Wire the persistence bridge through the lifecycle hooks: restore on
    /// init (seeding the backing store when empty), re-encode and write on
    /// every committed change. Persistence failures are routed to the
    /// configured error sink and never escape the hooks.
    pub fn persist(mut self, options: PersistOptions<T>) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        let bridge = Arc::new(PersistenceBridge::new(options));

        let restore_bridge = Arc::clone(&bridge);
        let previous_init = self.on_init.take();
        self.on_init = Some(Box::new(move |store: &Store<T, M>| {
            restore_bridge.restore(store);
            if let Some(previous) = previous_init {
                previous(store);
            }
        }));

        let previous_changed = self.on_state_changed.take();
        self.on_state_changed = Some(Arc::new(move |store: &Store<T, M>, next: &T, prior: &T| {
            // Re-read rather than trust `next`: a subscriber may have
            // re-entered `set` during notification, and the backing store
            // must end on the live value.
            bridge.save(store.name(), &store.get());
            if let Some(previous) = &previous_changed {
                previous(store, next, prior);
            }
        }));

        self
    }

    pub fn build(self) -> Store<T, M> {
        let name = self
            .name
            .unwrap_or_else(|| ids::anonymous_label("store"));
        let state = self.initial.produce();
        let metadata = self.metadata.produce();

        let inner = Arc::new(StoreInner {
            name,
            state: RwLock::new(state),
            metadata: RwLock::new(metadata),
            subscribers: Mutex::new(BTreeMap::new()),
            phase: Mutex::new(Phase::Initializing),
            hooks: Hooks {
                on_subscribed: self.on_subscribed,
                on_state_changed: self.on_state_changed,
                prevent_state_change: self.prevent_state_change,
            },
            actions: self.actions,
        });

        let store = Store::from_inner(inner);
        if let Some(init) = self.on_init {
            init(&store);
        }
        store.mark_ready();
        store
    }
}

impl<T, M> Store<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    pub(super) fn mark_ready(&self) {
        let mut phase = self.inner.phase.lock();
        if matches!(*phase, Phase::Initializing) {
            *phase = Phase::Ready;
        }
    }
}

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use crate::derive::Observable;
use crate::equality::{shallow, Comparator, ShallowEq};
use crate::runtime::ids;
use crate::store::{Store, SubscribeOptions, Subscription, WatchCallback};

/// Options for [`derive_with`](crate::ObservableExt::derive_with).
pub struct DeriveOptions<S, T> {
    /// Governs whether a changed projection notifies downstream subscribers.
    /// Defaults to shallow equality.
    pub is_equal: Option<Comparator<T>>,
    /// Optional short-circuit on the parent's raw value: when it reports
    /// equality, the projector is not even invoked.
    pub is_equal_root: Option<Comparator<S>>,
    /// Diagnostic name; never affects behavior.
    pub name: Option<String>,
}

impl<S, T> Default for DeriveOptions<S, T> {
    fn default() -> Self {
        Self {
            is_equal: None,
            is_equal_root: None,
            name: None,
        }
    }
}

impl<S, T> DeriveOptions<S, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_equal(mut self, cmp: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        self.is_equal = Some(Arc::new(cmp));
        self
    }

    pub fn is_equal_root(mut self, cmp: impl Fn(&S, &S) -> bool + Send + Sync + 'static) -> Self {
        self.is_equal_root = Some(Arc::new(cmp));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A read-only view derived from a parent observable through a pure
/// projection.
///
/// `get` always computes from the live parent, even with zero subscribers.
/// The upstream link is lazy: the derivation attaches to its parent when its
/// first subscriber arrives and detaches again when the last one leaves, so
/// an unused derivation never grows its parent's subscriber list.
///
/// # Examples
///
/// ```
/// use canister::{ObservableExt, Store};
///
/// #[derive(Clone)]
/// struct State { a: i32, b: i32 }
///
/// let store = Store::new(State { a: 1, b: 1 });
/// let a = store.derive(|state| state.a);
///
/// let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
/// let seen_clone = std::sync::Arc::clone(&seen);
/// let _sub = a.subscribe(move |value| seen_clone.lock().unwrap().push(*value));
///
/// store.set(State { a: 1, b: 2 }); // projection unchanged, no callback
/// store.set(State { a: 9, b: 2 });
/// assert_eq!(*seen.lock().unwrap(), vec![1, 9]);
/// ```
pub struct Derived<S, T> {
    inner: Arc<DerivedInner<S, T>>,
}

impl<S, T> Clone for Derived<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ParentLink<S> {
    read: Box<dyn Fn() -> S + Send + Sync>,
    watch: Box<dyn Fn(WatchCallback<S>) -> Subscription + Send + Sync>,
}

struct Cache<S, T> {
    raw: S,
    derived: T,
}

struct DerivedInner<S, T> {
    name: String,
    parent: ParentLink<S>,
    projector: Box<dyn Fn(&S) -> T + Send + Sync>,
    is_equal: Comparator<T>,
    is_equal_root: Option<Comparator<S>>,
    cache: Mutex<Cache<S, T>>,
    subscribers: Mutex<BTreeMap<u64, WatchCallback<T>>>,
    upstream: Mutex<Option<Subscription>>,
}

impl<S, T> Derived<S, T>
where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        parent: impl Observable<S>,
        projector: impl Fn(&S) -> T + Send + Sync + 'static,
        options: DeriveOptions<S, T>,
    ) -> Self
    where
        T: ShallowEq,
    {
        let raw = parent.get();
        let read: Box<dyn Fn() -> S + Send + Sync> = {
            let parent = parent.clone();
            Box::new(move || parent.get())
        };
        let watch: Box<dyn Fn(WatchCallback<S>) -> Subscription + Send + Sync> =
            Box::new(move |callback| parent.watch(callback));

        let derived = projector(&raw);

        Self {
            inner: Arc::new(DerivedInner {
                name: options
                    .name
                    .unwrap_or_else(|| ids::anonymous_label("derived")),
                parent: ParentLink { read, watch },
                projector: Box::new(projector),
                is_equal: options.is_equal.unwrap_or_else(shallow::<T>),
                is_equal_root: options.is_equal_root,
                cache: Mutex::new(Cache { raw, derived }),
                subscribers: Mutex::new(BTreeMap::new()),
                upstream: Mutex::new(None),
            }),
        }
    }

    /// Diagnostic name of this derivation.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current projected value, computed from the live parent.
    pub fn get(&self) -> T {
        let raw = (self.inner.parent.read)();
        (self.inner.projector)(&raw)
    }

    /// Subscribe to projection changes. The callback is invoked immediately
    /// with the current projected value.
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
        let callback: WatchCallback<T> = Arc::new(callback);
        let subscription = self.register(Arc::clone(&callback));
        if !options.skip_first {
            let current = self.get();
            callback(&current);
        }
        subscription
    }

    /// Number of direct subscribers. Diagnostic only.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    fn register(&self, callback: WatchCallback<T>) -> Subscription {
        let id = ids::next_id();
        let first = {
            let mut subscribers = self.inner.subscribers.lock();
            let first = subscribers.is_empty();
            subscribers.insert(id, callback);
            first
        };
        if first {
            self.attach_upstream();
        }

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let now_empty = {
                    let mut subscribers = inner.subscribers.lock();
                    subscribers.remove(&id);
                    subscribers.is_empty()
                };
                if now_empty {
                    // Last subscriber left: detach from the parent so the
                    // chain does not accumulate orphaned listeners.
                    let upstream = inner.upstream.lock().take();
                    drop(upstream);
                }
            }
        })
    }

    fn attach_upstream(&self) {
        // Refresh the baseline so the first parent notification compares
        // against values current at attach time, not at construction.
        {
            let raw = (self.inner.parent.read)();
            let derived = (self.inner.projector)(&raw);
            *self.inner.cache.lock() = Cache { raw, derived };
        }

        let weak = Arc::downgrade(&self.inner);
        let subscription = (self.inner.parent.watch)(Arc::new(move |raw: &S| {
            if let Some(inner) = weak.upgrade() {
                DerivedInner::on_parent_change(&inner, raw);
            }
        }));
        *self.inner.upstream.lock() = Some(subscription);
    }
}

impl<S, T> DerivedInner<S, T>
where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    // The comparators and the projector are user code; the cache lock is
    // released before each of them runs and re-taken only to swap values.
    fn on_parent_change(inner: &Arc<Self>, raw: &S) {
        if let Some(root_equal) = &inner.is_equal_root {
            let previous_raw = inner.cache.lock().raw.clone();
            if root_equal(&previous_raw, raw) {
                trace!(derived = %inner.name, "raw value unchanged, projection skipped");
                return;
            }
        }

        let next = (inner.projector)(raw);
        let previous = inner.cache.lock().derived.clone();
        let changed = !(inner.is_equal)(&previous, &next);

        // The baseline advances whether or not downstream is notified.
        {
            let mut cache = inner.cache.lock();
            cache.raw = raw.clone();
            cache.derived = next.clone();
        }
        if !changed {
            return;
        }

        let snapshot: Vec<WatchCallback<T>> = inner.subscribers.lock().values().cloned().collect();
        for callback in snapshot {
            callback(&next);
        }
    }
}

impl<T, M> Observable<T> for Store<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    fn get(&self) -> T {
        Store::get(self)
    }

    fn watch(&self, callback: WatchCallback<T>) -> Subscription {
        if self.is_disposed() {
            return Subscription::inert();
        }
        self.register(callback)
    }
}

impl<S, T> Observable<T> for Derived<S, T>
where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Derived::get(self)
    }

    fn watch(&self, callback: WatchCallback<T>) -> Subscription {
        self.register(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::ObservableExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Pair {
        a: i32,
        b: i32,
    }

    #[test]
    fn get_computes_from_live_parent_without_subscribers() {
        let store = Store::new(Pair { a: 1, b: 2 });
        let a = store.derive(|state| state.a);

        assert_eq!(a.get(), 1);
        store.set(Pair { a: 7, b: 2 });
        assert_eq!(a.get(), 7);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn notification_fires_only_when_projection_changes() {
        let store = Store::new(Pair { a: 1, b: 1 });
        let a = store.derive(|state| state.a);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = a.subscribe_with(SubscribeOptions::new().skip_first(true), move |value| {
            seen_clone.lock().push(*value);
        });

        store.set(Pair { a: 1, b: 2 });
        store.set(Pair { a: 3, b: 2 });
        store.set(Pair { a: 3, b: 9 });
        assert_eq!(*seen.lock(), vec![3]);
    }

    #[test]
    fn is_equal_root_skips_projection_entirely() {
        let projections = Arc::new(AtomicUsize::new(0));
        let projections_clone = Arc::clone(&projections);

        let store = Store::new(Pair { a: 1, b: 1 });
        let a = store.derive_with(
            move |state: &Pair| {
                projections_clone.fetch_add(1, Ordering::SeqCst);
                state.a
            },
            DeriveOptions::new().is_equal_root(|prev: &Pair, next: &Pair| prev.a == next.a),
        );

        let _sub = a.subscribe_with(SubscribeOptions::new().skip_first(true), |_| {});
        let baseline = projections.load(Ordering::SeqCst);

        store.set(Pair { a: 1, b: 5 });
        assert_eq!(projections.load(Ordering::SeqCst), baseline);

        store.set(Pair { a: 2, b: 5 });
        assert_eq!(projections.load(Ordering::SeqCst), baseline + 1);
    }

    #[test]
    fn chains_propagate_one_hop_per_change() {
        let store = Store::new(2i32);
        let doubled = store.derive(|n| n * 2);
        let quadrupled = doubled.derive(|n| n * 2);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = quadrupled.subscribe(move |value| {
            seen_clone.lock().push(*value);
        });

        assert_eq!(*seen.lock(), vec![8]);
        store.set(5);
        assert_eq!(*seen.lock(), vec![8, 20]);
        assert_eq!(quadrupled.get(), 20);
    }

    #[test]
    fn upstream_attaches_lazily_and_detaches_eagerly() {
        let store = Store::new(1i32);
        let derived = store.derive(|n| n + 1);
        assert_eq!(store.subscriber_count(), 0);

        let first = derived.subscribe(|_| {});
        let second = derived.subscribe(|_| {});
        assert_eq!(store.subscriber_count(), 1);

        first.unsubscribe();
        assert_eq!(store.subscriber_count(), 1);

        second.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);

        // A new subscriber re-attaches with a fresh baseline.
        store.set(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _third = derived.subscribe(move |value| {
            seen_clone.lock().push(*value);
        });
        assert_eq!(*seen.lock(), vec![11]);
        store.set(20);
        assert_eq!(*seen.lock(), vec![11, 21]);
    }

    #[test]
    fn comparator_may_unsubscribe_and_resubscribe_the_derivation() {
        // Dropping the last subscriber and registering a fresh one from
        // inside the comparator re-attaches upstream mid-propagation; that
        // path must not block on the derivation's own cache.
        type Slot = Arc<Mutex<Option<(Derived<i32, i32>, Subscription)>>>;
        let slot: Slot = Arc::new(Mutex::new(None));

        let slot_clone = Arc::clone(&slot);
        let store = Store::new(1i32);
        let derived = store.derive_with(
            |n: &i32| *n,
            DeriveOptions::new().is_equal(move |_: &i32, _: &i32| {
                let taken = slot_clone.lock().take();
                if let Some((derivation, old)) = taken {
                    old.unsubscribe();
                    let fresh = derivation
                        .subscribe_with(SubscribeOptions::new().skip_first(true), |_| {});
                    *slot_clone.lock() = Some((derivation, fresh));
                }
                false
            }),
        );

        let sub = derived.subscribe_with(SubscribeOptions::new().skip_first(true), |_| {});
        *slot.lock() = Some((derived.clone(), sub));

        store.set(2);
        assert_eq!(derived.get(), 2);
        assert_eq!(derived.subscriber_count(), 1);
    }

    #[test]
    fn custom_is_equal_governs_downstream_notification() {
        let store = Store::new(10i32);
        // Buckets of ten: only a bucket change counts.
        let bucket = store.derive_with(
            |n: &i32| *n,
            DeriveOptions::new().is_equal(|a: &i32, b: &i32| a / 10 == b / 10),
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let _sub = bucket.subscribe_with(SubscribeOptions::new().skip_first(true), move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.set(15);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        store.set(25);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

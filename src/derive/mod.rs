//! Derived read-only views over stores.
//!
//! A [`Derived`] wraps any [`Observable`] parent with a pure projection and
//! is itself observable, so derivations chain to unbounded depth. Each hop
//! recomputes relative to its immediate parent only, keeping the cost of a
//! change proportional to the depth of the chain.

mod derived;

pub use derived::{DeriveOptions, Derived};

use crate::equality::ShallowEq;
use crate::store::{Subscription, WatchCallback};

/// A readable, watchable source of values.
///
/// Implemented by [`Store`](crate::Store) and [`Derived`]; this is the seam
/// derivations attach to, and the surface a host UI binding consumes
/// (subscribe on mount, unsubscribe on unmount, re-read on notify).
pub trait Observable<T>: Clone + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    /// Current value, computed on demand.
    fn get(&self) -> T;

    /// Raw change feed: registers a callback with no immediate first call.
    fn watch(&self, callback: WatchCallback<T>) -> Subscription;
}

/// Chaining adapters available on every [`Observable`].
pub trait ObservableExt<T>: Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Derive a view with the default shallow change comparator.
    fn derive<U>(&self, projector: impl Fn(&T) -> U + Send + Sync + 'static) -> Derived<T, U>
    where
        U: ShallowEq + Clone + Send + Sync + 'static,
    {
        Derived::new(self.clone(), projector, DeriveOptions::default())
    }

    /// Derive a view with explicit comparators and/or a diagnostic name.
    fn derive_with<U>(
        &self,
        projector: impl Fn(&T) -> U + Send + Sync + 'static,
        options: DeriveOptions<T, U>,
    ) -> Derived<T, U>
    where
        U: ShallowEq + Clone + Send + Sync + 'static,
    {
        Derived::new(self.clone(), projector, options)
    }
}

impl<T, O> ObservableExt<T> for O
where
    T: Clone + Send + Sync + 'static,
    O: Observable<T>,
{
}

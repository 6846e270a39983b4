//! # Canister
//!
//! Shareable, subscribable state stores for Rust.
//!
//! Canister provides a small store engine and the layers applications
//! usually build around one:
//!
//! ## Stores (the core)
//!
//! - `Store<T, M>` - a state container with synchronous, insertion-ordered
//!   subscriber notification, a metadata side channel, and lifecycle hooks
//!   (init, change, subscription, and a veto hook that can cancel a pending
//!   transition)
//! - Selector subscriptions that fire only when the projected value changes
//!
//! ## Derived views
//!
//! - `Derived<S, T>` - read-only views chained from a store (or another
//!   derivation) through a pure projection, with two-tier change detection:
//!   an optional raw-value short-circuit and a projected-value comparator
//!
//! ## Actions
//!
//! - `ActionsConfig` / `Actions` - a named map of action factories bound to
//!   a store's accessors, with a self-referential tool bundle so actions can
//!   call siblings (and themselves) against live state
//!
//! ## Scoping and persistence
//!
//! - `Provider` - one store instance per entered scope, looked up through a
//!   thread-scoped stack
//! - `PersistOptions` / `StorageBackend` - versioned envelope persistence
//!   with migration, validation, and an error funnel, wired in through the
//!   lifecycle hooks

pub mod derive;
pub mod equality;
pub mod error;
pub mod persist;
pub mod runtime;
pub mod store;

// Re-export main types for convenience
pub use derive::{DeriveOptions, Derived, Observable, ObservableExt};
pub use equality::{by_partial_eq, shallow, Comparator, ShallowEq};
pub use error::{PersistError, StoreError};
pub use persist::{
    Envelope, FileBackend, MemoryBackend, PersistOptions, StorageBackend, DEFAULT_VERSION,
};
pub use runtime::Provider;
pub use store::{
    executor, ActionTools, Actions, ActionsConfig, FactoryOutput, SelectorOptions, Store,
    StoreBuilder, SubscribeOptions, Subscription,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        let store = Store::new(0i32);
        assert_eq!(store.get(), 0);
        store.set(42);
        assert_eq!(store.get(), 42);
    }
}

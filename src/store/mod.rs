//! State containers: subscriptions, lifecycle, and actions.
//!
//! Stores hold a state value and an ordered set of subscribers, with a
//! lifecycle hook surface (init, change, subscription, veto), an optional
//! bound action map, and selector subscriptions that notify only when a
//! projected value actually changes.

mod actions;
mod lifecycle;
mod store;
mod subscription;

pub use actions::{executor, ActionTools, Actions, ActionsConfig, Executor, FactoryOutput};
pub use lifecycle::StoreBuilder;
pub use store::{SelectorOptions, Store, SubscribeOptions};
pub use subscription::{Subscription, WatchCallback};

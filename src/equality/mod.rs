//! Structural single-level equality.
//!
//! Selector subscriptions and derived values decide whether to notify by
//! comparing old and new projections. The default comparison is shallow:
//! one level of structure, with a reference-identity fast path for `Arc`.

mod shallow;

pub use shallow::{by_partial_eq, shallow, Comparator, ShallowEq};

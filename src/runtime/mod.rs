//! Process-wide identity and scoped store lookup.
//!
//! This module provides the infrastructure shared by every store in the
//! process: a monotonic id source ([`ids`]) and thread-scoped store
//! providers ([`Provider`]).

pub mod ids;
mod scope;

pub use scope::Provider;

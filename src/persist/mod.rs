//! Persisted storage for stores.
//!
//! The bridge touches the store only through the lifecycle hooks: on init it
//! restores (or seeds) the persisted envelope, on every committed change it
//! re-encodes and writes. Versioned envelopes support migration; every
//! failure is funneled to one error sink and the store keeps operating on
//! its in-memory state.

mod backend;
mod bridge;
mod envelope;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use bridge::{PersistOptions, PersistenceBridge};
pub use envelope::{Envelope, DEFAULT_VERSION};

//! Process-wide unique ids.
//!
//! Ids are drawn from a single monotonic counter that lives for the whole
//! process and is never reset. Subscriber ordering relies on this: records
//! are kept in an ordered map keyed by id, so id order is subscription order.
//! A once-initialized random nonce distinguishes this process in diagnostic
//! names (store and provider labels), not in ordering.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Next monotonic id. Strictly increasing within the process.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Random nonce fixed at first use for the lifetime of the process.
pub fn process_nonce() -> u64 {
    static NONCE: OnceLock<u64> = OnceLock::new();
    *NONCE.get_or_init(|| rand::thread_rng().gen())
}

/// Diagnostic label combining the process nonce and a fresh id, used as the
/// default name for anonymous stores and providers.
pub(crate) fn anonymous_label(kind: &str) -> String {
    format!("{kind}-{:04x}-{}", process_nonce() as u16, next_id())
}

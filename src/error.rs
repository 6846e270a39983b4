use thiserror::Error;

/// Errors surfaced synchronously to callers of the store API.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named action does not exist in the store's bound action map.
    #[error("unknown action `{name}`")]
    UnknownAction { name: String },

    /// The action's factory produced a plain value instead of an executor.
    ///
    /// Detected at call time, never at registration time, so factories that
    /// only make sense once arguments are known stay legal to register.
    #[error("action `{name}` did not produce an executor")]
    ActionNotCallable { name: String },

    /// A scoped store was looked up outside any active provider scope.
    #[error("no active scope for provider `{provider}` on this thread")]
    NoActiveScope { provider: String },
}

/// Errors raised by the persistence bridge.
///
/// These are never thrown into application code; they are routed to the
/// configured error sink and the store keeps operating on its in-memory state.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read key `{key}`: {message}")]
    Read { key: String, message: String },

    #[error("failed to write key `{key}`: {message}")]
    Write { key: String, message: String },

    #[error("failed to encode or decode key `{key}`")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("migration failed for key `{key}`: {message}")]
    Migrate { key: String, message: String },

    #[error("validation rejected restored state for key `{key}`: {message}")]
    Validate { key: String, message: String },
}

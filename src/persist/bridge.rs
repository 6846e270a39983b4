use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PersistError;
use crate::persist::backend::StorageBackend;
use crate::persist::envelope::{Envelope, DEFAULT_VERSION};
use crate::store::Store;

/// Rewrites a legacy payload (decoded, but with an unknown shape) into the
/// current state type. Receives the raw legacy value and the initial state.
pub type Migrator<T> = Arc<dyn Fn(Value, &T) -> Result<T, String> + Send + Sync>;

/// Inspects a restored value before it is applied. `Ok(None)` accepts the
/// restored value as-is, `Ok(Some(v))` substitutes `v`, and `Err` rejects
/// the restore entirely (the store keeps its initial state).
pub type Validator<T> = Arc<dyn Fn(&T, &T) -> Result<Option<T>, String> + Send + Sync>;

type ErrorSink = Arc<dyn Fn(&PersistError) + Send + Sync>;

/// Configuration for persisting one store.
pub struct PersistOptions<T> {
    key: String,
    version: i64,
    backend: Arc<dyn StorageBackend>,
    migrate: Option<Migrator<T>>,
    validate: Option<Validator<T>>,
    on_error: Option<ErrorSink>,
}

impl<T> PersistOptions<T> {
    pub fn new(key: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            key: key.into(),
            version: DEFAULT_VERSION,
            backend,
            migrate: None,
            validate: None,
            on_error: None,
        }
    }

    /// Version tag written with every envelope. Envelopes read back with a
    /// different tag go through the migrator.
    pub fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn migrate(
        mut self,
        migrator: impl Fn(Value, &T) -> Result<T, String> + Send + Sync + 'static,
    ) -> Self {
        self.migrate = Some(Arc::new(migrator));
        self
    }

    pub fn validate(
        mut self,
        validator: impl Fn(&T, &T) -> Result<Option<T>, String> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(validator));
        self
    }

    /// Error sink for every read/write/codec/migration/validation failure.
    /// Defaults to a `tracing` warning naming the store and key.
    pub fn on_error(mut self, sink: impl Fn(&PersistError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(sink));
        self
    }
}

/// The lifecycle-facing half of persistence. Installed by
/// [`StoreBuilder::persist`](crate::StoreBuilder::persist); restores on init
/// and saves on every committed change.
pub struct PersistenceBridge<T> {
    options: PersistOptions<T>,
}

impl<T> PersistenceBridge<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(options: PersistOptions<T>) -> Self {
        Self { options }
    }

    fn report(&self, store: &str, error: PersistError) {
        match &self.options.on_error {
            Some(sink) => sink(&error),
            None => {
                warn!(store, key = %self.options.key, error = %error, "persistence failure")
            }
        }
    }

    /// Restore persisted state into `store`, seeding the backing store with
    /// the initial state when the key is absent. Any failure leaves the
    /// store on its in-memory state.
    pub(crate) fn restore<M>(&self, store: &Store<T, M>)
    where
        M: Send + Sync + 'static,
    {
        let initial = store.get();

        let raw = match self.options.backend.read(&self.options.key) {
            Ok(raw) => raw,
            Err(e) => {
                self.report(store.name(), e);
                return;
            }
        };

        let Some(raw) = raw else {
            // First run for this key: persist the seed envelope.
            self.save(store.name(), &initial);
            return;
        };

        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.report(
                    store.name(),
                    PersistError::Codec {
                        key: self.options.key.clone(),
                        source: e,
                    },
                );
                return;
            }
        };

        let restored = if envelope.version() == self.options.version {
            match serde_json::from_value::<T>(envelope.s) {
                Ok(value) => value,
                Err(e) => {
                    self.report(
                        store.name(),
                        PersistError::Codec {
                            key: self.options.key.clone(),
                            source: e,
                        },
                    );
                    return;
                }
            }
        } else if let Some(migrate) = &self.options.migrate {
            debug!(
                store = store.name(),
                key = %self.options.key,
                stored = envelope.version(),
                current = self.options.version,
                "migrating persisted state"
            );
            match migrate(envelope.s, &initial) {
                Ok(value) => value,
                Err(message) => {
                    self.report(
                        store.name(),
                        PersistError::Migrate {
                            key: self.options.key.clone(),
                            message,
                        },
                    );
                    return;
                }
            }
        } else {
            self.report(
                store.name(),
                PersistError::Migrate {
                    key: self.options.key.clone(),
                    message: format!(
                        "stored version {} differs from current {} and no migrator is configured",
                        envelope.version(),
                        self.options.version
                    ),
                },
            );
            return;
        };

        let restored = if let Some(validate) = &self.options.validate {
            match validate(&restored, &initial) {
                Ok(None) => restored,
                Ok(Some(replacement)) => replacement,
                Err(message) => {
                    self.report(
                        store.name(),
                        PersistError::Validate {
                            key: self.options.key.clone(),
                            message,
                        },
                    );
                    return;
                }
            }
        } else {
            restored
        };

        store.set(restored);
    }

    /// Encode the state and write it with the current version tag.
    pub(crate) fn save(&self, store_name: &str, state: &T) {
        let envelope = match Envelope::new(state, self.options.version) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.report(
                    store_name,
                    PersistError::Codec {
                        key: self.options.key.clone(),
                        source: e,
                    },
                );
                return;
            }
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                self.report(
                    store_name,
                    PersistError::Codec {
                        key: self.options.key.clone(),
                        source: e,
                    },
                );
                return;
            }
        };
        if let Err(e) = self.options.backend.write(&self.options.key, &payload) {
            self.report(store_name, e);
        }
    }
}

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StoreError;
use crate::store::store::Store;
use crate::store::subscription::Subscription;

/// What an action factory produces once its arguments are known.
///
/// The `Value` arm is the "non-callable" case: a factory that hands back a
/// plain value instead of an executor. Registering such a factory is legal;
/// dispatch rejects it at call time with an error naming the action.
pub enum FactoryOutput<T, M = ()> {
    Executor(Executor<T, M>),
    Value(Value),
}

/// The runnable half of an action: receives the tool bundle, returns the
/// action's result, which dispatch passes through unmodified.
pub type Executor<T, M> = Box<dyn FnOnce(ActionTools<T, M>) -> Value + Send>;

/// Wrap a closure as an action executor.
pub fn executor<T, M>(
    run: impl FnOnce(ActionTools<T, M>) -> Value + Send + 'static,
) -> FactoryOutput<T, M> {
    FactoryOutput::Executor(Box::new(run))
}

type Factory<T, M> = Arc<dyn Fn(&[Value]) -> FactoryOutput<T, M> + Send + Sync>;

/// A reusable map of named action factories.
///
/// The configuration is independent of any store: attach one config to
/// several stores and each binding is isolated, sharing no mutable closure
/// state. The set of names is fixed once the config is attached.
///
/// # Examples
///
/// ```
/// use canister::{executor, ActionsConfig, Store};
/// use serde_json::{json, Value};
///
/// let config = ActionsConfig::new().action("increase", |args: &[Value]| {
///     let n = args.first().and_then(Value::as_i64).unwrap_or(1);
///     executor(move |tools| {
///         tools.update(|state: &i64| state + n);
///         json!(tools.get())
///     })
/// });
///
/// let store = Store::builder(0i64).actions(config).build();
/// let actions = store.actions().unwrap();
///
/// actions.call("increase", &[]).unwrap();
/// actions.call("increase", &[json!(2)]).unwrap();
/// assert_eq!(store.get(), 3);
/// ```
pub struct ActionsConfig<T, M = ()> {
    factories: HashMap<String, Factory<T, M>>,
}

impl<T, M> Clone for ActionsConfig<T, M> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
        }
    }
}

impl<T, M> Default for ActionsConfig<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, M> ActionsConfig<T, M> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a named action factory.
    pub fn action(
        mut self,
        name: impl Into<String>,
        factory: impl Fn(&[Value]) -> FactoryOutput<T, M> + Send + Sync + 'static,
    ) -> Self {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub(super) fn factory(&self, name: &str) -> Option<Factory<T, M>> {
        self.factories.get(name).cloned()
    }
}

/// The bound action map of one store.
///
/// Cloning is cheap; every clone dispatches against the same store and the
/// same fixed set of factories, which is what makes self- and sibling-calls
/// from inside an executor see live state.
pub struct Actions<T, M = ()> {
    store: Store<T, M>,
}

impl<T, M> Clone for Actions<T, M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T, M> Actions<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    pub(super) fn new(store: Store<T, M>) -> Self {
        Self { store }
    }

    /// Invoke a named action.
    ///
    /// The factory runs first with the raw arguments; its executor then runs
    /// against a fresh tool bundle whose `actions` handle is this same bound
    /// map, so executors can recurse into themselves or into siblings.
    /// Unbounded recursion is not caught and overflows the stack like any
    /// other runaway recursion.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, StoreError> {
        let factory = self
            .store
            .actions_config()
            .and_then(|config| config.factory(name))
            .ok_or_else(|| StoreError::UnknownAction {
                name: name.to_string(),
            })?;

        match factory(args) {
            FactoryOutput::Executor(run) => {
                let tools = ActionTools {
                    store: self.store.clone(),
                    actions: self.clone(),
                };
                Ok(run(tools))
            }
            FactoryOutput::Value(_) => Err(StoreError::ActionNotCallable {
                name: name.to_string(),
            }),
        }
    }
}

/// Tool bundle handed to every action executor.
///
/// Accessors go through the live store, not a snapshot taken at bind time,
/// so an executor always observes mutations made by the actions it called.
pub struct ActionTools<T, M = ()> {
    store: Store<T, M>,
    actions: Actions<T, M>,
}

impl<T, M> ActionTools<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    pub fn get(&self) -> T {
        self.store.get()
    }

    pub fn set(&self, next: T) {
        self.store.set(next);
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.store.update(f);
    }

    pub fn metadata(&self) -> M
    where
        M: Clone,
    {
        self.store.metadata()
    }

    pub fn set_metadata(&self, next: M) {
        self.store.set_metadata(next);
    }

    pub fn update_metadata(&self, f: impl FnOnce(&M) -> M) {
        self.store.update_metadata(f);
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.store.subscribe(callback)
    }

    /// The same bound map this action was dispatched from.
    pub fn actions(&self) -> &Actions<T, M> {
        &self.actions
    }

    pub fn store(&self) -> &Store<T, M> {
        &self.store
    }
}

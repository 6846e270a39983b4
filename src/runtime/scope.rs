use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

use crate::error::StoreError;
use crate::runtime::ids;
use crate::store::Store;

// Thread-local stack of active scopes. Innermost scope wins on lookup.
thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeFrame>> = const { RefCell::new(Vec::new()) };
}

struct ScopeFrame {
    provider: u64,
    store: Box<dyn Any>,
}

/// A scoped store factory.
///
/// A `Provider` creates one fresh store per [`enter`](Provider::enter) call
/// and exposes it to everything running inside that call through
/// [`current`](Provider::current). Scopes nest: entering the same provider
/// again shadows the outer store until the inner scope exits.
///
/// # Examples
///
/// ```
/// use canister::{Provider, Store};
///
/// let provider = Provider::new(|| Store::new(0i32));
///
/// provider.enter(|| {
///     let store = provider.current().unwrap();
///     store.set(5);
///     assert_eq!(provider.current().unwrap().get(), 5);
/// });
///
/// // Outside any scope the lookup fails.
/// assert!(provider.current().is_err());
/// ```
pub struct Provider<T, M = ()> {
    id: u64,
    name: String,
    factory: Arc<dyn Fn() -> Store<T, M> + Send + Sync>,
}

impl<T, M> Clone for Provider<T, M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T, M> Provider<T, M>
where
    T: Clone + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    /// Create a provider with an anonymous diagnostic name.
    pub fn new(factory: impl Fn() -> Store<T, M> + Send + Sync + 'static) -> Self {
        Self::named(ids::anonymous_label("provider"), factory)
    }

    /// Create a provider with an explicit name, used in the out-of-scope error.
    pub fn named(
        name: impl Into<String>,
        factory: impl Fn() -> Store<T, M> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: ids::next_id(),
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` with a fresh store from this provider's factory in scope.
    ///
    /// The factory is invoked exactly once per call. The frame is popped even
    /// if `f` panics; the panic then resumes.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        let store = (self.factory)();
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeFrame {
                provider: self.id,
                store: Box::new(store),
            });
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// Look up the innermost active store for this provider on this thread.
    pub fn current(&self) -> Result<Store<T, M>, StoreError> {
        SCOPE_STACK.with(|stack| {
            let stack = stack.borrow();
            for frame in stack.iter().rev() {
                if frame.provider == self.id {
                    if let Some(store) = frame.store.downcast_ref::<Store<T, M>>() {
                        return Ok(store.clone());
                    }
                }
            }
            Err(StoreError::NoActiveScope {
                provider: self.name.clone(),
            })
        })
    }
}

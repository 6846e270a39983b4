//! Integration tests for Canister

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use serde_json::{json, Value};

use canister::{
    executor, ActionsConfig, ObservableExt, Provider, SelectorOptions, Store, StoreBuilder,
    SubscribeOptions,
};

#[test]
fn two_subscribers_fire_once_per_update() {
    let store = Store::new(1i32);

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let first_clone = Arc::clone(&first);
    let _a = store.subscribe_with(SubscribeOptions::new().skip_first(true), move |_| {
        first_clone.fetch_add(1, Ordering::SeqCst);
    });
    let second_clone = Arc::clone(&second);
    let _b = store.subscribe_with(SubscribeOptions::new().skip_first(true), move |_| {
        second_clone.fetch_add(1, Ordering::SeqCst);
    });

    store.update(|n| n * 2);

    assert_eq!(store.get(), 2);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn counter_actions_with_default_and_explicit_args() {
    let config = ActionsConfig::<i64>::new().action("increase", |args: &[Value]| {
        let n = args.first().and_then(Value::as_i64).unwrap_or(1);
        executor(move |tools| {
            tools.update(|state| state + n);
            json!(tools.get())
        })
    });

    let store = Store::builder(10i64).actions(config).build();
    let actions = store.actions().unwrap();

    actions.call("increase", &[]).unwrap();
    assert_eq!(store.get(), 11);

    actions.call("increase", &[json!(2)]).unwrap();
    assert_eq!(store.get(), 13);
}

#[test]
fn mutually_recursive_actions_trace_call_order() {
    // A and B ping-pong down to zero; every call bumps the counter once.
    let config = ActionsConfig::<i64, Vec<&'static str>>::new()
        .action("a", |args: &[Value]| {
            let depth = args.first().and_then(Value::as_i64).unwrap_or(0);
            executor(move |tools| {
                tools.update_metadata(|trace: &Vec<&'static str>| {
                    let mut trace = trace.clone();
                    trace.push("a");
                    trace
                });
                tools.update(|count| count + 1);
                if depth > 0 {
                    tools.actions().call("b", &[json!(depth - 1)]).unwrap();
                }
                json!(tools.get())
            })
        })
        .action("b", |args: &[Value]| {
            let depth = args.first().and_then(Value::as_i64).unwrap_or(0);
            executor(move |tools| {
                tools.update_metadata(|trace: &Vec<&'static str>| {
                    let mut trace = trace.clone();
                    trace.push("b");
                    trace
                });
                tools.update(|count| count + 1);
                if depth > 0 {
                    tools.actions().call("a", &[json!(depth - 1)]).unwrap();
                }
                json!(tools.get())
            })
        });

    let store: Store<i64, Vec<&'static str>> = StoreBuilder::new(0i64).actions(config).build();
    store.actions().unwrap().call("a", &[json!(3)]).unwrap();

    assert_eq!(store.metadata(), vec!["a", "b", "a", "b"]);
    assert_eq!(store.get(), 4);
}

#[test]
fn selector_subscription_ignores_unrelated_fields() {
    #[derive(Clone)]
    struct State {
        a: i32,
        b: i32,
    }

    let store = Store::new(State { a: 1, b: 1 });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);

    let _sub = store.subscribe_selector_with(
        |state| state.a,
        SelectorOptions::new().skip_first(true),
        move |a| seen_clone.lock().unwrap().push(*a),
    );

    store.set(State { a: 1, b: 2 });
    assert!(seen.lock().unwrap().is_empty());

    store.set(State { a: 4, b: 2 });
    assert_eq!(*seen.lock().unwrap(), vec![4]);
}

#[test]
fn derivation_chain_stays_consistent_through_updates() {
    let store = Store::new(vec![1i32, 2, 3]);
    let sum = store.derive(|items| items.iter().sum::<i32>());
    let doubled_sum = sum.derive(|total| total * 2);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let _sub = doubled_sum.subscribe(move |value| {
        seen_clone.lock().unwrap().push(*value);
    });

    store.update(|items| {
        let mut items = items.clone();
        items.push(4);
        items
    });

    assert_eq!(*seen.lock().unwrap(), vec![12, 20]);
    assert_eq!(doubled_sum.get(), 20);
}

#[test]
fn derivation_comparator_suppresses_equal_collections() {
    // Projections that rebuild a Vec every time still compare equal
    // shallowly, so downstream stays quiet.
    let store = Store::new((vec![1i32, 2], 0i32));
    let items = store.derive(|state: &(Vec<i32>, i32)| state.0.clone());

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let _sub = items.subscribe_with(SubscribeOptions::new().skip_first(true), move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    store.set((vec![1, 2], 5));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.set((vec![1, 2, 3], 5));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn scoped_stores_are_isolated_per_entry() {
    let provider = Provider::named("session", || Store::new(String::from("anonymous")));

    provider.enter(|| {
        let store = provider.current().unwrap();
        store.set("alice".to_string());

        provider.enter(|| {
            let inner = provider.current().unwrap();
            assert_eq!(inner.get(), "anonymous");
            inner.set("bob".to_string());
        });

        assert_eq!(provider.current().unwrap().get(), "alice");
    });

    let err = provider.current().unwrap_err();
    assert!(err.to_string().contains("session"));
}

#[test]
fn veto_and_subscribers_compose() {
    let notifications = Arc::new(AtomicUsize::new(0));
    let notifications_clone = Arc::clone(&notifications);

    let store = Store::builder(0i32)
        .prevent_state_change(|candidate, current| candidate < current)
        .build();
    let _sub = store.subscribe_with(SubscribeOptions::new().skip_first(true), move |_| {
        notifications_clone.fetch_add(1, Ordering::SeqCst);
    });

    store.set(5);
    store.set(3); // vetoed: would decrease
    store.set(8);

    assert_eq!(store.get(), 8);
    assert_eq!(notifications.load(Ordering::SeqCst), 2);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Every committed update notifies a plain subscriber exactly once.
        #[test]
        fn plain_subscriber_fires_once_per_commit(values in proptest::collection::vec(any::<i32>(), 0..50)) {
            let store = Store::new(0i32);
            let calls = Arc::new(AtomicUsize::new(0));
            let calls_clone = Arc::clone(&calls);
            let _sub = store.subscribe_with(SubscribeOptions::new().skip_first(true), move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            });

            for value in &values {
                store.set(*value);
            }

            prop_assert_eq!(calls.load(Ordering::SeqCst), values.len());
            if let Some(last) = values.last() {
                prop_assert_eq!(store.get(), *last);
            }
        }

        // A field selector fires iff the projected field differs from the
        // previous projection.
        #[test]
        fn selector_fires_iff_projection_changed(pairs in proptest::collection::vec((any::<i8>(), any::<i8>()), 0..50)) {
            let store = Store::new((0i8, 0i8));
            let seen = Arc::new(Mutex::new(Vec::new()));
            let seen_clone = Arc::clone(&seen);
            let _sub = store.subscribe_selector_with(
                |state| state.0,
                SelectorOptions::new().skip_first(true),
                move |a| seen_clone.lock().unwrap().push(*a),
            );

            let mut expected = Vec::new();
            let mut previous = 0i8;
            for (a, b) in &pairs {
                store.set((*a, *b));
                if *a != previous {
                    expected.push(*a);
                }
                previous = *a;
            }

            prop_assert_eq!(&*seen.lock().unwrap(), &expected);
        }
    }
}

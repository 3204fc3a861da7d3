//! End-to-end chains over promise/future pairs, driven by detached threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use weft_future::{make_promise, DynError, Futures, Promise, StateError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error")]
struct Broke;

fn fulfill_later<T: Send + 'static, E: Send + 'static>(promise: &Promise<T, E>, value: T) {
    let promise = promise.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let _ = promise.set_result(value);
    });
}

// ============================================================================
// Value chains
// ============================================================================

#[test]
fn chain_through_string_and_back() {
    let promise = make_promise::<i32, DynError>();
    let future = promise
        .future()
        .then(|value| value.to_string())
        .then(|text| text.parse::<i32>().unwrap());

    fulfill_later(&promise, 42);
    assert_eq!(future.wait().unwrap(), 42);
}

#[test]
fn chain_registered_after_settlement_still_runs() {
    let promise = make_promise::<i32, DynError>();
    fulfill_later(&promise, 42);
    thread::sleep(Duration::from_millis(200));

    let value = promise
        .future()
        .then(|v| v + 1)
        .then(|v| v - 1)
        .wait()
        .unwrap();
    assert_eq!(value, 42);
}

#[test]
fn captured_arguments_travel_with_the_continuation() {
    let promise = make_promise::<i32, DynError>();
    let offset = 2;
    let future = promise
        .future()
        .then(move |v| v + offset)
        .then(move |v| v - offset);
    fulfill_later(&promise, 42);
    assert_eq!(future.wait().unwrap(), 42);
}

// ============================================================================
// Error propagation
// ============================================================================

#[test]
fn an_error_mid_chain_skips_the_rest() {
    let promise = make_promise::<i32, Broke>();
    let reached_tail = Arc::new(AtomicUsize::new(0));
    let reached = Arc::clone(&reached_tail);

    let future = promise
        .future()
        .then(|v| v + 1)
        .then_try(|_| Err::<i32, _>(Broke))
        .then(move |v| {
            reached.fetch_add(1, Ordering::SeqCst);
            v - 1
        });

    fulfill_later(&promise, 42);
    assert_eq!(future.wait(), Err(Broke));
    assert_eq!(reached_tail.load(Ordering::SeqCst), 0);
}

#[test]
fn typed_error_observers_match_in_order() {
    #[derive(Debug, Error)]
    #[error("other")]
    struct Other;

    let promise = make_promise::<i32, DynError>();
    let future = promise.future();
    let wrong = Arc::new(AtomicUsize::new(0));
    let matched = Arc::new(AtomicUsize::new(0));
    let late = Arc::new(AtomicUsize::new(0));

    let wrong_in = Arc::clone(&wrong);
    future.on_error_of::<Other, _>(move |_| {
        wrong_in.fetch_add(1, Ordering::SeqCst);
    });
    let matched_in = Arc::clone(&matched);
    future.on_error_of::<Broke, _>(move |error| {
        assert_eq!(error.to_string(), "error");
        matched_in.fetch_add(1, Ordering::SeqCst);
    });
    // generic handler after the match must not run
    let late_in = Arc::clone(&late);
    future.on_error(move |_| {
        late_in.fetch_add(1, Ordering::SeqCst);
    });

    let error: DynError = Arc::new(Broke);
    promise.set_error(error).unwrap();

    assert_eq!(wrong.load(Ordering::SeqCst), 0);
    assert_eq!(matched.load(Ordering::SeqCst), 1);
    assert_eq!(late.load(Ordering::SeqCst), 0);
}

#[test]
fn error_observers_do_not_rescue_downstream_chains() {
    let promise = make_promise::<i32, Broke>();
    let future = promise.future();
    future.on_error(|_| { /* observed, not rescued */ });
    let downstream = future.then(|v| v + 1);
    promise.set_error(Broke).unwrap();
    assert_eq!(downstream.wait(), Err(Broke));
}

// ============================================================================
// Flattening
// ============================================================================

fn async_double(value: i32) -> weft_future::Future<i32, Broke> {
    let promise = make_promise::<i32, Broke>();
    let result = promise.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = result.set_result(value * 2);
    });
    promise.future()
}

#[test]
fn inner_future_settles_the_outer_chain() {
    let promise = make_promise::<i32, Broke>();
    let future = promise
        .future()
        .then_future(|v| async_double(*v))
        .then(|v| v + 2);
    fulfill_later(&promise, 20);
    assert_eq!(future.wait(), Ok(42));
}

#[test]
fn inner_future_failure_fails_the_outer_chain() {
    let promise = make_promise::<i32, Broke>();
    let future = promise.future().then_future(|_| {
        let inner = make_promise::<i32, Broke>();
        let failing = inner.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let _ = failing.set_error(Broke);
        });
        inner.future()
    });
    fulfill_later(&promise, 1);
    assert_eq!(future.wait(), Err(Broke));
}

#[test]
fn outer_failure_bypasses_the_inner_future() {
    let promise = make_promise::<i32, Broke>();
    let spawned = Arc::new(AtomicUsize::new(0));
    let spawned_in = Arc::clone(&spawned);
    let future = promise.future().then_future(move |v| {
        spawned_in.fetch_add(1, Ordering::SeqCst);
        async_double(*v)
    });
    promise.set_error(Broke).unwrap();
    assert_eq!(future.wait(), Err(Broke));
    assert_eq!(spawned.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Move-only results
// ============================================================================

#[test]
fn take_moves_out_and_allows_refulfillment() {
    // Box<i32> is Clone-free enough for the purpose: use a type without
    // Clone to prove `take` never copies.
    struct Opaque(i32);

    let promise = make_promise::<Opaque, Broke>();
    let future = promise.future();
    let producer = promise.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let _ = producer.set_result(Opaque(42));
    });

    let first = future.take().map(|v| v.0);
    assert_eq!(first, Ok(42));

    promise.set_result(Opaque(43)).unwrap();
    assert_eq!(future.take().map(|v| v.0), Ok(43));
}

// ============================================================================
// Aggregates
// ============================================================================

#[test]
fn aggregate_collects_in_key_order_regardless_of_completion_order() {
    let promises: Vec<Promise<f64, DynError>> = (0..3).map(|_| make_promise()).collect();
    let futures: Futures<f64, usize> = Futures::new();
    for (key, promise) in promises.iter().enumerate() {
        futures.add_promise(key, promise).unwrap();
        let promise = promise.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100 - 30 * key as u64));
            let _ = promise.set_result(key as f64);
        });
    }

    assert_eq!(futures.future_for(&0).unwrap().wait().unwrap(), 0.0);
    assert_eq!(futures.future_for(&1).unwrap().wait().unwrap(), 1.0);
    assert_eq!(futures.future_for(&2).unwrap().wait().unwrap(), 2.0);

    let values = futures.wait().unwrap();
    assert_eq!(values, vec![0.0, 1.0, 2.0]);
    assert_eq!(values.iter().sum::<f64>(), 3.0);
}

#[test]
fn aggregate_then_observes_the_collected_values() {
    let promises: Vec<Promise<i32, DynError>> = (0..4).map(|_| make_promise()).collect();
    let futures = Futures::from_promises(promises.iter().cloned().enumerate());
    let sum = futures.then(|values| values.iter().sum::<i32>());
    for (i, promise) in promises.iter().enumerate() {
        promise.set_result(i as i32 + 1).unwrap();
    }
    assert_eq!(sum.wait().unwrap(), 10);
}

// ============================================================================
// Contract violations
// ============================================================================

#[test]
fn settling_twice_is_an_immediate_error() {
    let promise = make_promise::<i32, DynError>();
    promise.set_result(1).unwrap();
    assert_eq!(promise.set_result(2), Err(StateError::AlreadyFulfilled));
}

#[test]
fn wait_clones_while_the_slot_stays_ready() {
    let promise = make_promise::<Vec<u8>, DynError>();
    let future = promise.future();
    promise.set_result(vec![1, 2, 3]).unwrap();
    for _ in 0..3 {
        assert_eq!(future.wait().unwrap(), vec![1, 2, 3]);
    }
}

#[test]
fn continuation_ordering_holds_across_threads() {
    let promise = make_promise::<i32, DynError>();
    let future = promise.future();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for tag in 0..8 {
        let seen = Arc::clone(&seen);
        future.then(move |_| seen.lock().unwrap().push(tag));
    }
    fulfill_later(&promise, 0);
    future.wait().unwrap();
    assert_eq!(*seen.lock().unwrap(), (0..8).collect::<Vec<_>>());
}

#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use dagflow::{
    all_of, done, done_with, spawn, submit_to, then, timeout, with_cancel, CancelToken, Error,
    PoolExecutor, Promise,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn concurrent_set_safely_has_exactly_one_winner() {
    let promise = Promise::<u32>::new();
    let future = promise.future();
    let (tx, rx) = mpsc::channel();

    let writers: Vec<_> = (0..8u32)
        .map(|i| {
            let promise = promise.clone();
            let tx = tx.clone();
            thread::spawn(move || tx.send((i, promise.set_safely(Ok(i)))).unwrap())
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    drop(tx);

    let outcomes: Vec<(u32, bool)> = rx.iter().collect();
    let winners: Vec<u32> = outcomes
        .iter()
        .filter(|(_, won)| *won)
        .map(|(i, _)| *i)
        .collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(future.get().unwrap(), winners[0]);
}

#[test]
fn broadcast_reaches_every_subscriber_exactly_once() {
    let promise = Promise::<u32>::new();
    let future = promise.future();
    let fires = Arc::new(AtomicUsize::new(0));

    for _ in 0..500 {
        let fires = Arc::clone(&fires);
        future.subscribe(move |outcome| {
            assert_eq!(*outcome.as_ref().unwrap(), 42);
            fires.fetch_add(1, Ordering::Relaxed);
        });
    }
    promise.set(Ok(42));
    for _ in 0..500 {
        let fires = Arc::clone(&fires);
        future.subscribe(move |outcome| {
            assert_eq!(*outcome.as_ref().unwrap(), 42);
            fires.fetch_add(1, Ordering::Relaxed);
        });
    }

    assert_eq!(fires.load(Ordering::Relaxed), 1000);
}

#[test]
fn concurrent_blocking_getters_observe_the_same_outcome() {
    let promise = Promise::<String>::new();
    let getters: Vec<_> = (0..4)
        .map(|_| {
            let future = promise.future();
            thread::spawn(move || future.get().unwrap())
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    promise.set(Ok("done".to_owned()));

    for getter in getters {
        assert_eq!(getter.join().unwrap(), "done");
    }
}

#[test]
fn get_with_returns_cancelled_when_the_token_fires_first() {
    let promise = Promise::<u32>::new();
    let future = promise.future();
    let token = CancelToken::new();

    {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            token.cancel();
        });
    }

    let start = Instant::now();
    let err = future.get_with(&token).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(start.elapsed() < Duration::from_secs(2));
    drop(promise);
}

#[test]
fn get_with_prefers_a_settled_cell_over_a_fired_token() {
    let token = CancelToken::new();
    token.cancel();
    assert_eq!(done(5).get_with(&token).unwrap(), 5);
}

#[test]
fn then_transforms_values_and_passes_errors_through() {
    let tripled = then(&done(2), |outcome| outcome.map(|v| v * 3));
    assert_eq!(tripled.get().unwrap(), 6);

    let failed = then(&done_with::<u32>(Err(Error::Timeout)), |outcome| {
        outcome.map(|v| v + 1)
    });
    assert!(matches!(failed.get().unwrap_err(), Error::Timeout));
}

#[test]
fn all_of_an_empty_list_is_immediately_done() {
    let aggregate = all_of::<u32>(&[]);
    assert!(aggregate.is_done());
    assert_eq!(aggregate.get().unwrap(), Vec::<u32>::new());
}

#[test]
fn all_of_collects_values_in_source_order() {
    let sources: Vec<_> = [30u64, 20, 10]
        .iter()
        .enumerate()
        .map(|(i, &delay)| {
            spawn(move || {
                thread::sleep(Duration::from_millis(delay));
                Ok(i as u32)
            })
        })
        .collect();
    assert_eq!(all_of(&sources).get().unwrap(), vec![0, 1, 2]);
}

#[test]
fn all_of_short_circuits_on_the_first_error() {
    let failing = spawn(|| -> dagflow::Outcome<u32> {
        thread::sleep(Duration::from_millis(20));
        Err(Error::msg("early failure"))
    });
    let slow = spawn(|| {
        thread::sleep(Duration::from_millis(400));
        Ok(1u32)
    });

    let start = Instant::now();
    let err = all_of(&[failing, slow]).get().unwrap_err();
    assert!(start.elapsed() < Duration::from_millis(300));
    assert!(err.to_string().contains("early failure"));
}

#[test]
fn timeout_fires_when_the_source_is_too_slow() {
    let promise = Promise::<u32>::new();
    let bounded = timeout(&promise.future(), Duration::from_millis(50));

    let start = Instant::now();
    let err = bounded.get().unwrap_err();
    assert!(matches!(err, Error::Timeout));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(45));
    assert!(elapsed < Duration::from_secs(2));
}

#[test]
fn timeout_forwards_a_fast_source_and_stops_the_timer() {
    let source = spawn(|| {
        thread::sleep(Duration::from_millis(10));
        Ok(5u32)
    });
    let bounded = timeout(&source, Duration::from_millis(500));
    let start = Instant::now();
    assert_eq!(bounded.get().unwrap(), 5);
    assert!(start.elapsed() < Duration::from_millis(400));
}

#[test]
fn with_cancel_forwards_the_source_when_it_wins() {
    let token = CancelToken::new();
    let guarded = with_cancel(&done(9), &token);
    assert_eq!(guarded.get().unwrap(), 9);
    token.cancel();
    assert_eq!(guarded.get().unwrap(), 9);
}

#[test]
fn with_cancel_settles_with_cancelled_when_the_token_wins() {
    let promise = Promise::<u32>::new();
    let token = CancelToken::new();
    let guarded = with_cancel(&promise.future(), &token);
    token.cancel();
    assert!(matches!(guarded.get().unwrap_err(), Error::Cancelled));
    // The source keeps its own life; settling it later is not an error.
    promise.set(Ok(1));
}

#[test]
fn spawn_converts_panics_into_typed_errors() {
    let future = spawn(|| -> dagflow::Outcome<u32> { panic!("kaput") });
    match future.get().unwrap_err() {
        Error::Panic { message, backtrace } => {
            assert_eq!(&*message, "kaput");
            assert!(!backtrace.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn submit_to_runs_on_the_given_executor() {
    let pool = PoolExecutor::new(2);
    let futures: Vec<_> = (0..16u32)
        .map(|i| submit_to(&pool, move || Ok(i * 2)))
        .collect();
    let values = all_of(&futures).get().unwrap();
    assert_eq!(values, (0..16).map(|i| i * 2).collect::<Vec<_>>());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// For any split of subscribers registered before and racing with a
    /// single set, the fire count converges to the subscriber count.
    #[test]
    fn broadcast_fire_count_matches_subscriber_count(pre in 0usize..12, post in 0usize..12) {
        let promise = Promise::<u32>::new();
        let future = promise.future();
        let fires = Arc::new(AtomicUsize::new(0));

        for _ in 0..pre {
            let fires = Arc::clone(&fires);
            future.subscribe(move |_| {
                fires.fetch_add(1, Ordering::Relaxed);
            });
        }
        let setter = {
            let promise = promise.clone();
            thread::spawn(move || promise.set(Ok(0)))
        };
        for _ in 0..post {
            let fires = Arc::clone(&fires);
            future.subscribe(move |_| {
                fires.fetch_add(1, Ordering::Relaxed);
            });
        }
        setter.join().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while fires.load(Ordering::Relaxed) != pre + post {
            prop_assert!(Instant::now() < deadline, "lost a callback fire");
            thread::yield_now();
        }
    }
}

#![allow(missing_docs)]
#![cfg(feature = "loom")]

use dagflow::Promise;
use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::thread;
use std::sync::Arc;

#[test]
fn loom_exactly_one_concurrent_set_wins() {
    loom::model(|| {
        let promise = Promise::<u32>::new();
        let future = promise.future();

        let first = {
            let promise = promise.clone();
            thread::spawn(move || promise.set_safely(Ok(1)))
        };
        let second = {
            let promise = promise.clone();
            thread::spawn(move || promise.set_safely(Ok(2)))
        };
        let first_won = first.join().unwrap();
        let second_won = second.join().unwrap();

        // Exactly one writer wins, and the cell holds the winner's value.
        assert!(first_won ^ second_won);
        let expected = if first_won { 1 } else { 2 };
        assert_eq!(future.get().unwrap(), expected);
    });
}

#[test]
fn loom_subscriber_racing_a_set_fires_exactly_once() {
    loom::model(|| {
        let promise = Promise::<u32>::new();
        let future = promise.future();
        let fires = Arc::new(AtomicUsize::new(0));

        let setter = {
            let promise = promise.clone();
            thread::spawn(move || promise.set(Ok(7)))
        };
        let subscriber = {
            let future = future.clone();
            let fires = Arc::clone(&fires);
            thread::spawn(move || {
                future.subscribe(move |outcome| {
                    assert_eq!(*outcome.as_ref().unwrap(), 7);
                    fires.fetch_add(1, Ordering::Relaxed);
                });
            })
        };
        setter.join().unwrap();
        subscriber.join().unwrap();

        // The subscribe-then-recheck protocol plus the single-fire latch
        // guarantee exactly one invocation through every interleaving,
        // including a push landing mid-drain.
        assert_eq!(fires.load(Ordering::Relaxed), 1);
    });
}

#[test]
fn loom_early_and_racing_subscribers_each_fire_once() {
    loom::model(|| {
        let promise = Promise::<u32>::new();
        let future = promise.future();
        let fires = Arc::new(AtomicUsize::new(0));

        {
            let fires = Arc::clone(&fires);
            future.subscribe(move |_| {
                fires.fetch_add(1, Ordering::Relaxed);
            });
        }

        let setter = {
            let promise = promise.clone();
            thread::spawn(move || promise.set(Ok(3)))
        };
        let racer = {
            let future = future.clone();
            let fires = Arc::clone(&fires);
            thread::spawn(move || {
                future.subscribe(move |_| {
                    fires.fetch_add(1, Ordering::Relaxed);
                });
            })
        };
        setter.join().unwrap();
        racer.join().unwrap();

        assert_eq!(fires.load(Ordering::Relaxed), 2);
    });
}

use entkit::{Key, Mutation, StatusUpdate, Value};
use std::sync::{Arc, Barrier};
use std::thread;

use crate::common::contended_entities;

const THREADS: usize = 8;

#[test]
fn test_concurrent_counter_reaches_start_plus_n() {
    let entities = contended_entities();
    let key = Key::name("Counter", "visits");
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let entities = entities.clone();
            let key = key.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                entities.increase_counter(key, "n", 1, 10).unwrap()
            })
        })
        .collect();

    let mut old: Vec<i64> = handles
        .into_iter()
        .map(|h| h.join().unwrap().as_int().unwrap())
        .collect();
    old.sort_unstable();

    assert_eq!(old, (10..10 + THREADS as i64).collect::<Vec<_>>());
    assert_eq!(
        entities.get(key).unwrap().unwrap().get("n"),
        Some(&Value::Int(10 + THREADS as i64))
    );
}

#[test]
fn test_concurrent_status_increments_are_not_lost() {
    let entities = contended_entities();
    let key = Key::name("Stock", "widgets");
    entities
        .write_in_transaction(key.clone(), true, [("count", 0)])
        .unwrap();

    let update = StatusUpdate::new(Mutation::fields([("+count", Value::Int(3))]).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let entities = entities.clone();
            let key = key.clone();
            let update = update.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                entities.set_status(key, &update).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(
        entities.get(key).unwrap().unwrap().get("count"),
        Some(&Value::Int(3 * THREADS as i64))
    );
}

#![forbid(unsafe_code)]

//! E2E tests for sequential task queues.
//!
//! Validates that:
//! 1. Mixed results are recorded per task and the queue finishes.
//! 2. Tasks start strictly one after another.
//! 3. Cancelling mid-run leaves unstarted tasks pending.

use std::cell::RefCell;
use std::rc::Rc;

use cadence::prelude::*;
use futures::channel::oneshot;
use futures::executor::LocalPool;

#[test]
fn mixed_results_are_recorded_in_order() {
    let mut pool = LocalPool::new();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let finished = Rc::new(RefCell::new(false));
    let (e, f) = (Rc::clone(&errors), Rc::clone(&finished));

    let queue = AsyncQueue::spawn_with(
        vec![
            task(|| async { Ok::<i32, String>(1) }),
            task(|| async { Err("x".to_string()) }),
            task(|| async { Ok(3) }),
        ],
        cadence_runtime::task_queue::QueueOptions::default()
            .on_error(move |i, err: &String| e.borrow_mut().push((i, err.clone())))
            .on_finished(move || *f.borrow_mut() = true),
        &pool.spawner(),
    )
    .unwrap();
    pool.run_until_stalled();

    let results = queue.result().get();
    assert_eq!(results[0], TaskResult::Fulfilled(1));
    assert_eq!(results[1].error().map(String::as_str), Some("x"));
    assert_eq!(results[2].value(), Some(&3));
    assert_eq!(queue.active_index().get(), 3);
    assert!(queue.is_finished().get());
    assert!(*finished.borrow());
    assert_eq!(*errors.borrow(), vec![(1, "x".to_string())]);
}

#[test]
fn tasks_run_one_at_a_time() {
    let mut pool = LocalPool::new();
    let (tx1, rx1) = oneshot::channel::<i32>();
    let started = Rc::new(RefCell::new(Vec::new()));
    let (s1, s2) = (Rc::clone(&started), Rc::clone(&started));

    let queue = AsyncQueue::spawn(
        vec![
            task(move || async move {
                s1.borrow_mut().push(0);
                rx1.await.map_err(|_| "dropped")
            }),
            task(move || async move {
                s2.borrow_mut().push(1);
                Ok(2)
            }),
        ],
        &pool.spawner(),
    )
    .unwrap();

    pool.run_until_stalled();
    assert_eq!(*started.borrow(), vec![0]);
    assert_eq!(queue.active_index().get(), 0);
    assert!(queue.result().get()[1].is_pending());

    tx1.send(1).unwrap();
    pool.run_until_stalled();
    assert_eq!(*started.borrow(), vec![0, 1]);
    assert_eq!(
        queue.result().get(),
        vec![TaskResult::Fulfilled(1), TaskResult::Fulfilled(2)]
    );
}

#[test]
fn cancel_stops_the_queue() {
    let mut pool = LocalPool::new();
    let (_tx, rx) = oneshot::channel::<i32>();
    let queue = AsyncQueue::spawn(
        vec![
            task(|| async { Ok::<i32, &str>(1) }),
            task(move || async move { rx.await.map_err(|_| "dropped") }),
            task(|| async { Ok(3) }),
        ],
        &pool.spawner(),
    )
    .unwrap();
    pool.run_until_stalled();
    assert_eq!(queue.active_index().get(), 1);

    queue.cancel();
    pool.run_until_stalled();
    assert!(queue.is_cancelled());
    assert!(!queue.is_finished().get());
    let results = queue.result().get();
    assert!(results[0].is_fulfilled());
    assert!(results[1].is_pending());
    assert!(results[2].is_pending());
}

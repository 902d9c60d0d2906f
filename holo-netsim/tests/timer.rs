//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use holo_netsim::SimTime;
use holo_netsim::timer::TimerQueue;

#[test]
fn timer_queue_order() {
    let mut queue = TimerQueue::default();
    queue.insert(SimTime::from_secs(5), "c");
    queue.insert(SimTime::from_secs(1), "a");
    queue.insert(SimTime::from_secs(5), "d");
    queue.insert(SimTime::from_secs(3), "b");

    let mut fired = vec![];
    while let Some((_, _, token)) = queue.pop_first() {
        fired.push(token);
    }
    assert_eq!(fired, vec!["a", "b", "c", "d"]);
}

#[test]
fn timer_queue_cancel() {
    let mut queue = TimerQueue::default();
    let first = queue.insert(SimTime::from_secs(1), 1);
    let second = queue.insert(SimTime::from_secs(2), 2);

    assert_eq!(queue.cancel(first), Some(1));
    assert_eq!(queue.cancel(first), None);
    assert!(!queue.contains(first));
    assert!(queue.contains(second));
    assert_eq!(queue.next_deadline(), Some(SimTime::from_secs(2)));
    assert_eq!(queue.len(), 1);
}

#[test]
fn timer_queue_pop_expired() {
    let mut queue = TimerQueue::default();
    queue.insert(SimTime::from_secs(10), ());

    assert!(queue.pop_expired(SimTime::from_secs(9)).is_none());
    let (at, _, _) = queue.pop_expired(SimTime::from_secs(10)).unwrap();
    assert_eq!(at, SimTime::from_secs(10));
    assert!(queue.is_empty());
}

#[test]
fn sim_time_arithmetic() {
    let t1 = SimTime::from_secs(3);
    let t2 = t1 + Duration::from_millis(1500);

    assert_eq!(t2, SimTime::from_millis(4500));
    assert_eq!(t2 - t1, Duration::from_millis(1500));
    assert_eq!(t1 - t2, Duration::ZERO);
    assert_eq!(t2.as_secs(), 4);
    assert_eq!(t2.to_string(), "4.500s");
}

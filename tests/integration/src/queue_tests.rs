//! Admission control and fairness at the request queue.
//!
//! These tests drive `RequestQueue` directly with bare requests; the
//! end-to-end backpressure path is covered in `e2e_tests`.

use crate::fixtures::*;
use modelgw_queue::{EnqueueRejection, QueueConfig, RequestQueue};
use std::collections::HashMap;

fn queue(max_depth: usize) -> RequestQueue<modelgw_core::InferenceRequest> {
    RequestQueue::new(QueueConfig {
        max_depth,
        caller_weights: HashMap::new(),
    })
}

#[test]
fn test_queue_rejects_at_depth_and_recovers() {
    let queue = queue(3);

    for i in 0..3 {
        queue
            .enqueue(priority_request("agent-1", &format!("q{i}"), 50))
            .expect("admit");
    }
    assert_eq!(
        queue.enqueue(priority_request("agent-1", "overflow", 50)),
        Err(EnqueueRejection::Full { max_depth: 3 })
    );

    // Draining one slot re-opens admission
    let _ = queue.dequeue().expect("item");
    queue
        .enqueue(priority_request("agent-1", "fits now", 50))
        .expect("admit");
}

#[test]
fn test_queue_priority_tiers_served_high_to_low() {
    let queue = queue(16);
    queue.enqueue(priority_request("a", "low", 10)).expect("admit");
    queue.enqueue(priority_request("a", "high", 90)).expect("admit");
    queue.enqueue(priority_request("b", "mid", 50)).expect("admit");
    queue.enqueue(priority_request("b", "high", 90)).expect("admit");

    let priorities: Vec<u8> = std::iter::from_fn(|| queue.dequeue())
        .map(|r| r.priority.0)
        .collect();
    assert_eq!(priorities, vec![90, 90, 50, 10]);
}

#[test]
fn test_queue_fairness_across_equal_priority_callers() {
    // N callers each submitting a burst at the same priority; within the
    // first rotation every caller is served once, so no caller's first
    // request waits more than one rotation behind the others.
    let queue = queue(64);
    let callers = ["a", "b", "c", "d"];

    for name in callers {
        for i in 0..8 {
            queue
                .enqueue(priority_request(name, &format!("{name}-{i}"), 50))
                .expect("admit");
        }
    }

    let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
        .map(|r| r.caller.as_str().to_string())
        .collect();

    for name in callers {
        let first_served = order
            .iter()
            .position(|c| c == name)
            .expect("every caller served");
        assert!(
            first_served < callers.len(),
            "caller {name} starved: first served at {first_served} in {order:?}"
        );
    }

    // Over the full drain, consecutive rotations interleave the callers
    // rather than emptying one lane at a time
    let head: Vec<&str> = order.iter().take(8).map(String::as_str).collect();
    for name in callers {
        assert_eq!(head.iter().filter(|c| **c == name).count(), 2);
    }
}

#[test]
fn test_queue_single_heavy_caller_cannot_starve_others() {
    let queue = queue(64);

    for i in 0..20 {
        queue
            .enqueue(priority_request("heavy", &format!("h{i}"), 50))
            .expect("admit");
    }
    queue.enqueue(priority_request("light", "only one", 50)).expect("admit");

    let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
        .map(|r| r.caller.as_str().to_string())
        .collect();

    let light_pos = order.iter().position(|c| c == "light").expect("served");
    assert!(
        light_pos <= 1,
        "light caller waited {light_pos} positions: {order:?}"
    );
}

#[test]
fn test_queue_weighted_round_robin_shares() {
    let mut weights = HashMap::new();
    weights.insert(caller("interactive"), 3);
    let queue: RequestQueue<modelgw_core::InferenceRequest> = RequestQueue::new(QueueConfig {
        max_depth: 32,
        caller_weights: weights,
    });

    for i in 0..6 {
        queue
            .enqueue(priority_request("interactive", &format!("i{i}"), 50))
            .expect("admit");
        queue
            .enqueue(priority_request("batch", &format!("b{i}"), 50))
            .expect("admit");
    }

    let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
        .map(|r| r.caller.as_str().to_string())
        .collect();

    // First rotation: three interactive, then one batch
    assert_eq!(
        &order[..4],
        &["interactive", "interactive", "interactive", "batch"]
    );
}

#[test]
fn test_queue_expired_entries_reported_distinctly() {
    let queue = queue(16);

    queue.enqueue(expired_request("a", "stale one")).expect("admit");
    queue.enqueue(priority_request("a", "fresh", 50)).expect("admit");
    queue.enqueue(expired_request("b", "stale two")).expect("admit");

    // Dequeue skips over expired entries without serving them
    let served = queue.dequeue().expect("fresh item");
    assert_eq!(served.caller.as_str(), "a");
    assert!(queue.dequeue().is_none());

    // Expired entries are handed back for reporting, never silently dropped
    let expired = queue.take_expired();
    assert_eq!(expired.len(), 2);
    assert!(queue.take_expired().is_empty());
}

#[test]
fn test_queue_sweep_moves_expired_out_of_depth() {
    let queue = queue(4);

    queue.enqueue(expired_request("a", "one")).expect("admit");
    queue.enqueue(expired_request("a", "two")).expect("admit");
    queue.enqueue(priority_request("a", "live", 50)).expect("admit");
    assert_eq!(queue.len(), 3);

    assert_eq!(queue.sweep_expired(), 2);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.take_expired().len(), 2);
}

#[test]
fn test_queue_stamps_enqueue_time_on_admission() {
    let queue = queue(4);
    let before = chrono::Utc::now();

    queue.enqueue(priority_request("a", "stamp me", 50)).expect("admit");
    let item = queue.dequeue().expect("item");

    let stamped = item.enqueued_at.expect("stamped");
    assert!(stamped >= before);
    assert!(stamped <= chrono::Utc::now());
}

//! Integration tests for the bounded blocking queue.
//!
//! Covers ordering, capacity limits, timeouts and multi-threaded hand-off.

use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskyard::core::{BoundedBlockingQueue, PushError, WaitTimeout};

#[test]
fn test_size_and_fifo_order_below_capacity() {
    let mut rng = rand::rng();
    for _ in 0..20 {
        let capacity = rng.random_range(1..64usize);
        let count = rng.random_range(0..=capacity);
        let queue = BoundedBlockingQueue::new(capacity);

        let pushed = (0..count).filter(|i| queue.push(*i).is_ok()).count();
        assert_eq!(pushed, count);
        assert_eq!(queue.size(), count);

        let popped: Vec<usize> = std::iter::from_fn(|| queue.pop(WaitTimeout::Immediate)).collect();
        assert_eq!(popped, (0..count).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }
}

#[test]
fn test_push_to_full_queue_fails_and_keeps_size() {
    let queue = BoundedBlockingQueue::new(4);
    for i in 0..4 {
        queue.push(i).unwrap();
    }

    let err = queue.push(99).unwrap_err();
    assert!(err.is_full());
    assert_eq!(err.into_inner(), 99);
    assert_eq!(queue.size(), 4);
}

#[test]
fn test_pop_zero_on_empty_returns_immediately() {
    let queue: BoundedBlockingQueue<u8> = BoundedBlockingQueue::new(8);
    let start = Instant::now();
    assert_eq!(queue.pop(WaitTimeout::from_millis(0)), None);
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_pop_forever_receives_pushed_item() {
    let queue = Arc::new(BoundedBlockingQueue::new(8));
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.pop(WaitTimeout::from_millis(-1)))
    };

    thread::sleep(Duration::from_millis(30));
    queue.push("payload").unwrap();
    assert_eq!(consumer.join().unwrap(), Some("payload"));
}

#[test]
fn test_push_timeout_returns_item_after_bound() {
    let queue = BoundedBlockingQueue::new(1);
    queue.push(1).unwrap();

    let start = Instant::now();
    let err = queue
        .push_timeout(2, WaitTimeout::Within(Duration::from_millis(30)))
        .unwrap_err();
    assert!(matches!(err, PushError::Timeout(2)));
    assert!(start.elapsed() >= Duration::from_millis(25));
}

#[test]
fn test_blocked_push_proceeds_after_pop() {
    let queue = Arc::new(BoundedBlockingQueue::new(1));
    queue.push(1).unwrap();

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.push_timeout(2, WaitTimeout::Forever))
    };

    thread::sleep(Duration::from_millis(20));
    assert_eq!(queue.pop(WaitTimeout::Immediate), Some(1));
    assert!(producer.join().unwrap().is_ok());
    assert_eq!(queue.pop(WaitTimeout::Immediate), Some(2));
}

#[test]
fn test_front_and_back_operations() {
    let queue = BoundedBlockingQueue::new(8);
    queue.push_back(2).unwrap();
    queue.push_back(3).unwrap();
    queue.push_front(1).unwrap();

    assert_eq!(queue.pop_back(WaitTimeout::Immediate), Some(3));
    assert_eq!(queue.pop_front(WaitTimeout::Immediate), Some(1));
    assert_eq!(queue.pop(WaitTimeout::Immediate), Some(2));
}

#[test]
fn test_lowered_capacity_does_not_evict() {
    let queue = BoundedBlockingQueue::new(4);
    for i in 0..4 {
        queue.push(i).unwrap();
    }

    assert_eq!(queue.set_capacity(2), 4);
    assert_eq!(queue.size(), 4);
    assert!(queue.push(4).is_err());

    queue.pop(WaitTimeout::Immediate);
    queue.pop(WaitTimeout::Immediate);
    assert!(queue.push(4).is_err());
    queue.pop(WaitTimeout::Immediate);
    assert!(queue.push(4).is_ok());
}

#[test]
fn test_swap_exchanges_contents() {
    let queue = BoundedBlockingQueue::new(8);
    queue.push('a').unwrap();

    let mut other: VecDeque<char> = VecDeque::from(vec!['x', 'y']);
    queue.swap(&mut other);

    assert_eq!(other, VecDeque::from(vec!['a']));
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop(WaitTimeout::Immediate), Some('x'));
}

#[test]
fn test_concurrent_producers_and_consumers() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 500;

    let queue = Arc::new(BoundedBlockingQueue::new(16));
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue
                        .push_timeout(p * PER_PRODUCER + i, WaitTimeout::Forever)
                        .unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(item) = queue.pop(WaitTimeout::Within(Duration::from_millis(200))) {
                    seen.push(item);
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let mut all: Vec<usize> = consumers
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
}

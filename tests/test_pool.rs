// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_capture::pool::{FrameBufferPool, Role};

#[derive(Debug, Clone, Copy)]
enum Op {
    Acquire,
    Retire,
    Discard,
    Consume,
    Flush,
}

const OPS: [Op; 5] = [Op::Acquire, Op::Retire, Op::Discard, Op::Consume, Op::Flush];

fn apply(pool: &mut FrameBufferPool, op: Op) {
    match op {
        Op::Acquire => {
            pool.acquire_target();
        }
        Op::Retire => {
            pool.retire_tail_to_head();
        }
        Op::Discard => {
            pool.discard_tail();
        }
        Op::Consume => {
            pool.consume_head();
        }
        Op::Flush => pool.flush(),
    }
}

fn sequences(len: usize) -> impl Iterator<Item = Vec<Op>> {
    let total = OPS.len().pow(len as u32);
    (0..total).map(move |mut n| {
        (0..len)
            .map(|_| {
                let op = OPS[n % OPS.len()];
                n /= OPS.len();
                op
            })
            .collect()
    })
}

#[test]
fn test_role_invariants_exhaustive() {
    for count in 1..=4 {
        for seq in sequences(5) {
            let mut pool = FrameBufferPool::new(count, 64);
            for &op in &seq {
                let head_before = pool.head();
                let tail_before = pool.tail();
                apply(&mut pool, op);
                assert!(
                    pool.check_invariants(),
                    "invariants broken by {seq:?} with {count} buffers: {pool:?}"
                );

                let heads = (0..count).filter(|&i| pool.role(i) == Role::Head).count();
                let tails = (0..count).filter(|&i| pool.role(i) == Role::Tail).count();
                let free = (0..count).filter(|&i| pool.role(i) == Role::Free).count();
                assert!(heads <= 1 && tails <= 1);
                assert_eq!(heads + tails + free, count);
                assert_eq!(free, pool.free_count());

                // Only a retire may change the head to a different buffer.
                if let (Some(before), Some(after)) = (head_before, pool.head()) {
                    if before != after {
                        assert!(matches!(op, Op::Retire));
                        assert_eq!(Some(after), tail_before);
                    }
                }
            }
        }
    }
}

#[test]
fn test_acquire_requires_free_buffer() {
    let mut pool = FrameBufferPool::new(1, 64);
    assert_eq!(pool.acquire_target(), Some(0));
    assert_eq!(pool.acquire_target(), None, "a second target while one exists");
    pool.retire_tail_to_head();
    assert_eq!(pool.head(), Some(0));
    assert_eq!(pool.acquire_target(), None, "the head is never a target");
    pool.consume_head();
    assert_eq!(pool.acquire_target(), Some(0));
}

#[test]
fn test_retire_demotes_previous_head() {
    let mut pool = FrameBufferPool::new(2, 64);
    let a = pool.acquire_target().unwrap();
    pool.retire_tail_to_head();
    let b = pool.acquire_target().unwrap();
    assert_ne!(a, b);
    assert_eq!(pool.role(a), Role::Head);
    pool.retire_tail_to_head();
    assert_eq!(pool.head(), Some(b));
    assert_eq!(pool.role(a), Role::Free);
    assert_eq!(pool.free(), Some(a));
}

#[test]
fn test_flush_keeps_head() {
    let mut pool = FrameBufferPool::new(3, 64);
    pool.acquire_target();
    pool.retire_tail_to_head();
    let head = pool.head();
    pool.acquire_target();
    pool.flush();
    assert_eq!(pool.head(), head);
    assert_eq!(pool.tail(), None);
    assert_eq!(pool.free_count(), 2);
}

#[test]
fn test_buffers_are_granule_aligned() {
    let pool = FrameBufferPool::new(4, 1000);
    for buffer in pool.buffers() {
        assert_eq!(buffer.size(), 1024);
        assert_eq!(buffer.data().as_ptr() as usize % 32, 0);
        assert_eq!(buffer.size_used(), 0);
        assert!(buffer.info().is_none());
    }
}

#[test]
fn test_reacquire_resets_buffer() {
    let mut pool = FrameBufferPool::new(2, 64);
    let first = pool.acquire_target().unwrap();
    pool.discard_tail();
    let again = pool.acquire_target().unwrap();
    assert_ne!(first, again, "targets rotate through the ring");
    let buffer = pool.buffer(again);
    assert_eq!(buffer.write_cursor(), 0);
    assert!(!buffer.overflowed());
}

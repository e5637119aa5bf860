// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_capture::hal::{HwEvent, Interrupts};
use std::{
    thread,
    time::{Duration, Instant},
};

fn next_event(irq: &Interrupts, within: Duration) -> Option<HwEvent> {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if let Some(event) = irq.wait(deadline.saturating_duration_since(Instant::now())) {
            return Some(event);
        }
    }
    None
}

#[test]
fn test_relay_served_first_after_sleep() {
    let irq = Interrupts::new();
    let relay = irq.relay_line();
    let bus = irq.bus_line();

    // Both lines fire while the consumer is asleep in `wait`.
    let poster = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        assert!(relay.post(HwEvent::RelayComplete));
        assert!(bus.post(HwEvent::FrameComplete));
    });

    let first = next_event(&irq, Duration::from_secs(5));
    poster.join().expect("poster thread");
    assert_eq!(first, Some(HwEvent::RelayComplete));
    assert_eq!(
        next_event(&irq, Duration::from_secs(1)),
        Some(HwEvent::FrameComplete)
    );
    assert_eq!(irq.wait(Duration::from_millis(5)), None);
}

#[test]
fn test_relay_event_wakes_waiter() {
    let irq = Interrupts::new();
    let relay = irq.relay_line();
    let poster = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        relay.post(HwEvent::RelayComplete);
    });

    let start = Instant::now();
    let event = next_event(&irq, Duration::from_secs(5));
    poster.join().expect("poster thread");
    assert_eq!(event, Some(HwEvent::RelayComplete));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_flush_discards_both_lines() {
    let irq = Interrupts::new();
    irq.bus_line().post(HwEvent::LineComplete { index: 0, len: 16 });
    irq.relay_line().post(HwEvent::RelayComplete);
    irq.bus_line().post(HwEvent::FrameComplete);
    assert_eq!(irq.flush(), 3);
    assert_eq!(irq.wait(Duration::from_millis(5)), None);
}

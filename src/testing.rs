// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side test support: clocks that only move when a test says so.
//!
//! The time is per thread, so tests running in parallel don't see each
//! other's clocks. Each test sets the time it starts at.

use std::cell::Cell;

use crate::time::Clock;

std::thread_local! {
    static NOW: Cell<u64> = const { Cell::new(0) };
}

/// Sets the current thread's time, in milliseconds.
pub(crate) fn set_time(ms: u64) {
    NOW.with(|n| n.set(ms));
}

/// Moves the current thread's time forward.
pub(crate) fn advance(ms: u64) {
    NOW.with(|n| n.set(n.get() + ms));
}

fn now() -> u64 {
    NOW.with(Cell::get)
}

/// 32-bit view of the test time.
#[derive(Copy, Clone, Debug)]
pub(crate) enum TestClock {}

impl Clock for TestClock {
    type Tick = u32;

    fn now() -> u32 {
        now() as u32
    }
}

/// 16-bit view of the test time, for exercising wraparound.
#[derive(Copy, Clone, Debug)]
pub(crate) enum ShortClock {}

impl Clock for ShortClock {
    type Tick = u16;

    fn now() -> u16 {
        now() as u16
    }
}

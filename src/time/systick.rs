// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Monotonic millisecond clock using the SysTick Timer.
//!
//! **Note:** this module is only available if the `systick` feature is
//! present.
//!
//! To use this clock in an application, call [`initialize_sys_tick`] to tell
//! it the core clock speed, before the first timer is armed. Otherwise
//! [`SysTickClock::now`] will read zero forever.

use cortex_m::peripheral::{syst::SystClkSource, SYST};
use cortex_m_rt::exception;
use portable_atomic::{AtomicU32, Ordering};

use super::Clock;

/// Bottom 32 bits of the tick counter. Updated by ISR.
static TICK: AtomicU32 = AtomicU32::new(0);
/// Top 32 bits of the tick counter. Updated by ISR.
static EPOCH: AtomicU32 = AtomicU32::new(0);

/// Sets up the tick counter for 1kHz operation, assuming a CPU core clock of
/// `clock_hz`.
///
/// # Panics
///
/// If `clock_hz` is less than 1000.
pub fn initialize_sys_tick(syst: &mut SYST, clock_hz: u32) {
    syst.set_reload(super::millis_reload(clock_hz));
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_interrupt();
    syst.enable_counter();
}

/// Milliseconds since [`initialize_sys_tick`], as a 64-bit count that won't
/// wrap in any reasonable uptime.
#[derive(Copy, Clone, Debug)]
pub struct SysTickClock;

impl Clock for SysTickClock {
    type Tick = u64;

    fn now() -> u64 {
        // This loop will only repeat if e != e2, which means we raced the
        // systick ISR. Since that ISR only occurs once per millisecond, this
        // loop should repeat at most twice.
        loop {
            let e = EPOCH.load(Ordering::SeqCst);
            let t = TICK.load(Ordering::SeqCst);
            let e2 = EPOCH.load(Ordering::SeqCst);
            if e == e2 {
                break (u64::from(e) << 32) | u64::from(t);
            }
        }
    }
}

/// System tick ISR. Advances the tick counter.
#[doc(hidden)]
#[exception]
fn SysTick() {
    if TICK.fetch_add(1, Ordering::Release) == u32::MAX {
        EPOCH.fetch_add(1, Ordering::Release);
    }
}

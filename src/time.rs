// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Waiting for time to pass.
//!
//! A resumable function can't sleep: there's no stack to park. Instead, a
//! "wait for 10 ms" point arms a [`Timeout`] once, on first arrival, and then
//! uses [`Timeout::is_expired`] as the predicate it polls on every call after
//! that. To the scheduler, a routine waiting on time looks exactly like one
//! waiting on a hardware flag.
//!
//! # Clocks
//!
//! Timers read the time from a [`Clock`], which is a type with a static
//! `now()` function returning a monotonic count of milliseconds. The count
//! may be as narrow as 16 bits, in which case it wraps every 65.5 seconds;
//! timers handle the wrap by comparing times with wrapping arithmetic. This
//! only works if a timer is polled at least once per half the clock's
//! modulus (32.7 seconds for a 16-bit clock) after it expires. In exchange, a
//! `Timeout` on a 16-bit clock costs four bytes.
//!
//! With the `systick` feature, this module provides [`SysTickClock`], a
//! 64-bit clock driven by the Cortex-M SysTick timer. Otherwise, bring your
//! own by implementing `Clock` for something that reads a hardware counter.
//!
//! # Durations
//!
//! Durations are measured in [`Millis`], which is a thin wrapper around `u64`.
//! You can also pass a `core::time::Duration` anywhere a duration is
//! accepted, though on small processors that's costly to convert.

use core::fmt;
use core::marker::PhantomData;
use core::time::Duration;

use crate::cheap_assert;

cfg_if::cfg_if! {
    if #[cfg(feature = "systick")] {
        mod systick;

        pub use systick::{initialize_sys_tick, SysTickClock};
    }
}

/// SysTick reload value for a 1 kHz tick with a core clock of `clock_hz`.
///
/// # Panics
///
/// If `clock_hz` is below 1 kHz, which can't produce a millisecond tick.
#[cfg(any(test, feature = "systick"))]
pub(crate) fn millis_reload(clock_hz: u32) -> u32 {
    cheap_assert!(clock_hz >= 1000);
    clock_hz / 1000 - 1
}

mod sealed {
    pub trait Sealed {}
}

/// A counter value read from a [`Clock`]. Implemented for `u16`, `u32`, and
/// `u64`.
pub trait Tick: Copy + Eq + fmt::Debug + sealed::Sealed {
    /// The value a clock reads at boot.
    const ZERO: Self;
    /// Longest span, in ticks, two readings can be apart and still compare
    /// correctly.
    const MAX_SPAN: u64;

    /// Adds `n` ticks, wrapping at the counter's width.
    fn wrapping_add_ticks(self, n: u64) -> Self;

    /// Signed distance from `earlier` to `self`, in ticks. Negative if `self`
    /// is actually before `earlier`.
    fn signed_since(self, earlier: Self) -> i64;
}

macro_rules! impl_tick {
    ($t:ty, $signed:ty) => {
        impl sealed::Sealed for $t {}

        impl Tick for $t {
            const ZERO: Self = 0;
            const MAX_SPAN: u64 = <$signed>::MAX as u64;

            fn wrapping_add_ticks(self, n: u64) -> Self {
                // Truncation is the wrap.
                self.wrapping_add(n as $t)
            }

            fn signed_since(self, earlier: Self) -> i64 {
                i64::from(self.wrapping_sub(earlier) as $signed)
            }
        }
    };
}

impl_tick!(u16, i16);
impl_tick!(u32, i32);

impl sealed::Sealed for u64 {}

impl Tick for u64 {
    const ZERO: Self = 0;
    const MAX_SPAN: u64 = i64::MAX as u64;

    fn wrapping_add_ticks(self, n: u64) -> Self {
        self.wrapping_add(n)
    }

    fn signed_since(self, earlier: Self) -> i64 {
        self.wrapping_sub(earlier) as i64
    }
}

/// A monotonic source of time, in milliseconds.
///
/// `now` is a static function so that timers don't need to carry a reference
/// to the clock around. There's usually exactly one clock in a system anyway.
pub trait Clock {
    /// Width of the counter.
    type Tick: Tick;

    /// Reads the counter.
    fn now() -> Self::Tick;
}

/// A period of time measured in milliseconds.
///
/// This plays a role similar to `core::time::Duration` but is designed to be
/// cheaper to use: since clocks count in milliseconds, a `Millis` can be
/// added to a tick count without any unit conversion.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct Millis(pub u64);

impl From<Millis> for u64 {
    fn from(x: Millis) -> Self {
        x.0
    }
}

impl From<u64> for Millis {
    fn from(x: u64) -> Self {
        Self(x)
    }
}

impl From<Duration> for Millis {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Observable state of a [`Timeout`] or [`PeriodicTimer`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerState {
    /// Never armed, or stopped since.
    Stopped,
    /// Waiting for the deadline.
    Armed,
    /// The deadline has passed.
    Expired,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Stopped,
    Armed,
    /// Expiry has been reported by `execute`.
    Fired,
}

/// A one-shot deadline on clock `C`.
///
/// A `Timeout` starts out stopped. [`arm`][Timeout::arm] sets a deadline
/// relative to now; once the clock reaches it, the timeout reads as expired
/// and stays that way until it's re-armed or stopped.
pub struct Timeout<C: Clock> {
    deadline: C::Tick,
    phase: Phase,
    _clock: PhantomData<fn() -> C>,
}

impl<C: Clock> Timeout<C> {
    /// Creates a stopped timeout.
    pub const fn new() -> Self {
        Self {
            deadline: <C::Tick as Tick>::ZERO,
            phase: Phase::Stopped,
            _clock: PhantomData,
        }
    }

    /// Creates a timeout already armed for `d` from now.
    pub fn started(d: impl Into<Millis>) -> Self {
        let mut t = Self::new();
        t.arm(d);
        t
    }

    /// Sets the deadline to `d` from now, replacing any previous deadline.
    ///
    /// # Panics
    ///
    /// If `d` is too long to compare correctly on this clock
    /// ([`Tick::MAX_SPAN`]).
    pub fn arm(&mut self, d: impl Into<Millis>) {
        let d = d.into().0;
        cheap_assert!(d <= <C::Tick as Tick>::MAX_SPAN);
        self.deadline = C::now().wrapping_add_ticks(d);
        self.phase = Phase::Armed;
    }

    /// Stops the timeout. It won't expire until armed again.
    pub fn stop(&mut self) {
        self.phase = Phase::Stopped;
    }

    /// Reads the current state, consulting the clock.
    pub fn state(&self) -> TimerState {
        match self.phase {
            Phase::Stopped => TimerState::Stopped,
            Phase::Fired => TimerState::Expired,
            Phase::Armed if self.remaining() <= 0 => TimerState::Expired,
            Phase::Armed => TimerState::Armed,
        }
    }

    /// Checks if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.state() == TimerState::Expired
    }

    /// Checks if the timeout is waiting for its deadline.
    pub fn is_armed(&self) -> bool {
        self.state() == TimerState::Armed
    }

    /// Checks if the timeout is stopped.
    pub fn is_stopped(&self) -> bool {
        self.phase == Phase::Stopped
    }

    /// Milliseconds until the deadline, negative once it's passed. Zero if
    /// stopped.
    pub fn remaining(&self) -> i64 {
        match self.phase {
            Phase::Stopped => 0,
            _ => self.deadline.signed_since(C::now()),
        }
    }

    /// Returns `true` exactly once per arming: on the first call that finds
    /// the deadline passed. Use this for "do X when the timeout fires" in code
    /// that polls the timeout more than once after it expires.
    pub fn execute(&mut self) -> bool {
        if self.phase == Phase::Armed && self.remaining() <= 0 {
            self.phase = Phase::Fired;
            true
        } else {
            false
        }
    }
}

impl<C: Clock> Default for Timeout<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> fmt::Debug for Timeout<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeout")
            .field("deadline", &self.deadline)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Helper for doing something periodically, accurately.
///
/// A `PeriodicTimer` fires every `period` milliseconds on a fixed grid
/// anchored at the time it was (re)started. Poll it with
/// [`execute`][PeriodicTimer::execute], which reports how many periods have
/// elapsed since the last time it reported any and moves the deadline to the
/// next grid point in the future.
///
/// This will maintain the interval consistently even if the caller is
/// sometimes late to poll: the next deadline is computed from the previous
/// deadline, not from the time of the poll, so lateness doesn't accumulate.
/// A caller that is more than a whole period late sees a count above 1 and
/// can decide whether to catch up or drop the missed periods.
pub struct PeriodicTimer<C: Clock> {
    period: u64,
    timeout: Timeout<C>,
}

impl<C: Clock> PeriodicTimer<C> {
    /// Creates a timer that first fires `period` from now.
    pub fn new(period: impl Into<Millis>) -> Self {
        let period = period.into();
        Self {
            period: period.0,
            timeout: Timeout::started(period),
        }
    }

    /// Changes the period and re-anchors the grid at now.
    pub fn restart(&mut self, period: impl Into<Millis>) {
        let period = period.into();
        self.period = period.0;
        self.timeout.arm(period);
    }

    /// Stops the timer. `execute` returns 0 until it's restarted.
    pub fn stop(&mut self) {
        self.timeout.stop();
    }

    /// The timer's period.
    pub fn period(&self) -> Millis {
        Millis(self.period)
    }

    /// Reads the current state, consulting the clock.
    pub fn state(&self) -> TimerState {
        self.timeout.state()
    }

    /// Milliseconds until the next period is due, negative if overdue. Zero
    /// if stopped.
    pub fn remaining(&self) -> i64 {
        self.timeout.remaining()
    }

    /// Returns the number of periods that have come due since the last call
    /// that returned nonzero, and re-arms for the next one.
    ///
    /// A period of zero is due on every call.
    pub fn execute(&mut self) -> u32 {
        if self.timeout.phase != Phase::Armed {
            return 0;
        }
        let late = -self.timeout.remaining();
        if late < 0 {
            return 0;
        }
        if self.period == 0 {
            return 1;
        }
        // `late` is at most MAX_SPAN, so the conversion and product fit.
        let n = late.unsigned_abs() / self.period + 1;
        self.timeout.deadline = self.timeout.deadline.wrapping_add_ticks(n * self.period);
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

impl<C: Clock> fmt::Debug for PeriodicTimer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTimer")
            .field("period", &self.period)
            .field("timeout", &self.timeout)
            .finish()
    }
}

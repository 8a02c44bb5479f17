// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stackless resumable functions for small embedded systems.
//!
//! This crate provides a way of writing code that *reads* sequentially ("wait
//! until the bus is idle, then send the command, then wait for the reply")
//! but is actually a state machine that gets re-entered from scratch every
//! time it's called. There is no heap, no per-task stack, and no OS thread:
//! the only thing that survives between calls is a small saved *resume point*
//! per function.
//!
//! # Design principles
//!
//! 1. Be compact. A resumable function costs one small enum of state, plus one
//!    slot per nesting level if it calls other resumable functions. Nothing is
//!    allocated, ever.
//!
//! 2. No magic. The resume point is an ordinary enum that you write, and the
//!    "jump back to where we left off" is an ordinary `match` at the top of
//!    your function. The one macro in the crate, [`labels!`], is shorthand for
//!    a trait impl you can write by hand.
//!
//! 3. Catch mistakes at compile time where we can. In particular, the maximum
//!    nesting depth of a family of resumable functions is a *type*, and calling
//!    one level too deep doesn't compile.
//!
//! 4. Be predictable. Scheduling is a plain superloop: every registered task
//!    is called once per pass, in a fixed order.
//!
//! # The pieces
//!
//! - [`unit`]: single-level resumable units (the classic "protothread"), with
//!   an explicit [`OneShot`][unit::OneShot] or [`Cyclic`][unit::Cyclic]
//!   completion policy.
//!
//! - [`nested`]: resumable functions that call other resumable functions,
//!   bounded by a compile-time depth from [`depth`].
//!
//! - [`bank`]: several independent single-level resumable functions sharing
//!   one object.
//!
//! - [`exec`]: the [`Task`][exec::Task] entry point contract, the
//!   [`Scheduler`][exec::Scheduler] superloop, and blocking wrappers.
//!
//! - [`time`]: a monotonic [`Clock`][time::Clock] contract plus
//!   [`Timeout`][time::Timeout] and [`PeriodicTimer`][time::PeriodicTimer],
//!   which is how a resumable function waits for time to pass.
//!
//! - [`util`]: adapters that let an `async` executor await resumable code.
//!
//! # A small example
//!
//! Here is a blinking LED that waits on a timeout between toggles. Every call
//! to `run` either returns `Running` from one of the wait points, or falls
//! through to the next point.
//!
//! ```ignore
//! #[derive(Copy, Clone)]
//! enum Blink { On, Off }
//!
//! struct Blinky {
//!     pt: Resumable<Blink, Cyclic>,
//!     timer: Timeout<SysTickClock>,
//!     led: Led,
//! }
//!
//! impl Task for Blinky {
//!     fn run(&mut self) -> Status {
//!         loop {
//!             match self.pt.resume() {
//!                 Resume::Start => {
//!                     self.led.set();
//!                     self.timer.arm(Millis(100));
//!                     self.pt.goto(Blink::On);
//!                 }
//!                 Resume::At(Blink::On) => {
//!                     if !self.timer.is_expired() {
//!                         return Status::Running;
//!                     }
//!                     self.led.reset();
//!                     self.timer.arm(Millis(200));
//!                     self.pt.goto(Blink::Off);
//!                 }
//!                 Resume::At(Blink::Off) => {
//!                     if !self.timer.is_expired() {
//!                         return Status::Running;
//!                     }
//!                     return self.pt.finish();
//!                 }
//!                 Resume::Done => return Status::Completed,
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! # Concurrency
//!
//! Everything here is single-threaded and cooperative. A resumable function
//! only gives up the CPU at the points where it returns; the code between two
//! such points runs to completion. Nothing in this crate is safe to call from
//! an interrupt handler, except the SysTick handler that the `systick` feature
//! installs for itself.
//!
//! # Cancellation
//!
//! There's no unwinding. To abandon a suspended chain, stop calling it, and
//! call `restart` on it before you use it again. Any half-finished hardware
//! transaction is the body's problem, not the mechanism's.

#![no_std]

#![warn(
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    missing_debug_implementations,
    missing_docs,
    semicolon_in_expressions_from_macros,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused_qualifications,
)]

#[cfg(test)]
extern crate std;

/// Internal assert macro that doesn't stringify its expression or generate any
/// fancy messages. This means failures must be diagnosed by file:line only, so,
/// don't use this more than once on the same line. In exchange, this makes
/// asserts significantly smaller in terms of text size.
macro_rules! cheap_assert {
    ($x:expr) => {
        if !$x { panic!(); };
    }
}
pub(crate) use cheap_assert;

pub mod depth;
#[macro_use]
pub mod nested;
pub mod bank;
pub mod exec;
pub mod time;
pub mod unit;
pub mod util;

#[cfg(test)]
mod testing;

pub use exec::{Scheduler, Task};
pub use nested::{Level, Stack, Step};
pub use unit::{Resumable, Resume, Status};

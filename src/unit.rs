// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-level resumable units.
//!
//! A [`Resumable`] is the smallest piece of the mechanism: one saved
//! suspension point, owned by whatever object embeds it. The object's `run`
//! function dispatches on [`Resumable::resume`] at the top, runs forward
//! through the body, and records where it stopped before returning.
//!
//! The suspension points themselves are an enum you define, one variant per
//! place the body can stop. The unit adds two states of its own around them:
//! *initial* (before the first call, reported as [`Resume::Start`]) and
//! *completed* (reported as [`Resume::Done`]).
//!
//! # Waiting
//!
//! "Wait until `P`" is written as an arm that checks `P` and returns
//! [`Status::Running`] if it doesn't hold yet. The check is made fresh on every
//! call; nothing blocks. Code *before* the wait lives in an earlier arm and is
//! not repeated.
//!
//! ```ignore
//! Resume::At(Point::WaitReady) => {
//!     if !self.spi.is_ready() {
//!         return Status::Running;
//!     }
//!     self.spi.send(CMD);
//!     self.pt.goto(Point::WaitReply);
//! }
//! ```
//!
//! # Completion policy
//!
//! Some bodies are one-shot ("program this flash page") and some are cyclic
//! ("sample the sensor, forever"). Rather than guess from the body which one
//! you meant, the policy is part of the unit's type:
//!
//! - [`OneShot`] (the default): after [`Resumable::finish`], the unit stays in
//!   its completed state, and every later `resume` reports [`Resume::Done`]
//!   until somebody calls [`Resumable::restart`].
//!
//! - [`Cyclic`]: `finish` still reports [`Status::Completed`] for that call,
//!   but the unit goes straight back to its initial state, so the next call
//!   starts the body from the top.

use core::marker::PhantomData;

/// Result of running a single-level unit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum Status {
    /// The unit stopped at a suspension point and wants to be called again.
    Running,
    /// The unit reached the end of its body.
    Completed,
}

impl Status {
    /// Checks if this is `Running`.
    pub fn is_running(self) -> bool {
        self == Status::Running
    }

    /// Checks if this is `Completed`.
    pub fn is_completed(self) -> bool {
        self == Status::Completed
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Completion policy of a [`Resumable`]. Implemented by [`OneShot`] and
/// [`Cyclic`] only.
pub trait Mode: sealed::Sealed {
    /// If `true`, finishing the body returns the unit to its initial state.
    const CYCLIC: bool;
}

/// Completion policy for bodies that run once per `restart`.
#[derive(Copy, Clone, Debug)]
pub enum OneShot {}

/// Completion policy for bodies that start over after they finish.
#[derive(Copy, Clone, Debug)]
pub enum Cyclic {}

impl sealed::Sealed for OneShot {}
impl sealed::Sealed for Cyclic {}

impl Mode for OneShot {
    const CYCLIC: bool = false;
}

impl Mode for Cyclic {
    const CYCLIC: bool = true;
}

/// Where the body should pick up, as reported by [`Resumable::resume`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Resume<P> {
    /// First call since creation or `restart`: begin at the top of the body.
    Start,
    /// Continue at this suspension point.
    At(P),
    /// A one-shot body has already finished.
    Done,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State<P> {
    Initial,
    At(P),
    Completed,
}

/// Saved state of a single-level resumable unit with suspension points `P`
/// and completion policy `M`.
///
/// This is meant to be embedded in the object that owns the body, typically a
/// driver, and lives as long as that object does. Only the body should call
/// the movement operations (`goto`, `suspend_at`, `finish`); outside code gets
/// `restart`, `stop`, and the status queries.
#[derive(Clone, Debug)]
pub struct Resumable<P, M: Mode = OneShot> {
    state: State<P>,
    _mode: PhantomData<M>,
}

impl<P: Copy, M: Mode> Resumable<P, M> {
    /// Creates a unit in its initial state.
    pub const fn new() -> Self {
        Self {
            state: State::Initial,
            _mode: PhantomData,
        }
    }

    /// Reports where the body should continue. Call this at the top of the
    /// body (usually inside a `loop`) and `match` on it.
    pub fn resume(&self) -> Resume<P> {
        match self.state {
            State::Initial => Resume::Start,
            State::At(p) => Resume::At(p),
            State::Completed => Resume::Done,
        }
    }

    /// Records `point` as the place to continue from. The body keeps
    /// executing; if it's written as a `loop` around `resume`, control falls
    /// straight through into `point`'s arm on this same call.
    pub fn goto(&mut self, point: P) {
        self.state = State::At(point);
    }

    /// Records `point` and gives up the CPU until the next call. This is an
    /// unconditional yield.
    pub fn suspend_at(&mut self, point: P) -> Status {
        self.goto(point);
        Status::Running
    }

    /// Ends the body and applies the completion policy. Returns
    /// [`Status::Completed`] so the body can `return self.pt.finish()`.
    pub fn finish(&mut self) -> Status {
        self.state = if M::CYCLIC {
            State::Initial
        } else {
            State::Completed
        };
        Status::Completed
    }

    /// Forces the unit back to its initial state. The next call begins at the
    /// top of the body.
    ///
    /// Anything the body accumulated since it last started must live on the
    /// owning object, and resetting it is the owner's job: this only resets
    /// the suspension point.
    pub fn restart(&mut self) {
        self.state = State::Initial;
    }

    /// Forces the unit into its completed state without running the rest of
    /// the body. A one-shot unit will report [`Resume::Done`] until restarted.
    pub fn stop(&mut self) {
        self.state = State::Completed;
    }

    /// Checks if the unit is suspended part way through its body.
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::At(_))
    }

    /// Checks if a one-shot unit has finished (or was stopped).
    pub fn is_completed(&self) -> bool {
        matches!(self.state, State::Completed)
    }

    /// Returns the saved suspension point, if the unit is suspended.
    ///
    /// This is for diagnostics. Bodies should use [`Resumable::resume`].
    pub fn point(&self) -> Option<P> {
        match self.state {
            State::At(p) => Some(p),
            _ => None,
        }
    }
}

impl<P: Copy, M: Mode> Default for Resumable<P, M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::exec::Task;
    use crate::testing;
    use crate::time::Timeout;

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum Point {
        WaitA,
        WaitB,
    }

    /// A straight-line body with two waits. Records which statements execute
    /// on each call.
    struct Traced<M: Mode> {
        pt: Resumable<Point, M>,
        a: bool,
        b: bool,
        trace: Vec<u8>,
    }

    impl<M: Mode> Traced<M> {
        fn new() -> Self {
            Self {
                pt: Resumable::new(),
                a: false,
                b: false,
                trace: Vec::new(),
            }
        }

        fn take_trace(&mut self) -> Vec<u8> {
            core::mem::take(&mut self.trace)
        }
    }

    impl<M: Mode> Task for Traced<M> {
        fn run(&mut self) -> Status {
            loop {
                match self.pt.resume() {
                    Resume::Start => {
                        self.trace.push(1);
                        self.pt.goto(Point::WaitA);
                    }
                    Resume::At(Point::WaitA) => {
                        if !self.a {
                            return Status::Running;
                        }
                        self.trace.push(2);
                        self.pt.goto(Point::WaitB);
                    }
                    Resume::At(Point::WaitB) => {
                        if !self.b {
                            return Status::Running;
                        }
                        self.trace.push(3);
                        return self.pt.finish();
                    }
                    Resume::Done => return Status::Completed,
                }
            }
        }
    }

    #[test]
    fn test_new_unit_is_initial() {
        let pt = Resumable::<Point>::new();
        assert_eq!(pt.resume(), Resume::Start);
        assert!(!pt.is_running());
        assert!(!pt.is_completed());
        assert_eq!(pt.point(), None);
    }

    #[test]
    fn test_resume_never_repeats_earlier_statements() {
        let mut t = Traced::<OneShot>::new();

        assert_eq!(t.run(), Status::Running);
        assert_eq!(t.take_trace(), [1]);
        assert_eq!(t.pt.point(), Some(Point::WaitA));

        // Polling a false predicate changes nothing.
        for _ in 0..5 {
            assert_eq!(t.run(), Status::Running);
            assert!(t.take_trace().is_empty());
        }

        t.a = true;
        assert_eq!(t.run(), Status::Running);
        assert_eq!(t.take_trace(), [2]);

        // Flipping `a` back doesn't matter any more: we're past it.
        t.a = false;
        assert_eq!(t.run(), Status::Running);
        assert!(t.take_trace().is_empty());

        t.b = true;
        assert_eq!(t.run(), Status::Completed);
        assert_eq!(t.take_trace(), [3]);
    }

    #[test]
    fn test_one_shot_completion_is_sticky() {
        let mut t = Traced::<OneShot>::new();
        t.a = true;
        t.b = true;

        assert_eq!(t.run(), Status::Completed);
        assert_eq!(t.take_trace(), [1, 2, 3]);
        assert!(t.pt.is_completed());

        for _ in 0..3 {
            assert_eq!(t.run(), Status::Completed);
            assert!(t.take_trace().is_empty());
        }

        t.pt.restart();
        assert_eq!(t.run(), Status::Completed);
        assert_eq!(t.take_trace(), [1, 2, 3]);
    }

    #[test]
    fn test_cyclic_completion_starts_over() {
        let mut t = Traced::<Cyclic>::new();
        t.a = true;

        assert_eq!(t.run(), Status::Running);
        assert_eq!(t.take_trace(), [1, 2]);

        t.b = true;
        assert_eq!(t.run(), Status::Completed);
        assert_eq!(t.take_trace(), [3]);
        assert!(!t.pt.is_completed());
        assert_eq!(t.pt.resume(), Resume::Start);

        // Next call is a fresh activation.
        assert_eq!(t.run(), Status::Completed);
        assert_eq!(t.take_trace(), [1, 2, 3]);
    }

    #[test]
    fn test_restart_mid_body() {
        let mut t = Traced::<OneShot>::new();
        t.a = true;
        assert_eq!(t.run(), Status::Running);
        assert_eq!(t.take_trace(), [1, 2]);
        assert!(t.pt.is_running());

        t.pt.restart();
        assert!(!t.pt.is_running());
        assert_eq!(t.run(), Status::Running);
        assert_eq!(t.take_trace(), [1, 2]);
    }

    #[test]
    fn test_stop_skips_rest_of_body() {
        let mut t = Traced::<OneShot>::new();
        assert_eq!(t.run(), Status::Running);
        t.take_trace();

        t.pt.stop();
        t.a = true;
        t.b = true;
        assert_eq!(t.run(), Status::Completed);
        assert!(t.take_trace().is_empty());
    }

    #[derive(Copy, Clone, Debug)]
    enum Yielding {
        Second,
        Third,
    }

    #[test]
    fn test_suspend_at_yields_once() {
        let mut pt = Resumable::<Yielding>::new();
        let mut steps = Vec::new();
        let run = |pt: &mut Resumable<Yielding>, steps: &mut Vec<u8>| match pt.resume() {
            Resume::Start => {
                steps.push(1);
                pt.suspend_at(Yielding::Second)
            }
            Resume::At(Yielding::Second) => {
                steps.push(2);
                pt.suspend_at(Yielding::Third)
            }
            Resume::At(Yielding::Third) => {
                steps.push(3);
                pt.finish()
            }
            Resume::Done => Status::Completed,
        };

        assert_eq!(run(&mut pt, &mut steps), Status::Running);
        assert_eq!(run(&mut pt, &mut steps), Status::Running);
        assert_eq!(run(&mut pt, &mut steps), Status::Completed);
        assert_eq!(steps, [1, 2, 3]);
    }

    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    enum Delay {
        Wait,
    }

    /// Arms a timeout on first arrival, then polls it.
    struct Delayed {
        pt: Resumable<Delay>,
        timeout: Timeout<testing::TestClock>,
        arms: usize,
    }

    impl Task for Delayed {
        fn run(&mut self) -> Status {
            loop {
                match self.pt.resume() {
                    Resume::Start => {
                        self.timeout.arm(crate::time::Millis(5));
                        self.arms += 1;
                        self.pt.goto(Delay::Wait);
                    }
                    Resume::At(Delay::Wait) => {
                        if !self.timeout.is_expired() {
                            return Status::Running;
                        }
                        return self.pt.finish();
                    }
                    Resume::Done => return Status::Completed,
                }
            }
        }
    }

    #[test]
    fn test_timeout_wait_advances_exactly_once() {
        testing::set_time(100);
        let mut d = Delayed {
            pt: Resumable::new(),
            timeout: Timeout::new(),
            arms: 0,
        };

        for t in 100..105 {
            testing::set_time(t);
            // Many polls within the same tick don't move anything either.
            for _ in 0..3 {
                assert_eq!(d.run(), Status::Running);
                assert_eq!(d.pt.point(), Some(Delay::Wait));
            }
        }
        assert_eq!(d.arms, 1);

        testing::set_time(105);
        assert_eq!(d.run(), Status::Completed);
        assert_eq!(d.arms, 1);
    }
}

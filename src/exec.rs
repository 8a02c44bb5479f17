// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The cooperative superloop, plus blocking wrappers.
//!
//! **Note:** for our purposes, a _task_ is a top-level resumable unit
//! registered with the superloop. There is a fixed set of tasks, provided at
//! startup; they're never created or destroyed at runtime.
//!
//! # Starting the superloop
//!
//! The mechanism for "starting the OS" is [`run_tasks`], which needs the
//! `cortex-m` feature. That's the right choice for most applications.
//! If you need code to run between passes instead of sleeping, or you're not
//! on a Cortex-M, see [`run_tasks_with_idle`]. Both of these are thin
//! wrappers around [`Scheduler`], which you can drive by hand (which is also
//! how you test things).
//!
//! # Passes
//!
//! A *pass* calls [`Task::run`] once on every started task. That's all the
//! policy there is. Tasks waiting on a hardware flag, a timeout, or a child
//! routine all look the same from out here: they return
//! [`Status::Running`] and get called again next pass.
//!
//! By default, tasks are called in registration order, every pass. With
//! [`Order::RoundRobin`], the first task called moves along by one each
//! pass, so no task is always first in line.
//!
//! Tasks can be left out of passes with a bit mask, in the same way `lilos`
//! picks which tasks are polled on the first pass: bit *i* of the mask
//! stands for task *i*. [`ALL_TASKS`] selects everything.
//!
//! # Blocking
//!
//! Sometimes, mostly during init, you just want the answer. [`run_blocking`]
//! and [`call_blocking`] spin on a unit or routine until it's done. They are
//! not scheduling primitives: nothing else runs while they spin.

use core::fmt;

use crate::cheap_assert;
use crate::nested::Step;
use crate::unit::Status;

/// A top-level resumable unit: something the superloop can call.
pub trait Task {
    /// Runs until the next suspension point, or the end.
    fn run(&mut self) -> Status;
}

impl<T: Task + ?Sized> Task for &mut T {
    fn run(&mut self) -> Status {
        (**self).run()
    }
}

/// Constant that can be passed to [`Scheduler::with_mask`] and
/// [`run_tasks`] to mean "all tasks."
pub const ALL_TASKS: usize = !0;

/// Order in which a pass visits tasks.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Order {
    /// Registration order, every pass.
    #[default]
    Fixed,
    /// Registration order, starting one task later each pass.
    RoundRobin,
}

/// What happened during one pass, as bit masks with bit *i* standing for
/// task *i*.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Pass {
    /// Tasks that returned [`Status::Running`].
    pub running: usize,
    /// Tasks that returned [`Status::Completed`].
    pub completed: usize,
    /// Tasks not called because they aren't started.
    pub skipped: usize,
}

/// A superloop over a fixed set of tasks.
pub struct Scheduler<'s, 't> {
    tasks: &'s mut [&'t mut dyn Task],
    order: Order,
    started: usize,
    /// Task that goes first next pass, under round-robin.
    next: usize,
    /// Tasks whose last call returned `Completed`.
    completed: usize,
}

/// Mask with a bit set for each of `n` tasks.
fn valid_mask(n: usize) -> usize {
    if n >= usize::BITS as usize {
        ALL_TASKS
    } else {
        (1 << n) - 1
    }
}

impl<'s, 't> Scheduler<'s, 't> {
    /// Creates a scheduler that calls every task in registration order.
    ///
    /// # Panics
    ///
    /// If there are more tasks than bits in a `usize`.
    pub fn new(tasks: &'s mut [&'t mut dyn Task]) -> Self {
        cheap_assert!(tasks.len() <= usize::BITS as usize);
        let started = valid_mask(tasks.len());
        Self {
            tasks,
            order: Order::Fixed,
            started,
            next: 0,
            completed: 0,
        }
    }

    /// Creates a scheduler that rotates which task goes first.
    pub fn round_robin(tasks: &'s mut [&'t mut dyn Task]) -> Self {
        let mut s = Self::new(tasks);
        s.order = Order::RoundRobin;
        s
    }

    /// Only tasks with their bit set in `mask` are started; the rest are
    /// skipped until [`start`][Scheduler::start]ed.
    pub fn with_mask(mut self, mask: usize) -> Self {
        self.started = mask & valid_mask(self.tasks.len());
        self
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Checks if there are no tasks at all.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Includes task `index` in future passes.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn start(&mut self, index: usize) {
        cheap_assert!(index < self.tasks.len());
        if self.started & (1 << index) == 0 {
            log::trace!("task {} started", index);
            self.started |= 1 << index;
        }
    }

    /// Leaves task `index` out of future passes. Its state is untouched, so
    /// if it's started again, it picks up where it left off.
    ///
    /// # Panics
    ///
    /// If `index` is out of range.
    pub fn park(&mut self, index: usize) {
        cheap_assert!(index < self.tasks.len());
        if self.started & (1 << index) != 0 {
            log::trace!("task {} parked", index);
            self.started &= !(1 << index);
        }
    }

    /// Checks if task `index` is included in passes.
    pub fn is_started(&self, index: usize) -> bool {
        index < self.tasks.len() && self.started & (1 << index) != 0
    }

    /// Calls every started task once.
    pub fn pass(&mut self) -> Pass {
        self.pass_masked(self.started)
    }

    fn pass_masked(&mut self, mask: usize) -> Pass {
        let n = self.tasks.len();
        let first = match self.order {
            Order::Fixed => 0,
            Order::RoundRobin => self.next,
        };
        let mut pass = Pass::default();
        for k in 0..n {
            let i = (first + k) % n;
            let bit = 1 << i;
            if mask & bit == 0 {
                pass.skipped |= bit;
                continue;
            }
            match self.tasks[i].run() {
                Status::Running => {
                    pass.running |= bit;
                    if self.completed & bit != 0 {
                        log::trace!("task {} restarted", i);
                        self.completed &= !bit;
                    }
                }
                Status::Completed => {
                    pass.completed |= bit;
                    if self.completed & bit == 0 {
                        log::trace!("task {} completed", i);
                        self.completed |= bit;
                    }
                }
            }
        }
        if n != 0 {
            self.next = (first + 1) % n;
        }
        pass
    }

    /// Runs `count` passes, returning what happened on the last one.
    pub fn run_passes(&mut self, count: usize) -> Pass {
        let mut last = Pass::default();
        for _ in 0..count {
            last = self.pass();
        }
        last
    }

    /// Runs passes until every started task has reported `Completed` once.
    /// A task that has completed isn't called again. Returns the number of
    /// passes.
    ///
    /// This never returns if some task never completes.
    pub fn run_until_complete(&mut self) -> usize {
        let mut pending = self.started;
        let mut passes = 0;
        while pending != 0 {
            let pass = self.pass_masked(pending);
            pending &= !pass.completed;
            passes += 1;
        }
        passes
    }

    /// Runs passes forever, calling `idle_hook` between them.
    pub fn run_with_idle(mut self, mut idle_hook: impl FnMut()) -> ! {
        loop {
            self.pass();
            idle_hook();
        }
    }
}

impl fmt::Debug for Scheduler<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.len())
            .field("order", &self.order)
            .field("started", &format_args!("{:#x}", self.started))
            .field("completed", &format_args!("{:#x}", self.completed))
            .finish()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "cortex-m")] {
        /// Runs the given tasks forever, in registration order, sleeping
        /// between passes.
        ///
        /// On the first pass only the tasks with a corresponding bit set in
        /// `initial_mask` are called; use [`ALL_TASKS`] to start them all.
        ///
        /// Between passes, we use the `WFI` instruction to idle the processor
        /// until an interrupt arrives. A resumable function polls its
        /// predicates, so something has to bring us back around: in practice
        /// that's the SysTick interrupt (see the `systick` feature) or the
        /// interrupts of the peripherals the tasks are waiting on. If you'd
        /// like to override this behavior, see [`run_tasks_with_idle`].
        pub fn run_tasks(
            tasks: &mut [&mut dyn Task],
            initial_mask: usize,
        ) -> ! {
            run_tasks_with_idle(tasks, initial_mask, || {
                cortex_m::asm::wfi();
                // This works around an undocumented erratum on STM32
                // processors when WFI is set to go to "Sleep" level and a
                // debug agent has set the DBGMCU bits to keep clocks running
                // during sleep. An ISB after the WFI appears to fix it.
                //
                // On non-STM32 Cortex processors this will cost a few cycles.
                #[cfg(target_arch = "arm")]
                cortex_m::asm::isb();
            })
        }
    }
}

/// Extended version of `run_tasks` that replaces the default idle behavior
/// (sleeping until the next interrupt) with code of your choosing.
///
/// If you would like the processor to sleep between passes, you will need to
/// call WFI yourself from within the implementation of `idle_hook`.
pub fn run_tasks_with_idle(
    tasks: &mut [&mut dyn Task],
    initial_mask: usize,
    idle_hook: impl FnMut(),
) -> ! {
    Scheduler::new(tasks)
        .with_mask(initial_mask)
        .run_with_idle(idle_hook)
}

/// Calls `task` until it reports `Completed`.
///
/// Don't use this on a task that's also registered with a scheduler; it
/// would get called from two places.
pub fn run_blocking<T: Task + ?Sized>(task: &mut T) {
    while task.run() == Status::Running {}
}

/// Calls `step` until it produces a value, and returns the value. `step`
/// is typically a closure that calls a nested routine at the top of its
/// stack:
///
/// ```ignore
/// let id = call_blocking(|| driver.read_id(driver.stack.top()));
/// ```
pub fn call_blocking<T>(mut step: impl FnMut() -> Step<T>) -> T {
    loop {
        if let Step::Finished(v) = step() {
            return v;
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;
    use std::vec::Vec;

    use super::*;

    /// Logs its id on every call. Completes on call `finish_on`, and keeps
    /// reporting `Completed` after that.
    struct Recorder<'a> {
        id: u8,
        calls: u32,
        finish_on: u32,
        log: &'a RefCell<Vec<u8>>,
    }

    impl<'a> Recorder<'a> {
        fn new(id: u8, finish_on: u32, log: &'a RefCell<Vec<u8>>) -> Self {
            Self {
                id,
                calls: 0,
                finish_on,
                log,
            }
        }
    }

    impl Task for Recorder<'_> {
        fn run(&mut self) -> Status {
            self.log.borrow_mut().push(self.id);
            self.calls += 1;
            if self.calls >= self.finish_on {
                Status::Completed
            } else {
                Status::Running
            }
        }
    }

    #[test]
    fn test_fixed_order_every_pass() {
        let log = RefCell::new(Vec::new());
        let mut a = Recorder::new(0, 100, &log);
        let mut b = Recorder::new(1, 100, &log);
        let mut c = Recorder::new(2, 100, &log);
        let mut tasks: [&mut dyn Task; 3] = [&mut a, &mut b, &mut c];
        let mut s = Scheduler::new(&mut tasks);

        let p = s.pass();
        assert_eq!(p.running, 0b111);
        assert_eq!(p.completed, 0);
        s.run_passes(2);
        assert_eq!(*log.borrow(), [0, 1, 2, 0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_round_robin_rotates() {
        let log = RefCell::new(Vec::new());
        let mut a = Recorder::new(0, 100, &log);
        let mut b = Recorder::new(1, 100, &log);
        let mut c = Recorder::new(2, 100, &log);
        let mut tasks: [&mut dyn Task; 3] = [&mut a, &mut b, &mut c];
        let mut s = Scheduler::round_robin(&mut tasks);

        s.run_passes(4);
        assert_eq!(
            *log.borrow(),
            [0, 1, 2, 1, 2, 0, 2, 0, 1, 0, 1, 2],
        );
    }

    #[test]
    fn test_mask_start_and_park() {
        let log = RefCell::new(Vec::new());
        let mut a = Recorder::new(0, 100, &log);
        let mut b = Recorder::new(1, 100, &log);
        let mut tasks: [&mut dyn Task; 2] = [&mut a, &mut b];
        let mut s = Scheduler::new(&mut tasks).with_mask(0b01);
        assert!(s.is_started(0));
        assert!(!s.is_started(1));
        assert!(!s.is_started(7));

        let p = s.pass();
        assert_eq!(p.skipped, 0b10);
        assert_eq!(*log.borrow(), [0]);

        s.start(1);
        s.park(0);
        let p = s.pass();
        assert_eq!(p.skipped, 0b01);
        assert_eq!(p.running, 0b10);
        assert_eq!(*log.borrow(), [0, 1]);
    }

    #[test]
    #[should_panic]
    fn test_start_out_of_range() {
        let mut tasks: [&mut dyn Task; 0] = [];
        let mut s = Scheduler::new(&mut tasks);
        s.start(0);
    }

    #[test]
    fn test_run_until_complete() {
        let log = RefCell::new(Vec::new());
        let mut a = Recorder::new(0, 1, &log);
        let mut b = Recorder::new(1, 3, &log);
        let passes;
        {
            let mut tasks: [&mut dyn Task; 2] = [&mut a, &mut b];
            let mut s = Scheduler::new(&mut tasks);
            passes = s.run_until_complete();
        }
        assert_eq!(passes, 3);
        // Task 0 isn't called again once it's done.
        assert_eq!(*log.borrow(), [0, 1, 1, 1]);
        assert_eq!(a.calls, 1);
        assert_eq!(b.calls, 3);
    }

    #[test]
    fn test_completed_tasks_keep_being_called() {
        let log = RefCell::new(Vec::new());
        let mut a = Recorder::new(0, 2, &log);
        let mut tasks: [&mut dyn Task; 1] = [&mut a];
        let mut s = Scheduler::new(&mut tasks);

        assert_eq!(s.pass().running, 1);
        assert_eq!(s.pass().completed, 1);
        assert_eq!(s.pass().completed, 1);
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn test_empty_scheduler() {
        let mut tasks: [&mut dyn Task; 0] = [];
        let mut s = Scheduler::new(&mut tasks);
        assert!(s.is_empty());
        assert_eq!(s.pass(), Pass::default());
        assert_eq!(s.run_until_complete(), 0);
    }

    #[test]
    fn test_run_blocking() {
        let log = RefCell::new(Vec::new());
        let mut a = Recorder::new(4, 5, &log);
        run_blocking(&mut a);
        assert_eq!(a.calls, 5);

        // Through the blanket impl for `&mut T`.
        let mut r = &mut a;
        run_blocking(&mut r);
        assert_eq!(a.calls, 6);
    }

    #[test]
    fn test_call_blocking() {
        let mut n = 0;
        let v = call_blocking(|| {
            n += 1;
            if n < 4 {
                Step::Suspended
            } else {
                Step::Finished(n * 10)
            }
        });
        assert_eq!(v, 40);
    }
}

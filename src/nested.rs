// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resumable routines that call other resumable routines.
//!
//! A single-level [`Resumable`][crate::unit::Resumable] can wait on a
//! predicate, but it can't wait on *another resumable function*, because the
//! other function needs somewhere to keep its own resume point while the
//! caller is suspended. A real call stack would do it, but we don't have one
//! to spare.
//!
//! Instead, an object that contains a family of routines that call each other
//! embeds a [`Stack`]: a fixed array of saved resume points, one per nesting
//! level. The routine running at level *k* keeps its resume point in slot
//! *k*, and when it calls a child, the child keeps its point in slot *k+1*.
//! The number of slots is a type ([`D1`][crate::depth::D1] through
//! [`D8`][crate::depth::D8]) chosen for the deepest chain the object can
//! reach.
//!
//! # Writing a routine
//!
//! A routine is a method that takes a [`Level`] token and returns a
//! [`Step`]. Its resume points are a [`Label`] enum, usually declared with
//! [`labels!`]. The first variant is where a fresh call begins.
//!
//! ```ignore
//! labels! {
//!     enum Read: 1 { Select, Wait }
//! }
//!
//! fn read<E: Depth>(&mut self, at: Level<E>) -> Step<u8> {
//!     loop {
//!         match self.stack.resume::<Read, _>(at) {
//!             Entry::Busy => return Step::Suspended,
//!             Entry::At(Read::Select) => {
//!                 self.bus.select();
//!                 self.stack.goto(at, Read::Wait);
//!             }
//!             Entry::At(Read::Wait) => {
//!                 if !self.bus.has_data() {
//!                     return Step::Suspended;
//!                 }
//!                 return self.stack.finish(at, self.bus.data());
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! Calling a child is one step: pass `at.child()`, and if the child hasn't
//! finished, report `Suspended` yourself. The parent's own resume point
//! doesn't move until the child produces a value, so none of the parent's
//! statements before or after the call re-run in the meantime.
//!
//! ```ignore
//! Entry::At(Setup::ReadId) => {
//!     let Some(id) = self.read(at.child()).finished() else {
//!         return Step::Suspended;
//!     };
//!     self.id = id;
//!     self.stack.goto(at, Setup::Configure);
//! }
//! ```
//!
//! `child()` only exists if there's a level left below the current one, so a
//! chain that's too deep for its stack is a compile error rather than a
//! stomped slot.
//!
//! # Completion
//!
//! [`Stack::finish`] frees the routine's level (and any deeper ones), so the
//! next call of the same routine is a fresh activation. This is the same
//! behavior as a [`Cyclic`][crate::unit::Cyclic] unit: a parent that calls a
//! child twice gets two complete runs of the child.
//!
//! # Sharing a level
//!
//! Each level holds at most one routine at a time. If a routine is entered at
//! a level some *other* routine of the same stack already occupies, `resume`
//! reports [`Entry::Busy`], and the convention is to return
//! `Step::Suspended` and try again next time. This makes two top-level
//! operations on the same driver take turns instead of corrupting each other.
//!
//! # Failures
//!
//! There's no error channel here. A routine that can fail says so in its
//! result type, e.g. `Step<Result<u16, BusError>>`.

use core::any::TypeId;
use core::fmt;
use core::marker::PhantomData;
use core::task::Poll;

use crate::cheap_assert;
use crate::depth::{Depth, Nest, Slot};
use crate::unit::Status;

/// Result of one call to a nested routine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum Step<T> {
    /// The routine (or something it called) stopped at a suspension point.
    Suspended,
    /// The routine ran to the end and produced a value.
    Finished(T),
}

impl<T> Step<T> {
    /// Converts to an `Option`, discarding the distinction between kinds of
    /// suspension (of which there is only one).
    pub fn finished(self) -> Option<T> {
        match self {
            Step::Suspended => None,
            Step::Finished(v) => Some(v),
        }
    }

    /// Checks if this is `Suspended`.
    pub fn is_suspended(&self) -> bool {
        matches!(self, Step::Suspended)
    }

    /// Checks if this is `Finished`.
    pub fn is_finished(&self) -> bool {
        matches!(self, Step::Finished(_))
    }

    /// Applies `f` to a finished value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Step::Suspended => Step::Suspended,
            Step::Finished(v) => Step::Finished(f(v)),
        }
    }
}

impl<T> From<Step<T>> for Poll<T> {
    fn from(s: Step<T>) -> Self {
        match s {
            Step::Suspended => Poll::Pending,
            Step::Finished(v) => Poll::Ready(v),
        }
    }
}

impl<T> From<Step<T>> for Status {
    fn from(s: Step<T>) -> Self {
        match s {
            Step::Suspended => Status::Running,
            Step::Finished(_) => Status::Completed,
        }
    }
}

/// Where a routine should pick up, as reported by [`Stack::resume`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Entry<P> {
    /// Continue at this point. A fresh activation starts at
    /// [`Label::ENTRY`].
    At(P),
    /// A different routine holds this level. Return `Step::Suspended` and
    /// retry on the next call.
    Busy,
}

/// Resume points of one routine.
///
/// A level remembers *whose* resume point it's holding by the label type, so
/// two routines can never mistake each other's points. `ROUTINE` is a small
/// number for log messages, and the slot index in a
/// [`Bank`][crate::bank::Bank]. The [`labels!`] macro writes this impl for
/// you.
pub trait Label: Copy + 'static {
    /// Number of the routine these labels belong to.
    const ROUTINE: u8;
    /// The point a fresh activation begins at.
    const ENTRY: Self;

    /// Encodes the point for storage in a slot.
    fn into_raw(self) -> u8;
    /// Decodes a stored point, returning `None` if `raw` isn't one of ours.
    fn from_raw(raw: u8) -> Option<Self>;
}

/// Declares an enum of resume points and implements [`Label`] for it.
///
/// ```
/// resumable::labels! {
///     /// Points in the page-program routine.
///     pub enum Program: 4 {
///         Unlock,
///         Write,
///         Verify,
///     }
/// }
///
/// use resumable::nested::Label;
/// assert_eq!(Program::ROUTINE, 4);
/// assert_eq!(Program::ENTRY, Program::Unlock);
/// assert_eq!(Program::from_raw(Program::Verify.into_raw()), Some(Program::Verify));
/// ```
///
/// The enum gets `Copy`, `Clone`, `Debug`, `Eq`, and `PartialEq` derived.
/// The first variant is the entry point.
#[macro_export]
macro_rules! labels {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $routine:literal {
            $first:ident $(, $rest:ident)* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        #[repr(u8)]
        $vis enum $name {
            $first,
            $($rest,)*
        }

        impl $crate::nested::Label for $name {
            const ROUTINE: u8 = $routine;
            const ENTRY: Self = $name::$first;

            fn into_raw(self) -> u8 {
                self as u8
            }

            fn from_raw(raw: u8) -> ::core::option::Option<Self> {
                const ALL: &[$name] = &[$name::$first $(, $name::$rest)*];
                ALL.get(usize::from(raw)).copied()
            }
        }
    };
}

/// Names the nesting level a routine is running at.
///
/// `D` counts the levels left *including this one*: the top of a
/// `Stack<D3>` is a `Level<D3>`, its child a `Level<D2>`, and a `Level<D1>`
/// can't call anything. This is a zero-sized token; pass it by value.
///
/// A token names a slot only by how many levels are left, and isn't tied to
/// the stack it came from. Used on a different stack, it picks that stack's
/// slot with the same number of levels left: the child of a `Stack<D3>`'s
/// top is a `Level<D2>`, which is slot 1 there but slot 0 on a `Stack<D2>`.
/// Only pass a routine tokens derived from its own stack's
/// [`top`][Stack::top]. The one mixup that is caught is a token with more
/// levels left than the stack has, which panics.
pub struct Level<D> {
    _depth: PhantomData<fn() -> D>,
}

impl<D> Copy for Level<D> {}

impl<D> Clone for Level<D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: Depth> fmt::Debug for Level<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Level(remaining={})", D::LEVELS)
    }
}

impl<D: Depth> Level<D> {
    const fn new() -> Self {
        Self { _depth: PhantomData }
    }

    /// Number of levels still available *below* this one.
    pub fn remaining(self) -> usize {
        D::LEVELS - 1
    }
}

impl<D: Nest> Level<D> {
    /// Token for a routine called from this level.
    pub fn child(self) -> Level<D::Inner> {
        Level::new()
    }
}

/// Saved resume points for a family of nested routines, one per level.
pub struct Stack<D: Depth> {
    slots: D::Slots,
}

impl<D: Depth> Stack<D> {
    /// Creates a stack with every level idle.
    pub const fn new() -> Self {
        Self { slots: D::IDLE }
    }

    /// Token for a routine called from outside the family, at level 0.
    pub fn top(&self) -> Level<D> {
        Level::new()
    }

    /// Maps a level token to a slot index, counting from the top.
    fn index<E: Depth>(_at: Level<E>) -> usize {
        // A token from a deeper stack would point above slot 0.
        cheap_assert!(E::LEVELS <= D::LEVELS);
        D::LEVELS - E::LEVELS
    }

    /// Reports where routine `P` should pick up at level `at`, claiming the
    /// level for `P` if it's idle.
    pub fn resume<P: Label, E: Depth>(&mut self, at: Level<E>) -> Entry<P> {
        let i = Self::index(at);
        let slot = &mut self.slots.as_mut()[i];
        match slot.holder() {
            None => {
                *slot = Slot::held(TypeId::of::<P>(), P::ROUTINE, P::ENTRY.into_raw());
                Entry::At(P::ENTRY)
            }
            Some(h) if h.kind == TypeId::of::<P>() => match P::from_raw(h.point) {
                Some(p) => Entry::At(p),
                // Only `goto` writes points, and it writes ours.
                None => panic!(),
            },
            Some(h) => {
                log::debug!(
                    "level {} held by routine {}, routine {} waits",
                    i,
                    h.routine,
                    P::ROUTINE,
                );
                Entry::Busy
            }
        }
    }

    /// Records `point` as the place routine `P` continues from, and keeps
    /// executing. `P` must have been given this level by `resume`.
    ///
    /// A routine that moves on is no longer waiting for whatever it called,
    /// so this also frees every level below `at`. A child it gave up on will
    /// start fresh if it's called again.
    pub fn goto<P: Label, E: Depth>(&mut self, at: Level<E>, point: P) {
        let i = Self::index(at);
        let slot = &mut self.slots.as_mut()[i];
        cheap_assert!(matches!(slot.holder(), Some(h) if h.kind == TypeId::of::<P>()));
        *slot = Slot::held(TypeId::of::<P>(), P::ROUTINE, point.into_raw());
        self.clear_from(i + 1);
    }

    /// Records `point` and gives up the CPU until the next call.
    pub fn suspend_at<P: Label, E: Depth, T>(
        &mut self,
        at: Level<E>,
        point: P,
    ) -> Step<T> {
        self.goto(at, point);
        Step::Suspended
    }

    /// Ends the routine at `at` with `value`, freeing its level and every
    /// level below it.
    pub fn finish<E: Depth, T>(&mut self, at: Level<E>, value: T) -> Step<T> {
        self.clear_from(Self::index(at));
        Step::Finished(value)
    }

    /// Abandons whatever is running at `at` and below. The next call at that
    /// level starts fresh. Levels above are not touched.
    pub fn stop<E: Depth>(&mut self, at: Level<E>) {
        self.clear_from(Self::index(at));
    }

    /// Frees every level. Don't call this from inside a routine on this
    /// stack.
    pub fn restart(&mut self) {
        self.clear_from(0);
    }

    fn clear_from(&mut self, i: usize) {
        for s in &mut self.slots.as_mut()[i..] {
            *s = Slot::IDLE;
        }
    }

    /// Checks if any routine is suspended on this stack.
    pub fn is_running(&self) -> bool {
        !self.slots.as_ref()[0].is_idle()
    }

    /// Checks if some routine holds level `at`.
    pub fn is_active<E: Depth>(&self, at: Level<E>) -> bool {
        !self.slots.as_ref()[Self::index(at)].is_idle()
    }

    /// Number of levels currently held, counting down from the top.
    pub fn depth(&self) -> usize {
        self.slots
            .as_ref()
            .iter()
            .take_while(|s| !s.is_idle())
            .count()
    }

    /// Number of levels this stack has room for.
    pub fn levels(&self) -> usize {
        D::LEVELS
    }
}

impl<D: Depth> Default for Stack<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Depth> fmt::Debug for Stack<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("depth", &self.depth())
            .field("slots", &self.slots.as_ref())
            .finish()
    }
}

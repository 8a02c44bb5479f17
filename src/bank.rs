// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Several independent resumable routines on one object.
//!
//! A [`Stack`][crate::nested::Stack] serializes the routines that share it:
//! only one can hold a given level. Sometimes that's wrong. A sensor driver
//! might want "take a sample" and "run the self-test LED" to proceed at the
//! same time, neither calling the other. A [`Bank`] gives each such routine
//! its own single-level slot, indexed by the routine's
//! [`Label::ROUTINE`] number, so they can be suspended independently.
//!
//! Routines in a bank don't nest; there's one level per slot. Each slot
//! remembers which label type claimed it, so two routines given the same
//! number by mistake panic instead of resuming each other's points. Routine
//! numbers must be less than the bank's size, which is checked at compile
//! time:
//!
//! ```compile_fail
//! resumable::labels! {
//!     enum Far: 4 { Only }
//! }
//!
//! let mut bank = resumable::bank::Bank::<2>::new();
//! let _ = bank.resume::<Far>();
//! ```

use core::any::TypeId;

use crate::cheap_assert;
use crate::nested::{Label, Step};

/// `N` independent resume points.
#[derive(Clone, Debug)]
pub struct Bank<const N: usize> {
    /// Label type of the holder, and its point.
    slots: [Option<(TypeId, u8)>; N],
}

impl<const N: usize> Bank<N> {
    /// Creates a bank with nothing running.
    pub const fn new() -> Self {
        Self { slots: [None; N] }
    }

    fn slot<P: Label>(&mut self) -> &mut Option<(TypeId, u8)> {
        const {
            assert!((P::ROUTINE as usize) < N);
        }
        &mut self.slots[P::ROUTINE as usize]
    }

    /// Reports where routine `P` should pick up. A routine that isn't
    /// running starts at [`Label::ENTRY`].
    ///
    /// # Panics
    ///
    /// If the slot is held by a different label type with the same
    /// `ROUTINE` number.
    pub fn resume<P: Label>(&mut self) -> P {
        let slot = self.slot::<P>();
        match *slot {
            None => {
                *slot = Some((TypeId::of::<P>(), P::ENTRY.into_raw()));
                P::ENTRY
            }
            Some((kind, raw)) => match P::from_raw(raw) {
                Some(p) if kind == TypeId::of::<P>() => p,
                // Either a routine number collision, or a point `goto`
                // didn't write.
                _ => panic!(),
            },
        }
    }

    /// Records `point` as the place routine `P` continues from, and keeps
    /// executing.
    pub fn goto<P: Label>(&mut self, point: P) {
        let slot = self.slot::<P>();
        cheap_assert!(slot.map_or(true, |(kind, _)| kind == TypeId::of::<P>()));
        *slot = Some((TypeId::of::<P>(), point.into_raw()));
    }

    /// Records `point` and gives up the CPU until the next call.
    pub fn suspend_at<P: Label, T>(&mut self, point: P) -> Step<T> {
        self.goto(point);
        Step::Suspended
    }

    /// Ends routine `P` with `value`. The next call starts it fresh.
    pub fn finish<P: Label, T>(&mut self, value: T) -> Step<T> {
        *self.slot::<P>() = None;
        Step::Finished(value)
    }

    /// Abandons routine `id`, if it's running.
    ///
    /// # Panics
    ///
    /// If `id` is out of range.
    pub fn stop(&mut self, id: u8) {
        self.slots[usize::from(id)] = None;
    }

    /// Abandons every routine.
    pub fn stop_all(&mut self) {
        self.slots = [None; N];
    }

    /// Checks if routine `id` is suspended.
    ///
    /// # Panics
    ///
    /// If `id` is out of range.
    pub fn is_running(&self, id: u8) -> bool {
        self.slots[usize::from(id)].is_some()
    }

    /// Checks if any routine is suspended.
    pub fn any_running(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }

    /// Checks if any of the routines in `ids` is suspended.
    pub fn any_running_of(&self, ids: &[u8]) -> bool {
        ids.iter().any(|&id| self.is_running(id))
    }

    /// Checks if every routine in `ids` is suspended.
    pub fn all_running_of(&self, ids: &[u8]) -> bool {
        ids.iter().all(|&id| self.is_running(id))
    }

    /// Checks that none of the routines in `ids` is still running. Use as
    /// the polled predicate when waiting for a set of routines to finish.
    pub fn joined(&self, ids: &[u8]) -> bool {
        !self.any_running_of(ids)
    }
}

impl<const N: usize> Default for Bank<N> {
    fn default() -> Self {
        Self::new()
    }
}

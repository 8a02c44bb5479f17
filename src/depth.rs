// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time nesting depths.
//!
//! A [`Stack`][crate::nested::Stack] is sized by one of the types `D1`
//! through `D8`, which say how many nested levels the stack has room for.
//! The same types are used on [`Level`][crate::nested::Level] tokens to say
//! how many levels are left *including the current one*. A routine holding a
//! `Level<D1>` is running at the deepest slot, and there's no `child()` to
//! call from there:
//!
//! ```compile_fail
//! use resumable::{depth::D1, Level};
//!
//! fn too_deep(at: Level<D1>) {
//!     let _ = at.child();
//! }
//! ```
//!
//! while one more level of room is fine:
//!
//! ```
//! use resumable::{depth::{D1, D2}, Level};
//!
//! fn fits(at: Level<D2>) -> Level<D1> {
//!     at.child()
//! }
//! ```
//!
//! Eight levels is more than any driver stack we've seen needs. If you need
//! more, you probably want to flatten your call tree.

use core::any::TypeId;
use core::fmt::Debug;

/// One saved resume point in a [`Stack`][crate::nested::Stack].
///
/// This is opaque on purpose; routines should only see their own labels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Slot(Option<Held>);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Held {
    /// Label type of the holder. Routine numbers are only for logs, since
    /// nothing stops two label types from sharing one.
    pub(crate) kind: TypeId,
    pub(crate) routine: u8,
    pub(crate) point: u8,
}

impl Slot {
    /// A slot not in use by any routine.
    pub const IDLE: Self = Slot(None);

    pub(crate) fn held(kind: TypeId, routine: u8, point: u8) -> Self {
        Slot(Some(Held { kind, routine, point }))
    }

    pub(crate) fn holder(self) -> Option<Held> {
        self.0
    }

    /// Checks if some routine currently holds this slot.
    pub fn is_idle(self) -> bool {
        self.0.is_none()
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A compile-time number of nesting levels. Implemented only by `D1`
/// through `D8`.
pub trait Depth: sealed::Sealed {
    /// Number of levels.
    const LEVELS: usize;
    /// Backing storage, one [`Slot`] per level.
    type Slots: AsRef<[Slot]> + AsMut<[Slot]> + Copy + Debug;
    /// Storage with every slot idle.
    const IDLE: Self::Slots;
}

/// A depth with room for at least one more level below.
pub trait Nest: Depth {
    /// The depth one level further in.
    type Inner: Depth;
}

macro_rules! depth {
    ($name:ident, $n:literal) => {
        #[doc = concat!("Depth of ", stringify!($n), ".")]
        #[derive(Copy, Clone, Debug)]
        pub enum $name {}

        impl sealed::Sealed for $name {}

        impl Depth for $name {
            const LEVELS: usize = $n;
            type Slots = [Slot; $n];
            const IDLE: Self::Slots = [Slot::IDLE; $n];
        }
    };
    ($name:ident, $n:literal, $inner:ident) => {
        depth!($name, $n);

        impl Nest for $name {
            type Inner = $inner;
        }
    };
}

depth!(D1, 1);
depth!(D2, 2, D1);
depth!(D3, 3, D2);
depth!(D4, 4, D3);
depth!(D5, 5, D4);
depth!(D6, 6, D5);
depth!(D7, 7, D6);
depth!(D8, 8, D7);

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_len<D: Depth>() -> usize {
        D::LEVELS
    }

    #[test]
    fn test_levels_count_down() {
        assert_eq!(chain_len::<D8>(), 8);
        assert_eq!(chain_len::<<D8 as Nest>::Inner>(), 7);
        assert_eq!(chain_len::<<<D3 as Nest>::Inner as Nest>::Inner>(), 1);
    }

    #[test]
    fn test_idle_storage() {
        let slots = D4::IDLE;
        assert_eq!(slots.as_ref().len(), 4);
        assert!(slots.iter().all(|s| s.is_idle()));
    }

    #[test]
    fn test_slot_holder() {
        let kind = TypeId::of::<u8>();
        let s = Slot::held(kind, 3, 1);
        assert!(!s.is_idle());
        assert_eq!(s.holder(), Some(Held { kind, routine: 3, point: 1 }));
        assert_eq!(Slot::IDLE.holder(), None);
    }
}

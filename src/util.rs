// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Adapters between resumable code and `async` code.
//!
//! Some applications run an async executor for most things and still have
//! drivers written as resumable functions, or the other way around. This
//! module lets async code `.await` resumable code.
//!
//! Resumable functions wait by polling, so there's no event that could wake
//! the future when the thing it's waiting for happens. Instead, the futures
//! here wake themselves every time they're pending, which asks the executor
//! to poll them again soon. On an executor that idles the CPU when nothing is
//! awake, that means the CPU won't idle while one of these is pending.
//!
//! Both futures implement [`FusedFuture`], and poll `Pending` forever if
//! polled again after resolving.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use futures::future::FusedFuture;

use crate::exec::Task;
use crate::nested::Step;
use crate::unit::Status;

/// Returns a future that calls `task` once per poll, and resolves when it
/// reports `Completed`.
pub fn drive<T: Task + ?Sized>(task: &mut T) -> Drive<'_, T> {
    Drive { task, done: false }
}

/// Future that runs a [`Task`] to completion (result of [`drive`]).
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Drive<'a, T: ?Sized> {
    task: &'a mut T,
    done: bool,
}

impl<T: Task + ?Sized> Future for Drive<'_, T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.done {
            return Poll::Pending;
        }
        match self.task.run() {
            Status::Running => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Status::Completed => {
                self.done = true;
                Poll::Ready(())
            }
        }
    }
}

impl<T: Task + ?Sized> FusedFuture for Drive<'_, T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T: ?Sized> fmt::Debug for Drive<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drive").field("done", &self.done).finish()
    }
}

/// Returns a future that calls `step` once per poll, and resolves to the
/// value it finishes with.
///
/// `step` is usually a closure that calls a nested routine at the top of its
/// stack:
///
/// ```ignore
/// let id = steps(|| driver.read_id(driver.stack.top())).await;
/// ```
pub fn steps<T, F>(step: F) -> Steps<F>
    where F: FnMut() -> Step<T> + Unpin,
{
    Steps { step: Some(step) }
}

/// Future that runs a nested routine until it finishes (result of
/// [`steps`]).
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Steps<F> {
    step: Option<F>,
}

impl<T, F> Future for Steps<F>
    where F: FnMut() -> Step<T> + Unpin,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let Some(step) = self.step.as_mut() else {
            return Poll::Pending;
        };
        match step() {
            Step::Suspended => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Step::Finished(v) => {
                // Drop the closure now, releasing whatever it borrowed.
                self.step = None;
                Poll::Ready(v)
            }
        }
    }
}

impl<T, F> FusedFuture for Steps<F>
    where F: FnMut() -> Step<T> + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.step.is_none()
    }
}

impl<F> fmt::Debug for Steps<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Steps")
            .field("done", &self.step.is_none())
            .finish()
    }
}

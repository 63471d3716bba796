// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Starting computations and waiting for their outcome.

mod builder;

use crate::driver::{Id, Join};
use crate::fault::Fault;
use crate::ply::Ply;
use alloc::sync::Arc;
use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use static_assertions::assert_impl_all;

pub use builder::Builder;

/// Runs the chain returned by `thunk` on a new driver and returns a handle to its outcome.
///
/// The first resumption happens right away on the calling thread, later ones on whatever thread
/// wakes the computation.
#[inline]
#[track_caller]
pub fn run<T, F>(thunk: F) -> PlyTask<T>
where
    T: Send + 'static,
    F: FnOnce() -> Ply<T> + Send + 'static,
{
    Builder::new().run(thunk)
}

/// Like [`run`], but for a chain that has been built already.
#[inline]
#[track_caller]
pub fn run_ply<T>(ply: Ply<T>) -> PlyTask<T>
where
    T: Send + 'static,
{
    Builder::new().run_ply(ply)
}

/// Like [`run`], but evaluates `thunk` on the spot and skips the driver entirely if the chain
/// completes synchronously.
///
/// Such computations do not get an [`Id`] or a `tracing` span.
#[inline]
#[track_caller]
pub fn run_unwrapped<T, F>(thunk: F) -> PlyTask<T>
where
    T: Send + 'static,
    F: FnOnce() -> Ply<T>,
{
    Builder::new().run_unwrapped(thunk)
}

/// A handle to the outcome of a computation started with [`run`], [`run_ply`] or
/// [`run_unwrapped`].
///
/// `PlyTask` is an ordinary [`Future`] that resolves to the value of the computation or the
/// [`Fault`] it settled with. Dropping it does not cancel the computation.
///
/// # Panics
///
/// Polling a `PlyTask` after it returned `Poll::Ready` panics.
#[must_use = "dropping a PlyTask discards the outcome of its computation"]
pub struct PlyTask<T>(Inner<T>);

enum Inner<T> {
    /// Settled without a driver, or already handed out when `None`.
    Ready(Option<Result<T, Fault>>),
    Driven(Arc<dyn Join<T>>),
}

assert_impl_all!(PlyTask<u32>: Send, Unpin);

// === impl PlyTask ===

impl<T> PlyTask<T> {
    pub(crate) fn ready(outcome: Result<T, Fault>) -> Self {
        Self(Inner::Ready(Some(outcome)))
    }

    pub(crate) fn driven(join: Arc<dyn Join<T>>) -> Self {
        Self(Inner::Driven(join))
    }

    /// Returns `true` once the computation has settled.
    pub fn is_finished(&self) -> bool {
        match &self.0 {
            Inner::Ready(_) => true,
            Inner::Driven(join) => join.is_finished(),
        }
    }

    /// The id of the driver running the computation, if it needed one.
    pub fn id(&self) -> Option<Id> {
        match &self.0 {
            Inner::Ready(_) => None,
            Inner::Driven(join) => Some(join.id()),
        }
    }
}

// the outcome is only ever moved out, never pinned in place
impl<T> Unpin for PlyTask<T> {}

impl<T> Future for PlyTask<T> {
    type Output = Result<T, Fault>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = match &mut self.0 {
            Inner::Ready(outcome) => outcome.take(),
            Inner::Driven(join) => Some(core::task::ready!(join.poll_join(cx))),
        };

        // drop our handle on the driver
        self.0 = Inner::Ready(None);

        match outcome {
            Some(outcome) => Poll::Ready(outcome),
            None => panic!("PlyTask polled after completion"),
        }
    }
}

impl<T> fmt::Debug for PlyTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlyTask")
            .field("id", &self.id())
            .field("finished", &self.is_finished())
            .finish()
    }
}

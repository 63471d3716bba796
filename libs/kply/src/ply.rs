// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::adapter::Frames;
use crate::fault::{Fault, catch};
use alloc::boxed::Box;
use core::any::type_name;
use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use static_assertions::{assert_eq_size, assert_impl_all};

/// A pending step of a [`Ply`] chain.
///
/// Awaitables are driven with a two-phase protocol: [`try_await`][Self::try_await] asks whether the
/// step needs to wait, [`advance`][Self::advance] then synchronously produces the next [`Ply`].
///
/// Every awaitable is exclusively owned by the one [`Ply`] that references it. `advance` consumes
/// the box, so an awaitable that still has work left after a step hands its own allocation back
/// as `Ply::pending(self)` instead of allocating a new one.
pub trait Awaitable<T>: Send {
    /// Checks whether the step can make progress right away.
    ///
    /// Returns `false` if the step is ready and [`advance`][Self::advance] may be called
    /// immediately. Returns `true` if the step registered `waker` with whatever it is waiting on,
    /// in which case the caller must unwind and wait to be woken.
    fn try_await(&mut self, waker: &Waker) -> bool;

    /// Produces the next [`Ply`] of the chain.
    ///
    /// Must only be called after [`try_await`][Self::try_await] returned `false` for the current
    /// step.
    ///
    /// # Errors
    ///
    /// Returns the [`Fault`] raised by the awaited operation or the continuation, or
    /// [`Fault::ProtocolViolation`] if the step was not ready.
    fn advance(self: Box<Self>) -> Result<Ply<T>, Fault>;

    /// Hands out the continuations of a step that awaits a nested chain, so that whoever awaits
    /// this step can run them from its own queue instead of nesting one more level deep.
    ///
    /// The step is left empty when this returns `Some`.
    #[doc(hidden)]
    fn take_frames(&mut self) -> Option<Frames>
    where
        T: Send + 'static,
    {
        None
    }
}

/// Either an immediately available value or a pending [`Awaitable`].
///
/// The completed case stores the value inline, so chains of synchronously completing steps are
/// passed around by value without ever touching the heap.
#[must_use = "plies do nothing unless driven by `run`, `run_ply` or `.await`"]
pub struct Ply<T>(pub(crate) Repr<T>);

pub(crate) enum Repr<T> {
    Completed(T),
    Pending(Box<dyn Awaitable<T>>),
}

assert_impl_all!(Ply<u32>: Send);
assert_eq_size!(Ply<()>, Box<dyn Awaitable<()>>);

// === impl Ply ===

impl<T> Ply<T> {
    /// Creates a ply that already holds its value.
    #[inline]
    pub const fn completed(value: T) -> Self {
        Self(Repr::Completed(value))
    }

    /// Creates a ply that still needs to drive `awaitable`.
    #[inline]
    pub fn pending(awaitable: Box<dyn Awaitable<T>>) -> Self {
        Self(Repr::Pending(awaitable))
    }

    /// Creates a pending ply that raises `fault` when it is advanced.
    pub fn faulted(fault: Fault) -> Self {
        Self::pending(Box::new(Faulted(Some(fault))))
    }

    /// Returns `true` if the ply holds its value.
    #[inline]
    pub fn is_completed_successfully(&self) -> bool {
        matches!(self.0, Repr::Completed(_))
    }

    /// Returns the value if the ply is completed, or the ply itself otherwise.
    ///
    /// # Errors
    ///
    /// Returns `self` unchanged if the ply is still pending.
    #[inline]
    pub fn into_completed(self) -> Result<T, Self> {
        match self.0 {
            Repr::Completed(value) => Ok(value),
            pending => Err(Self(pending)),
        }
    }

    /// Forces the chain to completion on the current stack.
    ///
    /// Pending steps are advanced in place for as long as they report readiness. This is only
    /// meant for chains that are known to drain synchronously, it never waits.
    ///
    /// # Errors
    ///
    /// Returns the [`Fault`] raised by any step of the chain, or [`Fault::ProtocolViolation`] if a
    /// step still needs to wait.
    pub fn result(self) -> Result<T, Fault> {
        let mut current = self;
        loop {
            match current.0 {
                Repr::Completed(value) => return Ok(value),
                Repr::Pending(mut awaitable) => {
                    if awaitable.try_await(Waker::noop()) {
                        tracing::warn!(
                            ply.output = type_name::<T>(),
                            "Ply::result called on a chain that needs to wait"
                        );
                        return Err(Fault::ProtocolViolation);
                    }
                    current = awaitable.advance()?;
                }
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Completed(value) => f.debug_tuple("Ply::Completed").field(value).finish(),
            Repr::Pending(_) => f.write_str("Ply::Pending"),
        }
    }
}

impl<T> IntoFuture for Ply<T> {
    type Output = Result<T, Fault>;
    type IntoFuture = PlyFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        PlyFuture {
            current: Some(self),
        }
    }
}

/// Raises its fault as soon as it is advanced.
struct Faulted(Option<Fault>);

impl<T> Awaitable<T> for Faulted {
    fn try_await(&mut self, _waker: &Waker) -> bool {
        false
    }

    fn advance(mut self: Box<Self>) -> Result<Ply<T>, Fault> {
        Err(self.0.take().unwrap_or(Fault::ProtocolViolation))
    }
}

/// Future returned by awaiting a [`Ply`].
///
/// Drives the chain from within the `poll` of whatever task awaits it, using the same two-phase
/// protocol as the driver behind [`run`][crate::run] but without allocating a driver of its own.
#[must_use = "futures do nothing unless `.await`ed or `poll`ed"]
pub struct PlyFuture<T> {
    current: Option<Ply<T>>,
}

// the chain is only ever moved around by value, never pinned in place
impl<T> Unpin for PlyFuture<T> {}

impl<T> Future for PlyFuture<T> {
    type Output = Result<T, Fault>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let current = &mut self.current;
        assert!(current.is_some(), "PlyFuture polled after completion");

        match catch(|| step(current, cx.waker())) {
            Ok(Some(value)) => Poll::Ready(Ok(value)),
            Ok(None) => Poll::Pending,
            Err(fault) => Poll::Ready(Err(fault)),
        }
    }
}

/// Steps the chain in `slot` until it either completes or needs to wait.
///
/// Returns `Ok(None)` after putting the waiting step back into `slot`. On completion and on fault
/// the slot is left empty.
pub(crate) fn step<T>(slot: &mut Option<Ply<T>>, waker: &Waker) -> Result<Option<T>, Fault> {
    let Some(mut current) = slot.take() else {
        return Ok(None);
    };

    loop {
        match current.0 {
            Repr::Completed(value) => return Ok(Some(value)),
            Repr::Pending(mut awaitable) => {
                if awaitable.try_await(waker) {
                    *slot = Some(Ply::pending(awaitable));
                    return Ok(None);
                }
                current = awaitable.advance()?;
            }
        }
    }
}

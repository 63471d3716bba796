// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::adapter::{Adapter, IntoAdapter, protocol_violation};
use crate::fault::Fault;
use core::task::Waker;

/// The shape every awaitable thing has, whether or not it implements [`Future`].
///
/// Anything that can tell whether it has completed, call back when it does, and hand out its
/// result can be bound through [`generic`].
pub trait Awaiter: Send + 'static {
    type Output;

    /// Returns `true` once the result is available.
    fn is_completed(&self) -> bool;

    /// Arranges for `waker` to be woken once the result is available.
    ///
    /// If the operation completes while or before this is called, `waker` must still be woken
    /// (or [`is_completed`][Self::is_completed] must already report completion).
    fn on_completed(&mut self, waker: &Waker);

    /// Takes the result. Only called after [`is_completed`][Self::is_completed] returned `true`.
    ///
    /// # Errors
    ///
    /// Returns the [`Fault`] the operation failed with.
    fn get_result(&mut self) -> Result<Self::Output, Fault>;
}

/// An [`Awaiter`] bound through the generic adapter.
///
/// Created by [`generic`].
#[must_use = "awaiters do nothing unless bound into a `Ply`"]
pub struct Generic<A>(A);

/// Binds any [`Awaiter`] that has no dedicated adapter.
pub fn generic<A: Awaiter>(awaiter: A) -> Generic<A> {
    Generic(awaiter)
}

/// Adapter for [`Generic`] awaiters.
///
/// The completion predicate is consulted before registering, so an awaiter that has already
/// completed never causes a suspension.
pub struct GenericAdapter<A>(A);

impl<A: Awaiter> IntoAdapter for Generic<A> {
    type Output = A::Output;
    type Adapter = GenericAdapter<A>;

    #[inline]
    fn into_adapter(self) -> Self::Adapter {
        GenericAdapter(self.0)
    }
}

impl<A: Awaiter> Adapter for GenericAdapter<A> {
    type Output = A::Output;

    #[inline]
    fn is_completed(&mut self) -> bool {
        self.0.is_completed()
    }

    fn try_await(&mut self, waker: &Waker) -> bool {
        if self.0.is_completed() {
            return false;
        }

        self.0.on_completed(waker);

        // the operation might have completed while we registered, in which case the waker fires
        // spuriously and the next readiness check will find nothing to do
        !self.0.is_completed()
    }

    fn advance(&mut self) -> Result<Option<Self::Output>, Fault> {
        if !self.0.is_completed() {
            return Err(protocol_violation::<Self>());
        }

        self.0.get_result().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Flag;

    #[test]
    fn completed_awaiter_never_suspends() {
        let flag = Flag::new();
        flag.set(Ok(1));

        let mut adapter = generic(flag).into_adapter();
        assert!(adapter.is_completed());
        assert!(!adapter.try_await(Waker::noop()));
        assert_eq!(adapter.advance().unwrap(), Some(1));
    }

    #[test]
    fn pending_awaiter_registers() {
        let flag = Flag::new();
        let mut adapter = generic(flag.clone()).into_adapter();

        assert!(!adapter.is_completed());
        assert!(matches!(adapter.advance(), Err(Fault::ProtocolViolation)));
        assert!(adapter.try_await(Waker::noop()));
        assert_eq!(flag.registrations(), 1);

        flag.set(Ok(2));
        assert!(!adapter.try_await(Waker::noop()));
        assert_eq!(adapter.advance().unwrap(), Some(2));
        assert_eq!(flag.registrations(), 1);
    }

    #[test]
    fn failing_result_accessor() {
        let flag = Flag::<u32>::new();
        flag.set(Err(Fault::ProtocolViolation));

        let mut adapter = generic(flag).into_adapter();
        assert!(!adapter.try_await(Waker::noop()));
        assert!(adapter.advance().is_err());
    }
}

// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The building blocks of [`Ply`] chains.
//!
//! These functions are the complete call surface a front-end (a macro, a code generator or just
//! hand written code) needs to express sequential asynchronous code: [`delay`], [`ret`], [`zero`],
//! [`bind`], [`return_from`], [`combine`], [`while_loop`], [`for_each`], [`try_with`] and
//! [`try_finally`].
//!
//! All of them take the synchronous fast path whenever the awaited thing is already complete, in
//! which case no memory is allocated and the scheduler is never involved.

mod looping;

use crate::adapter::{Adapter, Frames, IntoAdapter, protocol_violation};
use crate::fault::{Fault, catch};
use crate::ply::{Awaitable, Ply, Repr};
use alloc::boxed::Box;
use core::task::Waker;

pub use looping::{for_each, while_loop};

/// Defers the construction of a chain. This is the identity function.
#[inline]
pub fn delay<T, F>(thunk: F) -> F
where
    F: FnOnce() -> Ply<T>,
{
    thunk
}

/// A ply that is already completed with `value`.
#[inline]
pub const fn ret<T>(value: T) -> Ply<T> {
    Ply::completed(value)
}

/// A ply that is already completed with `()`.
#[inline]
pub const fn zero() -> Ply<()> {
    Ply::completed(())
}

/// Waits for `awaitable` and passes its output to `continuation`.
///
/// If `awaitable` has already completed, `continuation` is invoked right away and no memory is
/// allocated. Otherwise exactly one heap-allocated step is created that invokes `continuation`
/// once the awaited operation is fully complete.
pub fn bind<A, U, K>(awaitable: A, continuation: K) -> Ply<U>
where
    A: IntoAdapter,
    K: FnOnce(A::Output) -> Ply<U> + Send + 'static,
{
    let mut adapter = awaitable.into_adapter();

    if adapter.is_completed() {
        match adapter.advance() {
            Ok(Some(value)) => return continuation(value),
            // nested chain with more steps left, needs to be driven
            Ok(None) => {}
            Err(fault) => return Ply::faulted(fault),
        }
    }

    Ply::pending(Box::new(Bind {
        adapter,
        continuation: Some(continuation),
    }))
}

/// Waits for `awaitable` and completes with its output.
#[inline]
pub fn return_from<A>(awaitable: A) -> Ply<A::Output>
where
    A: IntoAdapter,
    A::Output: 'static,
{
    bind(awaitable, ret)
}

/// Runs `first` to completion, then continues with `continuation`.
///
/// If `first` is already complete, this is just `continuation()`.
#[inline]
pub fn combine<U, K>(first: Ply<()>, continuation: K) -> Ply<U>
where
    K: FnOnce() -> Ply<U> + Send + 'static,
{
    bind(first, move |()| continuation())
}

/// Runs `body`, handing any fault raised while building or driving its chain to `handler`.
///
/// With the `std` feature enabled this includes panics.
pub fn try_with<T, B, H>(body: B, handler: H) -> Ply<T>
where
    T: Send + 'static,
    B: FnOnce() -> Ply<T>,
    H: FnOnce(Fault) -> Ply<T> + Send + 'static,
{
    match catch(|| Ok(body())).map(|ply| ply.0) {
        Ok(Repr::Completed(value)) => Ply::completed(value),
        Ok(Repr::Pending(inner)) => Ply::pending(Box::new(TryWith {
            guarded: Guarded::new(inner),
            handler,
        })),
        Err(fault) => handler(fault),
    }
}

/// Runs `body`, then `finalizer` once `body`'s chain completed or faulted.
///
/// A fault raised by the chain is raised again after `finalizer` ran.
pub fn try_finally<T, B, F>(body: B, finalizer: F) -> Ply<T>
where
    T: Send + 'static,
    B: FnOnce() -> Ply<T>,
    F: FnOnce() + Send + 'static,
{
    match catch(|| Ok(body())).map(|ply| ply.0) {
        Ok(Repr::Completed(value)) => {
            finalizer();
            Ply::completed(value)
        }
        Ok(Repr::Pending(inner)) => Ply::pending(Box::new(TryFinally {
            guarded: Guarded::new(inner),
            finalizer,
        })),
        Err(fault) => {
            finalizer();
            Ply::faulted(fault)
        }
    }
}

/// The step created by [`bind`] when the awaited operation needs to be driven.
struct Bind<A, K> {
    adapter: A,
    /// Taken once the operation completed, or once the step was flattened into another chain.
    continuation: Option<K>,
}

impl<A, K, U> Awaitable<U> for Bind<A, K>
where
    A: Adapter,
    K: FnOnce(A::Output) -> Ply<U> + Send + 'static,
{
    #[inline]
    fn try_await(&mut self, waker: &Waker) -> bool {
        self.adapter.try_await(waker)
    }

    fn advance(mut self: Box<Self>) -> Result<Ply<U>, Fault> {
        match self.adapter.advance()? {
            Some(value) => match self.continuation.take() {
                Some(continuation) => Ok(continuation(value)),
                None => Err(protocol_violation::<Self>()),
            },
            None => Ok(Ply::pending(self)),
        }
    }

    fn take_frames(&mut self) -> Option<Frames>
    where
        U: Send + 'static,
    {
        let continuation = self.continuation.take()?;
        match self.adapter.into_frames::<U, K>(continuation) {
            Ok(frames) => Some(frames),
            Err(continuation) => {
                self.continuation = Some(continuation);
                None
            }
        }
    }
}

/// A pending chain whose faults are intercepted instead of propagated.
struct Guarded<T> {
    inner: Option<Box<dyn Awaitable<T>>>,
    /// A fault raised while checking readiness, reported on the next advance.
    caught: Option<Fault>,
}

enum Guard<T> {
    Completed(T),
    Pending,
    Faulted(Fault),
}

impl<T> Guarded<T> {
    fn new(inner: Box<dyn Awaitable<T>>) -> Self {
        Self {
            inner: Some(inner),
            caught: None,
        }
    }

    fn try_await(&mut self, waker: &Waker) -> bool {
        let Some(inner) = self.inner.as_mut() else {
            return false;
        };

        match catch(|| Ok(inner.try_await(waker))) {
            Ok(wait) => wait,
            Err(fault) => {
                self.caught = Some(fault);
                false
            }
        }
    }

    fn advance(&mut self) -> Guard<T> {
        if let Some(fault) = self.caught.take() {
            self.inner = None;
            return Guard::Faulted(fault);
        }

        let Some(inner) = self.inner.take() else {
            return Guard::Faulted(protocol_violation::<Self>());
        };

        match catch(|| inner.advance()).map(|ply| ply.0) {
            Ok(Repr::Completed(value)) => Guard::Completed(value),
            Ok(Repr::Pending(next)) => {
                self.inner = Some(next);
                Guard::Pending
            }
            Err(fault) => Guard::Faulted(fault),
        }
    }
}

struct TryWith<T, H> {
    guarded: Guarded<T>,
    handler: H,
}

impl<T, H> Awaitable<T> for TryWith<T, H>
where
    T: Send + 'static,
    H: FnOnce(Fault) -> Ply<T> + Send + 'static,
{
    #[inline]
    fn try_await(&mut self, waker: &Waker) -> bool {
        self.guarded.try_await(waker)
    }

    fn advance(mut self: Box<Self>) -> Result<Ply<T>, Fault> {
        match self.guarded.advance() {
            Guard::Completed(value) => Ok(Ply::completed(value)),
            Guard::Pending => Ok(Ply::pending(self)),
            Guard::Faulted(fault) => {
                tracing::trace!(%fault, "TryWith: handling fault");
                let TryWith { handler, .. } = *self;
                Ok(handler(fault))
            }
        }
    }
}

struct TryFinally<T, F> {
    guarded: Guarded<T>,
    finalizer: F,
}

impl<T, F> Awaitable<T> for TryFinally<T, F>
where
    T: Send + 'static,
    F: FnOnce() + Send + 'static,
{
    #[inline]
    fn try_await(&mut self, waker: &Waker) -> bool {
        self.guarded.try_await(waker)
    }

    fn advance(mut self: Box<Self>) -> Result<Ply<T>, Fault> {
        let res = match self.guarded.advance() {
            Guard::Pending => return Ok(Ply::pending(self)),
            Guard::Completed(value) => Ok(Ply::completed(value)),
            Guard::Faulted(fault) => Err(fault),
        };

        let TryFinally { finalizer, .. } = *self;
        finalizer();
        res
    }
}

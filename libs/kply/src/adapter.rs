// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Binding externally awaited operations into [`Ply`] chains.
//!
//! Every family of awaitable things gets its own [`Adapter`], selected through [`IntoAdapter`] from
//! the static type of the value passed to [`bind`][crate::combinator::bind]:
//!
//! | argument                                 | adapter              |
//! |------------------------------------------|----------------------|
//! | [`Ply<T>`]                               | [`PlyAdapter`]       |
//! | any `Future + Unpin + Send + 'static`    | [`FutureAdapter`]    |
//! | [`Fallible<F>`] (see [`fallible`])       | [`FallibleAdapter`]  |
//! | [`YieldNow`] (see [`yield_now`])         | [`YieldNow`]         |
//! | [`Generic<A>`] (see [`generic`])         | [`GenericAdapter`]   |
//!
//! `!Unpin` futures (like `async` blocks) can be bound after pinning them with `Box::pin`.

mod awaiter;
mod future;
mod nested;
mod yield_now;

use crate::fault::Fault;
use crate::ply::Ply;
use core::any::type_name;
use core::task::Waker;

pub use awaiter::{Awaiter, Generic, GenericAdapter, generic};
pub use future::{Fallible, FallibleAdapter, FutureAdapter, fallible};
pub(crate) use nested::Frames;
pub use nested::PlyAdapter;
pub use yield_now::{YieldNow, yield_now};

/// Drives one family of awaited operations on behalf of a [`Ply`] chain.
///
/// This mirrors [`Awaitable`][crate::Awaitable], except that adapters are owned by the combinator
/// that wraps them and report completion of the whole operation through
/// [`advance`][Adapter::advance].
pub trait Adapter: Send + 'static {
    /// The value produced by the awaited operation.
    type Output;

    /// Checks whether the operation has completed, without registering for a wakeup.
    ///
    /// This is what [`bind`][crate::combinator::bind] uses to take the synchronous fast path.
    fn is_completed(&mut self) -> bool;

    /// Returns `false` if the operation is ready to be advanced, or registers `waker` with it and
    /// returns `true` if the caller needs to wait.
    fn try_await(&mut self, waker: &Waker) -> bool;

    /// Advances the operation by one step after [`try_await`][Self::try_await] reported readiness.
    ///
    /// Returns `Ok(Some(output))` once the operation is fully complete and `Ok(None)` if more steps
    /// remain.
    ///
    /// # Errors
    ///
    /// Returns the [`Fault`] carried by the operation, or [`Fault::ProtocolViolation`] if the
    /// operation was not ready.
    fn advance(&mut self) -> Result<Option<Self::Output>, Fault>;

    /// Moves a nested chain and `continuation` into one flat queue of frames, handing
    /// `continuation` back if this adapter does not drive a nested chain.
    #[doc(hidden)]
    fn into_frames<U, K>(&mut self, continuation: K) -> Result<Frames, K>
    where
        Self: Sized,
        U: Send + 'static,
        K: FnOnce(Self::Output) -> Ply<U> + Send + 'static,
    {
        Err(continuation)
    }
}

/// Conversion into the [`Adapter`] for a family of awaitable things.
pub trait IntoAdapter {
    /// The value produced by the awaited operation.
    type Output;
    /// The adapter driving the operation.
    type Adapter: Adapter<Output = Self::Output>;

    fn into_adapter(self) -> Self::Adapter;
}

pub(crate) fn protocol_violation<A>() -> Fault {
    tracing::warn!(
        adapter = type_name::<A>(),
        "advanced before the operation reported readiness"
    );
    Fault::ProtocolViolation
}

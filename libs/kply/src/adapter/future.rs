// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::adapter::{Adapter, IntoAdapter, protocol_violation};
use crate::fault::Fault;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

/// Adapter for native [`Future`]s.
///
/// The future is polled whenever readiness is checked. Once it returns `Poll::Ready` it is dropped
/// right away and its output is kept until [`advance`][Adapter::advance] hands it out, so the
/// future is never polled after completion.
pub struct FutureAdapter<F: Future> {
    future: Option<F>,
    output: Option<F::Output>,
}

impl<F> IntoAdapter for F
where
    F: Future + Unpin + Send + 'static,
    F::Output: Send + 'static,
{
    type Output = F::Output;
    type Adapter = FutureAdapter<F>;

    #[inline]
    fn into_adapter(self) -> Self::Adapter {
        FutureAdapter {
            future: Some(self),
            output: None,
        }
    }
}

impl<F> Adapter for FutureAdapter<F>
where
    F: Future + Unpin + Send + 'static,
    F::Output: Send + 'static,
{
    type Output = F::Output;

    #[inline]
    fn is_completed(&mut self) -> bool {
        !self.try_await(Waker::noop())
    }

    fn try_await(&mut self, waker: &Waker) -> bool {
        if self.output.is_some() {
            return false;
        }

        let Some(future) = self.future.as_mut() else {
            // already handed out, `advance` will complain
            return false;
        };

        match Pin::new(future).poll(&mut Context::from_waker(waker)) {
            Poll::Ready(output) => {
                self.future = None;
                self.output = Some(output);
                false
            }
            Poll::Pending => true,
        }
    }

    fn advance(&mut self) -> Result<Option<Self::Output>, Fault> {
        match self.output.take() {
            Some(output) => Ok(Some(output)),
            None => Err(protocol_violation::<Self>()),
        }
    }
}

/// A future whose `Err` output is a fault of the computation rather than a value.
///
/// Created by [`fallible`].
#[must_use = "fallible futures do nothing unless bound into a `Ply`"]
pub struct Fallible<F>(F);

/// Binds `future` so that an `Err` output faults the surrounding computation.
///
/// The continuation only ever sees the `Ok` value.
pub fn fallible<F, T, E>(future: F) -> Fallible<F>
where
    F: Future<Output = Result<T, E>>,
{
    Fallible(future)
}

/// Adapter for [`Fallible`] futures.
pub struct FallibleAdapter<F: Future>(FutureAdapter<F>);

impl<F, T, E> IntoAdapter for Fallible<F>
where
    F: Future<Output = Result<T, E>> + Unpin + Send + 'static,
    T: Send + 'static,
    E: Into<Fault> + Send + 'static,
{
    type Output = T;
    type Adapter = FallibleAdapter<F>;

    #[inline]
    fn into_adapter(self) -> Self::Adapter {
        FallibleAdapter(self.0.into_adapter())
    }
}

impl<F, T, E> Adapter for FallibleAdapter<F>
where
    F: Future<Output = Result<T, E>> + Unpin + Send + 'static,
    T: Send + 'static,
    E: Into<Fault> + Send + 'static,
{
    type Output = T;

    #[inline]
    fn is_completed(&mut self) -> bool {
        self.0.is_completed()
    }

    #[inline]
    fn try_await(&mut self, waker: &Waker) -> bool {
        self.0.try_await(waker)
    }

    fn advance(&mut self) -> Result<Option<Self::Output>, Fault> {
        match self.0.advance()? {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }
}

// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Awaiting [`Ply`] chains from within other chains.
//!
//! Binding a pending chain to a continuation would naively nest one step inside the other, so
//! checking readiness of a chain built by folding `n` binds would take `n` stack frames. Instead,
//! the continuations of nested chains are lifted out into one flat queue of [`Frames`] owned by the
//! outermost [`PlyAdapter`]. Only the front frame ever holds a pending step, and the queue is
//! worked off one frame per advance.

use super::{Adapter, IntoAdapter, protocol_violation};
use crate::fault::Fault;
use crate::ply::{Ply, Repr};
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use core::any::Any;
use core::marker::PhantomData;
use core::mem;
use core::task::Waker;

/// The continuations of a flattened chain, in the order they run.
#[derive(Default)]
pub struct Frames(VecDeque<Box<dyn Continuation>>);

impl Frames {
    /// Puts `front` ahead of the frames already queued.
    fn prepend(&mut self, mut front: Frames) {
        if front.0.len() >= self.0.len() {
            front.0.append(&mut self.0);
            *self = front;
        } else {
            while let Some(frame) = front.0.pop_back() {
                self.0.push_front(frame);
            }
        }
    }
}

/// One continuation of a flattened chain with its input erased.
trait Continuation: Send {
    /// Checks readiness of the step this frame waits on.
    fn try_await(&mut self, waker: &Waker) -> bool;

    /// Steps the awaited chain. Once it completed, runs the continuation and moves the resulting
    /// chain into `next`, the input slot of whatever consumes it.
    ///
    /// Returns `true` once this frame is done.
    fn advance(&mut self, next: &mut dyn Any) -> Result<bool, Fault>;

    /// The slot the previous frame moves its resulting chain into.
    fn input(&mut self) -> &mut dyn Any;

    /// Lifts the frames out of a flattened chain this frame is waiting on.
    fn take_nested(&mut self) -> Option<Frames>;
}

struct Frame<S, U, K> {
    input: Option<Ply<S>>,
    continuation: Option<K>,
    _output: PhantomData<fn() -> U>,
}

impl<S, U, K> Continuation for Frame<S, U, K>
where
    S: Send + 'static,
    U: Send + 'static,
    K: FnOnce(S) -> Ply<U> + Send + 'static,
{
    fn try_await(&mut self, waker: &Waker) -> bool {
        match &mut self.input {
            Some(Ply(Repr::Pending(awaitable))) => awaitable.try_await(waker),
            _ => false,
        }
    }

    fn advance(&mut self, next: &mut dyn Any) -> Result<bool, Fault> {
        let value = match self.input.take().map(|ply| ply.0) {
            Some(Repr::Completed(value)) => value,
            Some(Repr::Pending(awaitable)) => match awaitable.advance()?.0 {
                Repr::Completed(value) => value,
                pending => {
                    self.input = Some(Ply(pending));
                    return Ok(false);
                }
            },
            None => return Err(protocol_violation::<Self>()),
        };

        let (Some(continuation), Some(slot)) = (
            self.continuation.take(),
            next.downcast_mut::<Option<Ply<U>>>(),
        ) else {
            return Err(protocol_violation::<Self>());
        };

        *slot = Some(continuation(value));
        Ok(true)
    }

    fn input(&mut self) -> &mut dyn Any {
        &mut self.input
    }

    fn take_nested(&mut self) -> Option<Frames> {
        let Some(Ply(Repr::Pending(awaitable))) = &mut self.input else {
            return None;
        };
        let nested = awaitable.take_frames()?;
        self.input = None;
        Some(nested)
    }
}

/// Adapter for nested [`Ply`] chains.
pub struct PlyAdapter<T> {
    /// Continuations still to run before the output is known.
    frames: Frames,
    /// The chain producing the output once `frames` is empty, or the slot the last frame moves its
    /// result into.
    current: Option<Ply<T>>,
}

impl<T: Send + 'static> PlyAdapter<T> {
    /// Lifts the frames of flattened chains at the front of the queue into the queue itself, so
    /// the front never waits on a chain of continuations.
    fn flatten(&mut self) {
        loop {
            let nested = match self.frames.0.front_mut() {
                Some(front) => front.take_nested(),
                None => {
                    let nested = match &mut self.current {
                        Some(Ply(Repr::Pending(awaitable))) => awaitable.take_frames(),
                        _ => None,
                    };
                    if nested.is_some() {
                        self.current = None;
                    }
                    nested
                }
            };

            let Some(nested) = nested else {
                return;
            };
            tracing::trace!(frames = nested.0.len(), "PlyAdapter: lifting nested frames");
            self.frames.prepend(nested);
        }
    }
}

impl<T: Send + 'static> IntoAdapter for Ply<T> {
    type Output = T;
    type Adapter = PlyAdapter<T>;

    #[inline]
    fn into_adapter(self) -> Self::Adapter {
        let mut adapter = PlyAdapter {
            frames: Frames::default(),
            current: Some(self),
        };
        adapter.flatten();
        adapter
    }
}

impl<T: Send + 'static> Adapter for PlyAdapter<T> {
    type Output = T;

    #[inline]
    fn is_completed(&mut self) -> bool {
        self.frames.0.is_empty()
            && self
                .current
                .as_ref()
                .is_some_and(Ply::is_completed_successfully)
    }

    fn try_await(&mut self, waker: &Waker) -> bool {
        match (self.frames.0.front_mut(), &mut self.current) {
            (Some(front), _) => front.try_await(waker),
            (None, Some(Ply(Repr::Pending(awaitable)))) => awaitable.try_await(waker),
            (None, _) => false,
        }
    }

    fn advance(&mut self) -> Result<Option<Self::Output>, Fault> {
        match self.frames.0.pop_front() {
            Some(mut front) => {
                let next: &mut dyn Any = match self.frames.0.front_mut() {
                    Some(next) => next.input(),
                    None => &mut self.current as &mut dyn Any,
                };
                if !front.advance(next)? {
                    self.frames.0.push_front(front);
                }
            }
            None => match self.current.take().map(|ply| ply.0) {
                Some(Repr::Completed(value)) => return Ok(Some(value)),
                Some(Repr::Pending(awaitable)) => self.current = Some(awaitable.advance()?),
                None => return Err(protocol_violation::<Self>()),
            },
        }

        self.flatten();
        if !self.frames.0.is_empty() {
            return Ok(None);
        }

        match self.current.take().map(|ply| ply.0) {
            Some(Repr::Completed(value)) => Ok(Some(value)),
            current => {
                self.current = current.map(Ply);
                Ok(None)
            }
        }
    }

    fn into_frames<U, K>(&mut self, continuation: K) -> Result<Frames, K>
    where
        U: Send + 'static,
        K: FnOnce(T) -> Ply<U> + Send + 'static,
    {
        let mut frames = mem::take(&mut self.frames);
        frames.0.push_back(Box::new(Frame {
            input: self.current.take(),
            continuation: Some(continuation),
            _output: PhantomData,
        }));
        Ok(frames)
    }
}

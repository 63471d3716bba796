// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::adapter::protocol_violation;
use crate::fault::Fault;
use crate::ply::{Awaitable, Ply, Repr};
use alloc::boxed::Box;
use core::task::Waker;

/// Runs `body` for as long as `condition` returns `true`.
///
/// Iterations that complete synchronously are run in a plain loop on the current stack. The first
/// iteration that needs to wait moves the loop into a single heap-allocated step, which is reused
/// for every later iteration that needs to wait. A loop therefore allocates at most once, no
/// matter how many iterations it runs or how often they wait.
pub fn while_loop<C, B>(condition: C, body: B) -> Ply<()>
where
    C: FnMut() -> bool + Send + 'static,
    B: FnMut() -> Ply<()> + Send + 'static,
{
    start(While { condition, body })
}

/// Runs `body` for every item of `iter`, with the same allocation behaviour as [`while_loop`].
pub fn for_each<I, B>(iter: I, body: B) -> Ply<()>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    B: FnMut(I::Item) -> Ply<()> + Send + 'static,
{
    start(ForEach {
        iter: iter.into_iter(),
        body,
    })
}

/// The part of a loop that is fixed at construction: how to produce the next iteration.
trait Iteration: Send + 'static {
    /// Returns the chain of the next iteration, or `None` once the loop is done.
    fn next_iteration(&mut self) -> Option<Ply<()>>;
}

struct While<C, B> {
    condition: C,
    body: B,
}

impl<C, B> Iteration for While<C, B>
where
    C: FnMut() -> bool + Send + 'static,
    B: FnMut() -> Ply<()> + Send + 'static,
{
    #[inline]
    fn next_iteration(&mut self) -> Option<Ply<()>> {
        (self.condition)().then(|| (self.body)())
    }
}

struct ForEach<I, B> {
    iter: I,
    body: B,
}

impl<I, B> Iteration for ForEach<I, B>
where
    I: Iterator + Send + 'static,
    B: FnMut(I::Item) -> Ply<()> + Send + 'static,
{
    #[inline]
    fn next_iteration(&mut self) -> Option<Ply<()>> {
        self.iter.next().map(&mut self.body)
    }
}

/// Runs iterations until one of them needs to wait, returning the step it waits on.
///
/// Returns `None` if the loop ran to completion.
fn run_until_pending<L: Iteration>(iteration: &mut L) -> Option<Box<dyn Awaitable<()>>> {
    while let Some(ply) = iteration.next_iteration() {
        if let Repr::Pending(target) = ply.0 {
            return Some(target);
        }
    }

    None
}

fn start<L: Iteration>(mut iteration: L) -> Ply<()> {
    match run_until_pending(&mut iteration) {
        None => Ply::completed(()),
        Some(target) => {
            tracing::trace!(
                loop.kind = core::any::type_name::<L>(),
                "loop iteration needs to wait, allocating reusable step"
            );
            Ply::pending(Box::new(Reusable {
                iteration,
                target: Some(target),
            }))
        }
    }
}

/// The single allocated step of a loop.
///
/// Holds the pending step of the current iteration. When that completes, the loop is repeated in
/// place and the step of the next waiting iteration is swapped in with [`reset`][Self::reset].
struct Reusable<L> {
    iteration: L,
    target: Option<Box<dyn Awaitable<()>>>,
}

impl<L: Iteration> Reusable<L> {
    fn reset(&mut self, target: Box<dyn Awaitable<()>>) {
        debug_assert!(self.target.is_none(), "reset while still waiting");
        self.target = Some(target);
    }

    fn repeat(mut self: Box<Self>) -> Ply<()> {
        match run_until_pending(&mut self.iteration) {
            None => Ply::completed(()),
            Some(target) => {
                self.reset(target);
                Ply::pending(self)
            }
        }
    }
}

impl<L: Iteration> Awaitable<()> for Reusable<L> {
    fn try_await(&mut self, waker: &Waker) -> bool {
        self.target
            .as_mut()
            .is_some_and(|target| target.try_await(waker))
    }

    fn advance(mut self: Box<Self>) -> Result<Ply<()>, Fault> {
        let Some(target) = self.target.take() else {
            return Err(protocol_violation::<Self>());
        };

        match target.advance()?.0 {
            // the current iteration has more steps
            Repr::Pending(next) => {
                self.reset(next);
                Ok(Ply::pending(self))
            }
            Repr::Completed(()) => Ok(self.repeat()),
        }
    }
}

// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The trampoline that drives a [`Ply`] chain to completion.
//!
//! A driver owns exactly one computation. Every resumption claims the driver, then alternates
//! between inspecting the current [`Ply`] and advancing its [`Awaitable`][crate::Awaitable] in a
//! plain loop, so the stack depth stays constant no matter how long the chain is. The resumption
//! ends once an awaitable needs to wait (the driver is suspended and its waker is stored with the
//! awaited operation) or once the chain has settled to a value or a [`Fault`].

mod id;
mod state;

use crate::fault::{Fault, catch};
use crate::ply::{self, Ply};
use crate::schedule::{Resume, Resumption, Schedule};
use alloc::sync::Arc;
use alloc::task::Wake;
use core::cell::UnsafeCell;
use core::sync::atomic::Ordering;
use core::task::{Context, Poll, Waker};
use futures::task::AtomicWaker;
use state::{EndRunAction, Snapshot, StartRunAction, State, WakeAction};

pub use id::Id;

/// The receiving end of a driver, held by a [`PlyTask`][crate::PlyTask].
pub(crate) trait Join<T>: Send + Sync {
    fn poll_join(&self, cx: &mut Context<'_>) -> Poll<Result<T, Fault>>;
    fn is_finished(&self) -> bool;
    fn id(&self) -> Id;
}

pub(crate) struct Driver<T, F, S> {
    state: State,
    id: Id,
    span: tracing::Span,
    scheduler: S,
    /// Only accessed while `RUNNING` is held.
    computation: UnsafeCell<Computation<T, F>>,
    /// Written once right before `COMPLETE` is published, taken once after `HAS_OUTPUT` is cleared.
    output: UnsafeCell<Option<Result<T, Fault>>>,
    join_waker: AtomicWaker,
}

struct Computation<T, F> {
    /// The deferred thunk, invoked by the first resumption.
    thunk: Option<F>,
    current: Option<Ply<T>>,
}

// Safety: the computation is only touched by the resumption that holds the `RUNNING` bit, and the
// output only by the `PlyTask` after it claimed `HAS_OUTPUT`. Both are moved between threads but
// never shared, which is why `Send` is all that is required of them.
unsafe impl<T: Send, F: Send, S: Sync> Sync for Driver<T, F, S> {}

// === impl Driver ===

impl<T, F, S> Driver<T, F, S>
where
    T: Send + 'static,
    F: FnOnce() -> Ply<T> + Send + 'static,
    S: Schedule,
{
    pub(crate) fn new(thunk: F, id: Id, span: tracing::Span, scheduler: S) -> Self {
        Self {
            state: State::new(),
            id,
            span,
            scheduler,
            computation: UnsafeCell::new(Computation {
                thunk: Some(thunk),
                current: None,
            }),
            output: UnsafeCell::new(None),
            join_waker: AtomicWaker::new(),
        }
    }

    /// Runs one resumption of the computation.
    ///
    /// Faults raised anywhere in the chain, including panics, settle the computation and never
    /// propagate out of this method.
    pub(crate) fn run(self: &Arc<Self>) {
        if self.state.start_run() == StartRunAction::DontRun {
            tracing::trace!(parent: &self.span, "already running or completed, not resuming");
            return;
        }

        let _entered = self.span.enter();
        tracing::trace!("resuming");

        let waker = Waker::from(self.clone());
        // Safety: we hold the `RUNNING` bit until `end_run` or `complete` below
        let computation = unsafe { &mut *self.computation.get() };

        loop {
            match catch(|| computation.step(&waker)) {
                Ok(None) => match self.state.end_run(S::INLINE) {
                    EndRunAction::Suspend => {
                        tracing::trace!("suspended");
                        return;
                    }
                    EndRunAction::Continue => {
                        tracing::trace!("woken while running, continuing");
                    }
                    EndRunAction::Reschedule => {
                        tracing::trace!("woken while running, rescheduling");
                        self.scheduler.schedule(Resumption::new(self.clone()));
                        return;
                    }
                },
                Ok(Some(value)) => {
                    tracing::debug!("completed");
                    self.complete(computation, Ok(value));
                    return;
                }
                Err(fault) => {
                    tracing::debug!(%fault, "faulted");
                    self.complete(computation, Err(fault));
                    return;
                }
            }
        }
    }

    fn complete(&self, computation: &mut Computation<T, F>, outcome: Result<T, Fault>) {
        // release whatever the chain still holds before publishing
        computation.thunk = None;
        computation.current = None;

        // Safety: we still hold `RUNNING` and `HAS_OUTPUT` is not set yet, so nobody else looks at
        // the output slot
        unsafe {
            *self.output.get() = Some(outcome);
        }
        self.state.complete();
        self.join_waker.wake();
    }
}

impl<T, F> Computation<T, F>
where
    F: FnOnce() -> Ply<T>,
{
    fn step(&mut self, waker: &Waker) -> Result<Option<T>, Fault> {
        if let Some(thunk) = self.thunk.take() {
            self.current = Some(thunk());
        }

        ply::step(&mut self.current, waker)
    }
}

impl<T, F, S> Wake for Driver<T, F, S>
where
    T: Send + 'static,
    F: FnOnce() -> Ply<T> + Send + 'static,
    S: Schedule,
{
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        match self.state.wake() {
            WakeAction::Schedule => {
                tracing::trace!(parent: &self.span, "woken, scheduling resumption");
                self.scheduler.schedule(Resumption::new(self.clone()));
            }
            WakeAction::None => {
                tracing::trace!(parent: &self.span, "woken, resumption already owed");
            }
        }
    }
}

impl<T, F, S> Resume for Driver<T, F, S>
where
    T: Send + 'static,
    F: FnOnce() -> Ply<T> + Send + 'static,
    S: Schedule,
{
    fn resume(self: Arc<Self>) {
        self.run();
    }

    fn id(&self) -> Id {
        self.id
    }
}

impl<T, F, S> Join<T> for Driver<T, F, S>
where
    T: Send + 'static,
    F: FnOnce() -> Ply<T> + Send + 'static,
    S: Schedule,
{
    fn poll_join(&self, cx: &mut Context<'_>) -> Poll<Result<T, Fault>> {
        let take = || {
            self.state.take_output().then(|| {
                // Safety: `take_output` returned `true` so the driver published the output and
                // will never touch the slot again, and no one else can claim it after us
                unsafe { (*self.output.get()).take() }
            })
        };

        if let Some(outcome) = take() {
            return Poll::Ready(outcome.unwrap_or(Err(Fault::ProtocolViolation)));
        }

        self.join_waker.register(cx.waker());

        // the computation might have completed while we registered
        match take() {
            Some(outcome) => Poll::Ready(outcome.unwrap_or(Err(Fault::ProtocolViolation))),
            None => Poll::Pending,
        }
    }

    fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire).get(Snapshot::COMPLETE)
    }

    fn id(&self) -> Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::{bind, ret};
    use crate::schedule::Inline;
    use crate::test_util::{CountingWaker, Gate};
    use core::sync::atomic::AtomicUsize;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::util::SubscriberInitExt;

    fn driver<T, F>(thunk: F) -> Arc<Driver<T, F, Inline>>
    where
        T: Send + 'static,
        F: FnOnce() -> Ply<T> + Send + 'static,
    {
        Arc::new(Driver::new(
            thunk,
            Id::next(),
            tracing::trace_span!("ply"),
            Inline,
        ))
    }

    #[test]
    fn thunk_runs_on_first_resumption() {
        let _trace = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .set_default();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let driver = driver(move || {
            calls2.fetch_add(1, Ordering::Relaxed);
            ret(1)
        });
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(!driver.is_finished());

        driver.run();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(driver.is_finished());

        // a completed driver ignores further resumptions
        driver.run();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn output_is_handed_out_once() {
        let driver = driver(|| ret("out"));
        driver.run();

        let (_, waker) = CountingWaker::new();
        let mut cx = Context::from_waker(&waker);
        assert!(matches!(driver.poll_join(&mut cx), Poll::Ready(Ok("out"))));
        assert!(driver.poll_join(&mut cx).is_pending());
    }

    #[test]
    fn join_waker_fires_on_completion() {
        let gate = Gate::new();
        let gate2 = gate.clone();
        let driver = driver(move || bind(gate2, |x: u32| ret(x)));
        driver.run();
        assert!(!driver.is_finished());

        let (counter, waker) = CountingWaker::new();
        let mut cx = Context::from_waker(&waker);
        assert!(driver.poll_join(&mut cx).is_pending());

        // the inline scheduler resumes the driver right inside `open`
        gate.open(3);
        assert!(driver.is_finished());
        assert_eq!(counter.wakes(), 1);
        assert!(matches!(driver.poll_join(&mut cx), Poll::Ready(Ok(3))));
    }

    #[test]
    fn panicking_thunk_faults() {
        let driver = driver(|| -> Ply<()> { panic!("thunk") });
        driver.run();
        assert!(driver.is_finished());

        let (_, waker) = CountingWaker::new();
        let Poll::Ready(Err(fault)) = driver.poll_join(&mut Context::from_waker(&waker)) else {
            panic!("expected the driver to fault");
        };
        assert_eq!(fault.panic_message(), Some("thunk"));
    }
}

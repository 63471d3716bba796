// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::adapter::Awaiter;
use crate::fault::Fault;
use crate::schedule::{Resumption, Schedule};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::task::Wake;
use core::fmt;
use core::pin::Pin;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::task::{Context, Poll, Waker};
use std::sync::Mutex;

/// A leaf operation that is completed by hand with [`Gate::open`].
pub(crate) struct Gate<T>(Arc<Mutex<GateState<T>>>);

struct GateState<T> {
    value: Option<T>,
    waker: Option<Waker>,
}

impl<T> Gate<T> {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(GateState {
            value: None,
            waker: None,
        })))
    }

    pub(crate) fn open(&self, value: T) {
        let waker = {
            let mut state = self.0.lock().unwrap();
            state.value = Some(value);
            state.waker.take()
        };

        // never wake while holding the lock, inline resumptions poll us right away
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub(crate) fn has_waker(&self) -> bool {
        self.0.lock().unwrap().waker.is_some()
    }
}

impl<T> Clone for Gate<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Future for Gate<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.0.lock().unwrap();
        match state.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// An [`Awaiter`] that is completed by hand with [`Flag::set`].
pub(crate) struct Flag<T>(Arc<Mutex<FlagState<T>>>);

struct FlagState<T> {
    result: Option<Result<T, Fault>>,
    waker: Option<Waker>,
    registrations: usize,
}

impl<T> Flag<T> {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(FlagState {
            result: None,
            waker: None,
            registrations: 0,
        })))
    }

    pub(crate) fn set(&self, result: Result<T, Fault>) {
        let waker = {
            let mut state = self.0.lock().unwrap();
            state.result = Some(result);
            state.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub(crate) fn registrations(&self) -> usize {
        self.0.lock().unwrap().registrations
    }
}

impl<T> Clone for Flag<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Send + 'static> Awaiter for Flag<T> {
    type Output = T;

    fn is_completed(&self) -> bool {
        self.0.lock().unwrap().result.is_some()
    }

    fn on_completed(&mut self, waker: &Waker) {
        let mut state = self.0.lock().unwrap();
        state.registrations += 1;
        state.waker = Some(waker.clone());
    }

    fn get_result(&mut self) -> Result<T, Fault> {
        self.0
            .lock()
            .unwrap()
            .result
            .take()
            .unwrap_or(Err(Fault::ProtocolViolation))
    }
}

/// A waker that counts how often it was woken.
pub(crate) struct CountingWaker {
    wakes: AtomicUsize,
}

impl CountingWaker {
    pub(crate) fn new() -> (Arc<Self>, Waker) {
        let this = Arc::new(Self {
            wakes: AtomicUsize::new(0),
        });
        (this.clone(), Waker::from(this))
    }

    pub(crate) fn wakes(&self) -> usize {
        self.wakes.load(Ordering::Acquire)
    }
}

impl Wake for CountingWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wakes.fetch_add(1, Ordering::Release);
    }
}

/// An error reported by a leaf operation.
#[derive(Debug)]
pub(crate) struct Broken;

impl fmt::Display for Broken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("broken")
    }
}

impl core::error::Error for Broken {}

impl From<Broken> for Fault {
    fn from(err: Broken) -> Self {
        Fault::external(err)
    }
}

/// A scheduler that queues resumptions until they are run with [`Queue::run_all`].
#[derive(Clone, Default)]
pub(crate) struct Queue(Arc<Mutex<VecDeque<Resumption>>>);

impl Queue {
    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Resumes queued computations in FIFO order until the queue is empty, returning how many
    /// resumptions ran.
    pub(crate) fn run_all(&self) -> usize {
        let mut ran = 0;
        loop {
            let Some(resumption) = self.0.lock().unwrap().pop_front() else {
                return ran;
            };
            tracing::trace!(?resumption, "running queued resumption");
            resumption.resume();
            ran += 1;
        }
    }
}

impl Schedule for Queue {
    fn schedule(&self, resumption: Resumption) {
        self.0.lock().unwrap().push_back(resumption);
    }
}

/// An inline scheduler that counts how often it was asked to resume something.
#[derive(Clone, Default)]
pub(crate) struct Counting(Arc<AtomicUsize>);

impl Counting {
    pub(crate) fn scheduled(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

impl Schedule for Counting {
    const INLINE: bool = true;

    fn schedule(&self, resumption: Resumption) {
        self.0.fetch_add(1, Ordering::Release);
        resumption.resume();
    }
}

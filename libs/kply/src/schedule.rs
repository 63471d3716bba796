// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The seam between drivers and the host's scheduler.
//!
//! Whenever a suspended computation is woken, its driver hands a [`Resumption`] to the
//! [`Schedule`] it was started with. The scheduler decides on which thread and when that
//! resumption runs. By default computations are resumed [`Inline`], right on the waking thread.

use crate::driver::Id;
use alloc::sync::Arc;
use core::fmt;

/// A host scheduler that resumes suspended computations.
///
/// Any `Fn(Resumption) + Clone + Send + Sync + 'static` closure is a scheduler too.
pub trait Schedule: Clone + Send + Sync + 'static {
    /// Whether this scheduler resumes on the waking thread.
    ///
    /// A computation that is woken while it is running (as [`yield_now`] does) keeps running right
    /// away on inline schedulers. All other schedulers get the resumption handed back through
    /// [`schedule`][Self::schedule], which gives them the chance to run something else first.
    ///
    /// [`yield_now`]: crate::adapter::yield_now
    const INLINE: bool = false;

    /// Arranges for `resumption` to be resumed, now or later, on any thread.
    fn schedule(&self, resumption: Resumption);
}

/// Resumes computations immediately on the thread that woke them.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl Schedule for Inline {
    const INLINE: bool = true;

    #[inline]
    fn schedule(&self, resumption: Resumption) {
        resumption.resume();
    }
}

impl<F> Schedule for F
where
    F: Fn(Resumption) + Clone + Send + Sync + 'static,
{
    #[inline]
    fn schedule(&self, resumption: Resumption) {
        self(resumption);
    }
}

/// A handle to a suspended computation, passed to [`Schedule::schedule`].
///
/// Dropping a resumption without resuming it leaves the computation suspended forever.
#[must_use = "a suspended computation only makes progress once its resumption is resumed"]
pub struct Resumption(Arc<dyn Resume>);

pub(crate) trait Resume: Send + Sync {
    fn resume(self: Arc<Self>);
    fn id(&self) -> Id;
}

impl Resumption {
    pub(crate) fn new(target: Arc<dyn Resume>) -> Self {
        Self(target)
    }

    /// Runs the computation until it completes or needs to wait again.
    pub fn resume(self) {
        self.0.resume();
    }

    /// The id of the computation this resumes.
    pub fn id(&self) -> Id {
        self.0.id()
    }
}

impl fmt::Debug for Resumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resumption").field(&self.id()).finish()
    }
}

// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::driver::{Driver, Id};
use crate::fault::catch;
use crate::ply::{Ply, Repr};
use crate::schedule::{Inline, Schedule};
use crate::task::PlyTask;
use alloc::sync::Arc;
use core::any::type_name;
use core::panic::Location;

/// Configures how computations are started.
///
/// ```
/// use kply::Builder;
/// use kply::combinator::ret;
/// use futures::FutureExt;
///
/// let task = Builder::new().name("answer").run(|| ret(42));
/// assert_eq!(task.now_or_never().unwrap().unwrap(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct Builder<'a, S = Inline> {
    location: Option<Location<'a>>,
    name: Option<&'a str>,
    scheduler: S,
}

impl Builder<'_, Inline> {
    /// Creates a builder that resumes computations [`Inline`].
    pub const fn new() -> Self {
        Self {
            location: None,
            name: None,
            scheduler: Inline,
        }
    }
}

impl Default for Builder<'_, Inline> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, S> Builder<'a, S>
where
    S: Schedule,
{
    /// Override the scheduler suspended computations are handed to when they are woken.
    ///
    /// By default, computations are resumed [`Inline`] on the waking thread.
    pub fn with_scheduler<S2: Schedule>(self, scheduler: S2) -> Builder<'a, S2> {
        Builder {
            location: self.location,
            name: self.name,
            scheduler,
        }
    }

    /// Override the name of computations started by this builder.
    ///
    /// By default, computations are unnamed.
    pub fn name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Override the source code location that will be associated with computations started by this
    /// builder.
    ///
    /// By default, computations inherit the source code location of where they have been started.
    pub fn location(mut self, location: Location<'a>) -> Self {
        self.location = Some(location);
        self
    }

    #[inline]
    #[track_caller]
    fn build<T, F>(&self, thunk: F) -> Arc<Driver<T, F, S>>
    where
        T: Send + 'static,
        F: FnOnce() -> Ply<T> + Send + 'static,
    {
        let id = Id::next();

        let loc = self.location.as_ref().unwrap_or(Location::caller());
        let span = tracing::trace_span!(
            "ply",
            ply.id = id.as_u64(),
            ply.name = ?self.name,
            ply.output = %type_name::<T>(),
            loc.file = loc.file(),
            loc.line = loc.line(),
            loc.col = loc.column(),
        );

        Arc::new(Driver::new(thunk, id, span, self.scheduler.clone()))
    }

    /// Runs the chain returned by `thunk` on a new driver.
    ///
    /// The thunk is invoked by the first resumption, which happens right away on the calling
    /// thread.
    #[track_caller]
    pub fn run<T, F>(&self, thunk: F) -> PlyTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Ply<T> + Send + 'static,
    {
        let driver = self.build(thunk);
        driver.run();
        PlyTask::driven(driver)
    }

    /// Runs an already built chain on a new driver.
    #[inline]
    #[track_caller]
    pub fn run_ply<T>(&self, ply: Ply<T>) -> PlyTask<T>
    where
        T: Send + 'static,
    {
        self.run(move || ply)
    }

    /// Evaluates `thunk` right away and only allocates a driver if its chain needs to wait.
    ///
    /// A panic inside `thunk` settles the returned task with a fault as well.
    #[track_caller]
    pub fn run_unwrapped<T, F>(&self, thunk: F) -> PlyTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Ply<T>,
    {
        match catch(|| Ok(thunk())) {
            Ok(Ply(Repr::Completed(value))) => PlyTask::ready(Ok(value)),
            Ok(pending) => self.run_ply(pending),
            Err(fault) => {
                tracing::debug!(%fault, "faulted before reaching a driver");
                PlyTask::ready(Err(fault))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::ret;
    use futures::FutureExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::util::SubscriberInitExt;

    #[test]
    fn builder_is_reusable() {
        let _trace = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .set_default();

        let builder = Builder::new()
            .name("reused")
            .location(*Location::caller());
        let a = builder.run(|| ret(1));
        let b = builder.run(|| ret(2));

        assert_ne!(a.id(), b.id());
        assert_eq!(a.now_or_never().unwrap().unwrap(), 1);
        assert_eq!(b.now_or_never().unwrap().unwrap(), 2);
    }

    #[test]
    fn closure_scheduler() {
        let builder = Builder::default().with_scheduler(|resumption: crate::schedule::Resumption| {
            resumption.resume();
        });
        let task = builder.run(|| ret("closure"));
        assert_eq!(task.now_or_never().unwrap().unwrap(), "closure");
    }
}

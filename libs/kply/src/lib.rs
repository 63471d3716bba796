// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Allocation-free sequencing of asynchronous steps.
//!
//! A [`Ply`] is either a value that is already there or a boxed [`Awaitable`] that still has work
//! to do. Chains of plies are built with the combinators in [`combinator`] and handed to one of the
//! entry points ([`run`], [`run_ply`], [`run_unwrapped`]) which drive them with a trampoline and
//! hand back a [`PlyTask`], an ordinary [`Future`] that any executor can poll.
//!
//! Steps that complete synchronously never allocate and never go through the scheduler, only
//! operations that genuinely need to wait pay for a heap-allocated continuation.
//!
//! ```
//! use kply::combinator::{bind, ret};
//! use futures::FutureExt;
//!
//! let task = kply::run(|| bind(ret(1), |x| ret(x + 1)));
//! assert_eq!(task.now_or_never().unwrap().unwrap(), 2);
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
extern crate alloc;

pub mod adapter;
pub mod combinator;
mod driver;
mod fault;
mod ply;
pub mod schedule;
pub mod task;
#[cfg(test)]
mod test_util;

pub use driver::Id;
pub use fault::Fault;
pub use ply::{Awaitable, Ply, PlyFuture};
pub use task::{Builder, PlyTask, run, run_ply, run_unwrapped};

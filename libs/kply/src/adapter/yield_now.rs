// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::adapter::{Adapter, IntoAdapter, protocol_violation};
use crate::fault::Fault;
use core::task::Waker;

/// Yields execution back to the scheduler once.
///
/// Binding the returned value suspends the computation exactly once, the continuation runs after
/// the scheduler resumed it.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// A yield point, created by [`yield_now`]. Acts as its own adapter.
#[derive(Debug)]
#[must_use = "yield points do nothing unless bound into a `Ply`"]
pub struct YieldNow {
    yielded: bool,
}

impl IntoAdapter for YieldNow {
    type Output = ();
    type Adapter = Self;

    #[inline]
    fn into_adapter(self) -> Self::Adapter {
        self
    }
}

impl Adapter for YieldNow {
    type Output = ();

    #[inline]
    fn is_completed(&mut self) -> bool {
        self.yielded
    }

    fn try_await(&mut self, waker: &Waker) -> bool {
        if self.yielded {
            return false;
        }

        self.yielded = true;

        // Yielding works by immediately waking ourselves, which hands the resumption straight
        // back to the scheduler, and then reporting that we need to wait.
        waker.wake_by_ref();
        true
    }

    fn advance(&mut self) -> Result<Option<Self::Output>, Fault> {
        if self.yielded {
            Ok(Some(()))
        } else {
            Err(protocol_violation::<Self>())
        }
    }
}

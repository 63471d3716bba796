// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::boxed::Box;
use core::any::Any;
use core::error::Error;
use core::fmt;

/// The reason a computation did not produce a value.
///
/// A [`PlyTask`][crate::PlyTask] settles to exactly one of its value or a `Fault`, no matter how
/// many steps the chain went through before it failed.
pub enum Fault {
    /// [`Awaitable::advance`][crate::Awaitable::advance] was called before
    /// [`Awaitable::try_await`][crate::Awaitable::try_await] reported readiness.
    ProtocolViolation,
    /// A continuation, result accessor or adapter step panicked.
    ///
    /// Panics are only captured when the `std` feature is enabled, without it they unwind through
    /// (or abort) the resumption like in any other `no_std` executor.
    Panic(Box<dyn Any + Send + 'static>),
    /// The awaited operation itself failed.
    External(Box<dyn Error + Send + Sync + 'static>),
}

impl Fault {
    /// Wraps an error reported by an awaited operation.
    pub fn external<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::External(Box::new(error))
    }

    /// Returns `true` if this fault was caused by a panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Fault::Panic(_))
    }

    /// Returns the error of an [`Fault::External`] fault.
    pub fn as_external(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            Fault::External(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Returns the panic message if this fault was caused by a panic with a string payload.
    pub fn panic_message(&self) -> Option<&str> {
        let Fault::Panic(payload) = self else {
            return None;
        };

        payload
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| payload.downcast_ref::<alloc::string::String>().map(|s| s.as_str()))
    }

    /// Consumes the fault, returning the panic payload if it was caused by a panic.
    ///
    /// # Errors
    ///
    /// Returns the fault unchanged if it was not caused by a panic.
    pub fn try_into_panic(self) -> Result<Box<dyn Any + Send + 'static>, Fault> {
        match self {
            Fault::Panic(payload) => Ok(payload),
            other => Err(other),
        }
    }
}

impl From<Box<dyn Error + Send + Sync + 'static>> for Fault {
    fn from(err: Box<dyn Error + Send + Sync + 'static>) -> Self {
        Self::External(err)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::ProtocolViolation => f.write_str("ProtocolViolation"),
            Fault::Panic(_) => f
                .debug_tuple("Panic")
                .field(&self.panic_message().unwrap_or("<non-string payload>"))
                .finish(),
            Fault::External(err) => f.debug_tuple("External").field(err).finish(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::ProtocolViolation => {
                f.write_str("awaitable was advanced before it reported readiness")
            }
            Fault::Panic(_) => match self.panic_message() {
                Some(msg) => write!(f, "computation panicked: {msg}"),
                None => f.write_str("computation panicked"),
            },
            Fault::External(err) => write!(f, "awaited operation failed: {err}"),
        }
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Fault::External(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Runs `f`, turning a panic into [`Fault::Panic`].
///
/// This is the fault boundary of every resumption: nothing raised by user code while a chain is
/// advanced escapes it.
pub(crate) fn catch<R>(f: impl FnOnce() -> Result<R, Fault>) -> Result<R, Fault> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "std")] {
            std::panic::catch_unwind(core::panic::AssertUnwindSafe(f))
                .unwrap_or_else(|payload| Err(Fault::Panic(payload)))
        } else {
            f()
        }
    }
}

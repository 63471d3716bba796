// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Driver state. The driver stores its state in an atomic `usize` with the following layout:
///
/// ```text
/// | 3          3 | 2        2 | 1        1 | 0       0 |
/// | has output   | complete   | notified   | running   |
/// ```
///
/// `RUNNING` is what gives a resumption exclusive access to the computation, there is no lock.
pub(super) struct State {
    val: AtomicUsize,
}

mycelium_bitfield::bitfield! {
    /// A snapshot of a driver's current state.
    #[derive(PartialEq, Eq)]
    pub(super) struct Snapshot<usize> {
        /// If set, a resumption is currently stepping the computation.
        pub const RUNNING: bool;
        /// If set, the driver was woken and a resumption is still owed.
        ///
        /// While `RUNNING` is set the running resumption picks this up before it suspends.
        /// Otherwise a resumption has been handed to the scheduler already.
        pub const NOTIFIED: bool;
        /// If set, the computation has settled to a value or a fault.
        pub const COMPLETE: bool;
        /// If set, the settled outcome is ready to be taken by the `PlyTask`.
        pub const HAS_OUTPUT: bool;
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum StartRunAction {
    /// Successful transition, the resumption owns the computation now.
    Run,
    /// The computation is running on another thread or has completed already.
    DontRun,
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum EndRunAction {
    /// Nothing woke the driver while it ran, it is suspended now.
    Suspend,
    /// The driver was woken while it ran and remains running.
    Continue,
    /// The driver was woken while it ran and must be handed to the scheduler again.
    Reschedule,
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum WakeAction {
    /// A resumption must be handed to the scheduler.
    Schedule,
    /// The wakeup was absorbed, either by the running resumption or one that is already scheduled.
    None,
}

impl State {
    pub(super) const fn new() -> State {
        State {
            val: AtomicUsize::new(0),
        }
    }

    pub(super) fn load(&self, ordering: Ordering) -> Snapshot {
        Snapshot(self.val.load(ordering))
    }

    /// Attempt to transition the driver to `RUNNING`.
    ///
    /// A successful transition must always be followed by either [`Self::end_run`] or
    /// [`Self::complete`].
    pub(super) fn start_run(&self) -> StartRunAction {
        self.transition(|s| {
            if s.get(Snapshot::RUNNING) || s.get(Snapshot::COMPLETE) {
                return StartRunAction::DontRun;
            }

            s.set(Snapshot::RUNNING, true)
                // this resumption serves the wakeup
                .set(Snapshot::NOTIFIED, false);

            StartRunAction::Run
        })
    }

    /// Transition out of `RUNNING` after the computation found it needs to wait.
    ///
    /// `inline` selects whether a wakeup that arrived during the run is served right away by the
    /// current resumption or handed to the scheduler.
    pub(super) fn end_run(&self, inline: bool) -> EndRunAction {
        self.transition(|s| {
            debug_assert!(s.get(Snapshot::RUNNING));
            debug_assert!(!s.get(Snapshot::COMPLETE));

            if !s.get(Snapshot::NOTIFIED) {
                s.set(Snapshot::RUNNING, false);
                return EndRunAction::Suspend;
            }

            if inline {
                s.set(Snapshot::NOTIFIED, false);
                EndRunAction::Continue
            } else {
                // leave NOTIFIED set, the rescheduled resumption consumes it
                s.set(Snapshot::RUNNING, false);
                EndRunAction::Reschedule
            }
        })
    }

    /// Mark the computation as settled and publish its outcome.
    ///
    /// Must only be called while `RUNNING` and after the outcome has been written.
    pub(super) fn complete(&self) {
        self.transition(|s| {
            debug_assert!(s.get(Snapshot::RUNNING));

            s.set(Snapshot::RUNNING, false)
                .set(Snapshot::NOTIFIED, false)
                .set(Snapshot::COMPLETE, true)
                .set(Snapshot::HAS_OUTPUT, true);
        });
    }

    pub(super) fn wake(&self) -> WakeAction {
        self.transition(|s| {
            if s.get(Snapshot::COMPLETE) || s.get(Snapshot::NOTIFIED) {
                return WakeAction::None;
            }

            s.set(Snapshot::NOTIFIED, true);

            if s.get(Snapshot::RUNNING) {
                WakeAction::None
            } else {
                WakeAction::Schedule
            }
        })
    }

    /// Attempt to claim the settled outcome.
    ///
    /// Returns `true` exactly once, after the computation completed.
    pub(super) fn take_output(&self) -> bool {
        self.transition(|s| {
            if !s.get(Snapshot::COMPLETE) || !s.get(Snapshot::HAS_OUTPUT) {
                return false;
            }

            s.set(Snapshot::HAS_OUTPUT, false);
            true
        })
    }

    fn transition<T>(&self, mut transition: impl FnMut(&mut Snapshot) -> T) -> T {
        let mut current = self.load(Ordering::Acquire);
        loop {
            tracing::trace!("State::transition; current:\n{}", current);
            let mut next = current;
            let res = transition(&mut next);

            if current.0 == next.0 {
                return res;
            }

            tracing::trace!("State::transition; next:\n{}", next);
            match self.val.compare_exchange_weak(
                current.0,
                next.0,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return res,
                Err(actual) => current = Snapshot(actual),
            }
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load(Ordering::Relaxed).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_while_idle_schedules_once() {
        let state = State::new();
        assert_eq!(state.start_run(), StartRunAction::Run);
        assert_eq!(state.end_run(true), EndRunAction::Suspend);

        assert_eq!(state.wake(), WakeAction::Schedule);
        // a resumption is owed already
        assert_eq!(state.wake(), WakeAction::None);

        assert_eq!(state.start_run(), StartRunAction::Run);
        assert!(!state.load(Ordering::Relaxed).get(Snapshot::NOTIFIED));
    }

    #[test]
    fn wake_while_running_is_absorbed() {
        let state = State::new();
        assert_eq!(state.start_run(), StartRunAction::Run);
        assert_eq!(state.wake(), WakeAction::None);
        assert_eq!(state.start_run(), StartRunAction::DontRun);

        assert_eq!(state.end_run(true), EndRunAction::Continue);
        assert_eq!(state.end_run(true), EndRunAction::Suspend);
    }

    #[test]
    fn wake_while_running_reschedules() {
        let state = State::new();
        assert_eq!(state.start_run(), StartRunAction::Run);
        assert_eq!(state.wake(), WakeAction::None);
        assert_eq!(state.end_run(false), EndRunAction::Reschedule);

        // the rescheduled resumption is still owed
        assert_eq!(state.wake(), WakeAction::None);
        assert_eq!(state.start_run(), StartRunAction::Run);
    }

    #[test]
    fn output_is_taken_once() {
        let state = State::new();
        assert!(!state.take_output());

        assert_eq!(state.start_run(), StartRunAction::Run);
        state.complete();

        assert_eq!(state.wake(), WakeAction::None);
        assert_eq!(state.start_run(), StartRunAction::DontRun);
        assert!(state.take_output());
        assert!(!state.take_output());
    }
}

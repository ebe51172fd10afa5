// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Lifecycle state machine shared by pipeline definitions and model instances
//!
//! This module defines the availability state machine and the in-flight
//! request counter that gates content mutation:
//! - `AvailabilityState` - the lifecycle of a serveable entity
//! - `StateTracker` - state storage with change notification
//! - `InFlightCounter` - request-path reference count with drain waiting
//!
//! # State Transitions
//!
//! ```text
//! ┌─────────┐ validation passed ┌───────────┐
//! │ Loading │──────────────────►│ Available │
//! └────┬────┘                   └─────┬─────┘
//!      ▲                             │ retire
//!      │ reload                      ▼
//!      │                       ┌───────────┐
//!      └───────────────────────│ Unloading │
//!                              └─────┬─────┘
//!                                    │ content cleared
//!                                    ▼
//!                              ┌───────────┐
//!                              │ Retired   │
//!                              └───────────┘
//! ```

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Availability of a serveable entity.
///
/// The ordering is meaningful: states greater than [`Available`] are past
/// the point of serving and never come back to it except through a reload.
///
/// [`Available`]: AvailabilityState::Available
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AvailabilityState {
    /// Content installed or being installed, not yet validated
    Loading,
    /// Validated and serveable
    Available,
    /// Being torn down, waiting for in-flight requests to finish
    Unloading,
    /// Terminal - accepts no further operations
    Retired,
}

impl Default for AvailabilityState {
    fn default() -> Self {
        Self::Loading
    }
}

impl AvailabilityState {
    /// Check whether the entity can serve requests right now
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// Check whether the entity has moved past serving for good
    pub fn is_beyond_available(&self) -> bool {
        *self > Self::Available
    }
}

/// Availability state with change notification.
///
/// Writers transition through the `notify_*` methods; waiters block on
/// [`wait_while_loading`] until the state leaves `Loading` or the deadline
/// expires.
///
/// [`wait_while_loading`]: StateTracker::wait_while_loading
#[derive(Debug, Default)]
pub struct StateTracker {
    state: Mutex<AvailabilityState>,
    changed: Condvar,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AvailabilityState {
        *self.state.lock()
    }

    /// A reload started installing new content.
    pub fn notify_load_in_progress(&self) {
        self.transition(AvailabilityState::Loading);
    }

    /// Validation succeeded; the entity is serveable.
    pub fn notify_validation_passed(&self) {
        self.transition(AvailabilityState::Available);
    }

    /// Validation failed; the entity stays in `Loading`.
    pub fn notify_validation_failed(&self) {
        self.transition(AvailabilityState::Loading);
    }

    /// Teardown started.
    pub fn notify_retire(&self) {
        self.transition(AvailabilityState::Unloading);
    }

    /// Teardown finished; terminal state.
    pub fn notify_retired(&self) {
        self.transition(AvailabilityState::Retired);
    }

    fn transition(&self, next: AvailabilityState) {
        let mut state = self.state.lock();
        // Retired is terminal.
        if *state != next && *state != AvailabilityState::Retired {
            tracing::debug!(from = ?*state, to = ?next, "lifecycle transition");
            *state = next;
        }
        self.changed.notify_all();
    }

    /// Block while the state is `Loading`, up to `deadline`.
    ///
    /// Returns the state observed on wakeup; a return value of `Loading`
    /// means the deadline expired first.
    pub fn wait_while_loading(&self, deadline: Instant) -> AvailabilityState {
        let mut state = self.state.lock();
        while *state == AvailabilityState::Loading {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state
    }
}

/// Count of request-path guards currently alive.
///
/// Mutators wait on [`wait_until_drained`] before touching content; the
/// guard types release on drop, so every exit path decrements.
///
/// [`wait_until_drained`]: InFlightCounter::wait_until_drained
#[derive(Debug, Default)]
pub struct InFlightCounter {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) {
        *self.count.lock() += 1;
    }

    pub fn release(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    pub fn active(&self) -> usize {
        *self.count.lock()
    }

    /// Block until no guard is alive.
    pub fn wait_until_drained(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait(&mut count);
        }
    }
}

//! Cross-thread shutdown trigger.
//!
//! The signal moves forward only: `Armed -> Requested -> Consumed`. The first
//! `request` wins and records the status it was requested with; `consume`
//! marks the point where unmount begins and happens at most once.

use super::status::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Armed,
    Requested(ExitStatus),
    Consumed(ExitStatus),
}

#[derive(Debug)]
pub struct ShutdownSignal {
    state: Mutex<ShutdownState>,
    changed: Condvar,
    attempts: AtomicUsize,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ShutdownState::Armed),
            changed: Condvar::new(),
            attempts: AtomicUsize::new(0),
        }
    }

    // The state is a plain enum, so a poisoned lock still holds a valid value.
    fn lock(&self) -> MutexGuard<'_, ShutdownState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ShutdownState {
        *self.lock()
    }

    /// Request shutdown with `status`. Returns `true` only for the call that
    /// performed the armed->requested transition.
    pub fn request(&self, status: ExitStatus) -> bool {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.lock();
        if *state != ShutdownState::Armed {
            tracing::debug!(attempt, "shutdown already requested");
            return false;
        }
        *state = ShutdownState::Requested(status);
        drop(state);
        self.changed.notify_all();
        tracing::debug!(%status, "shutdown requested");
        true
    }

    /// Mark the request as taken over by the actor about to unmount.
    /// Returns `true` only for the caller that performed requested->consumed.
    pub fn consume(&self) -> bool {
        let mut state = self.lock();
        match *state {
            ShutdownState::Requested(status) => {
                *state = ShutdownState::Consumed(status);
                drop(state);
                self.changed.notify_all();
                true
            }
            _ => false,
        }
    }

    // Number of `request` calls so far, including the no-op ones.
    pub fn request_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self.state(), ShutdownState::Armed)
    }

    // Status handed to `request`, if any request has been made.
    pub fn requested_status(&self) -> Option<ExitStatus> {
        match self.state() {
            ShutdownState::Armed => None,
            ShutdownState::Requested(status) | ShutdownState::Consumed(status) => Some(status),
        }
    }

    /// Block until shutdown has been requested.
    pub fn wait(&self) -> ExitStatus {
        let mut state = self.lock();
        loop {
            match *state {
                ShutdownState::Armed => {
                    state = self
                        .changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                ShutdownState::Requested(status) | ShutdownState::Consumed(status) => {
                    return status;
                }
            }
        }
    }

    /// Block for at most `timeout`. Returns `true` if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while *state == ShutdownState::Armed {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

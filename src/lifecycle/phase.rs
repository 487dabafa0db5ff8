//! Per-process lifecycle state machine.
//!
//! ```text
//! Init -> Mounting -> Running -> ShuttingDown -> Unmounted -> Done
//!            \______________________^
//! Init -> Done   (setup failed before mount was attempted)
//! ```
//!
//! Transitions only move forward, so no path can mount or unmount twice.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    Init = 0,
    Mounting = 1,
    Running = 2,
    ShuttingDown = 3,
    Unmounted = 4,
    Done = 5,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Init,
            1 => Self::Mounting,
            2 => Self::Running,
            3 => Self::ShuttingDown,
            4 => Self::Unmounted,
            _ => Self::Done,
        }
    }

    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Mounting)
                | (Self::Init, Self::Done)
                | (Self::Mounting, Self::Running)
                | (Self::Mounting, Self::ShuttingDown)
                | (Self::Running, Self::ShuttingDown)
                | (Self::ShuttingDown, Self::Unmounted)
                | (Self::Unmounted, Self::Done)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Mounting => "mounting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Unmounted => "unmounted",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

// Shared between the coordinator and the worker; each transition has exactly one owner.
#[derive(Debug)]
pub struct PhaseTracker {
    current: AtomicU8,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: AtomicU8::new(Phase::Init as u8),
        }
    }

    pub fn current(&self) -> Phase {
        Phase::from_u8(self.current.load(Ordering::SeqCst))
    }

    /// Move to `next` if that is a legal transition from the current phase.
    pub fn advance(&self, next: Phase) -> bool {
        let result = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                Phase::from_u8(raw)
                    .can_advance_to(next)
                    .then_some(next as u8)
            });
        match result {
            Ok(prev) => {
                tracing::debug!(from = %Phase::from_u8(prev), to = %next, "lifecycle phase");
                true
            }
            Err(prev) => {
                tracing::error!(
                    from = %Phase::from_u8(prev),
                    to = %next,
                    "rejected lifecycle transition"
                );
                false
            }
        }
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

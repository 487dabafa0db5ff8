use super::status::ExitStatus;
use std::io;
use thiserror::Error;

/// Failures raised by the lifecycle machinery itself, as opposed to the
/// statuses a service reports from mount.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Signal or thread infrastructure could not be initialised. Mount is never attempted.
    #[error("lifecycle setup failed: {reason}")]
    Setup {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The worker thread could not be created. No join is owed.
    #[error("spawning worker thread failed: {0}")]
    Spawn(#[source] io::Error),

    /// The worker thread could not be joined (it panicked).
    #[error("joining worker thread failed: {0}")]
    WorkerJoin(String),

    /// Every termination notifier was dropped while the coordinator was waiting.
    #[error("termination event source closed")]
    EventSourceClosed,
}

impl LifecycleError {
    pub fn setup(reason: impl Into<String>) -> Self {
        Self::Setup {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn setup_io(reason: impl Into<String>, source: io::Error) -> Self {
        Self::Setup {
            reason: reason.into(),
            source: Some(source),
        }
    }

    pub fn status(&self) -> ExitStatus {
        match self {
            Self::Setup { source, .. } => source
                .as_ref()
                .and_then(io::Error::raw_os_error)
                .map_or(ExitStatus::from_errno(libc::EINVAL), ExitStatus::from_errno),
            Self::Spawn(err) => {
                ExitStatus::from_errno(err.raw_os_error().unwrap_or(libc::EAGAIN))
            }
            Self::WorkerJoin(_) => ExitStatus::from_errno(libc::EIO),
            Self::EventSourceClosed => ExitStatus::from_errno(libc::EPIPE),
        }
    }
}

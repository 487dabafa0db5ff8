use super::error::LifecycleError;
use super::events::{ExitNotice, TerminationNotifier};
use super::shutdown::ShutdownSignal;
use super::status::ExitStatus;
use std::any::Any;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub type WorkerBody = Box<dyn FnOnce() -> ExitStatus + Send + 'static>;

// Creates the OS thread for a worker body. Swappable so spawn failures can be exercised.
pub type Spawner = fn(thread::Builder, WorkerBody) -> io::Result<JoinHandle<ExitStatus>>;

pub fn spawn_thread(
    builder: thread::Builder,
    body: WorkerBody,
) -> io::Result<JoinHandle<ExitStatus>> {
    builder.spawn(body)
}

// Owns the single background thread of one mount session.
// The thread's return value is the result slot: written once by the worker,
// read once by whoever joins it.
pub struct Worker {
    name: String,
    shutdown: Arc<ShutdownSignal>,
    handle: Option<JoinHandle<ExitStatus>>,
    joined: Option<Result<ExitStatus, String>>,
}

impl Worker {
    /// Spawn the worker thread running `entry`. On error no thread exists and
    /// nothing needs joining.
    #[cfg(test)]
    pub fn start<F>(
        name: &str,
        shutdown: Arc<ShutdownSignal>,
        notifier: TerminationNotifier,
        entry: F,
    ) -> Result<Self, LifecycleError>
    where
        F: FnOnce(&ShutdownSignal) -> ExitStatus + Send + 'static,
    {
        Self::start_with(spawn_thread, name, shutdown, notifier, entry)
    }

    pub fn start_with<F>(
        spawner: Spawner,
        name: &str,
        shutdown: Arc<ShutdownSignal>,
        notifier: TerminationNotifier,
        entry: F,
    ) -> Result<Self, LifecycleError>
    where
        F: FnOnce(&ShutdownSignal) -> ExitStatus + Send + 'static,
    {
        let thread_shutdown = Arc::clone(&shutdown);
        let body: WorkerBody = Box::new(move || {
            let _notice = ExitNotice::new(notifier);
            entry(&thread_shutdown)
        });
        let builder = thread::Builder::new().name(name.to_string());
        let handle = spawner(builder, body).map_err(LifecycleError::Spawn)?;
        tracing::debug!(worker = name, "worker thread started");

        Ok(Self {
            name: name.to_string(),
            shutdown,
            handle: Some(handle),
            joined: None,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Optionally request cooperative shutdown, then block until the thread
    /// has terminated. Later calls return the first outcome without blocking.
    pub fn stop_and_wait(&mut self, request_stop: bool) -> Result<ExitStatus, LifecycleError> {
        if let Some(handle) = self.handle.take() {
            // Only one shutdown request per coordinator; a signal may already have made it.
            if request_stop && !self.shutdown.is_requested() {
                self.shutdown.request(ExitStatus::SUCCESS);
                tracing::info!(worker = %self.name, "requested worker shutdown");
            }
            let outcome = handle.join().map_err(panic_message);
            match &outcome {
                Ok(status) => tracing::debug!(worker = %self.name, %status, "worker joined"),
                Err(reason) => tracing::error!(worker = %self.name, %reason, "worker panicked"),
            }
            self.joined = Some(outcome);
        }

        match &self.joined {
            Some(Ok(status)) => Ok(*status),
            Some(Err(message)) => Err(LifecycleError::WorkerJoin(message.clone())),
            None => Err(LifecycleError::WorkerJoin(format!(
                "{} was never joined",
                self.name
            ))),
        }
    }
}

impl Drop for Worker {
    // An early return must not leave the thread running past its owner.
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::warn!(worker = %self.name, "worker dropped before join, stopping it");
            let _ = self.stop_and_wait(true);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

use super::error::LifecycleError;
use std::sync::mpsc::{self, Receiver, Sender};

// What woke the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationEvent {
    Signal,
    WorkerExited,
}

/// Sending half of the termination event source. Cloned into the OS signal
/// bridge and into the worker thread.
#[derive(Debug, Clone)]
pub struct TerminationNotifier {
    tx: Sender<TerminationEvent>,
}

impl TerminationNotifier {
    pub fn signal(&self) {
        self.send(TerminationEvent::Signal);
    }

    pub fn worker_exited(&self) {
        self.send(TerminationEvent::WorkerExited);
    }

    // The coordinator may already be gone during process teardown.
    fn send(&self, event: TerminationEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(?event, "termination event dropped, coordinator no longer listening");
        }
    }
}

#[derive(Debug)]
pub struct TerminationEvents {
    rx: Receiver<TerminationEvent>,
}

impl TerminationEvents {
    // Block until the next event; no timeout.
    pub fn recv(&self) -> Result<TerminationEvent, LifecycleError> {
        self.rx.recv().map_err(|_| LifecycleError::EventSourceClosed)
    }
}

pub fn termination_channel() -> (TerminationNotifier, TerminationEvents) {
    let (tx, rx) = mpsc::channel();
    (TerminationNotifier { tx }, TerminationEvents { rx })
}

/// Fires `worker_exited` when dropped, so the coordinator wakes even if the
/// worker entry unwinds.
pub struct ExitNotice {
    notifier: TerminationNotifier,
}

impl ExitNotice {
    pub fn new(notifier: TerminationNotifier) -> Self {
        Self { notifier }
    }
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        self.notifier.worker_exited();
    }
}

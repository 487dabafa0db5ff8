use crate::lifecycle::{LifecycleError, ShutdownSignal, TerminationNotifier};
use std::sync::Arc;

// Bridge SIGINT/SIGTERM/SIGHUP into the coordinator's termination event source.
// The handler only forwards; the coordinator decides what a signal means.
pub fn install_termination_handler(
    notifier: &TerminationNotifier,
    shutdown: Arc<ShutdownSignal>,
) -> Result<(), LifecycleError> {
    let notifier = notifier.clone();
    ctrlc::set_handler(move || {
        if shutdown.is_requested() {
            tracing::warn!("shutdown already in progress, waiting for unmount");
        }
        notifier.signal();
    })
    .map_err(|err| match err {
        ctrlc::Error::System(source) => {
            LifecycleError::setup_io("installing termination handler failed", source)
        }
        other => LifecycleError::setup(format!("installing termination handler failed: {other}")),
    })
}

use crate::args::MountArgs;
use crate::lifecycle::{Coordinator, ExitStatus};
use crate::session::LocalService;
use crate::shared::signal::install_termination_handler;

// Public mount command entrypoint.
// Runs one full session and returns the composed status for the process exit code.
pub fn run_mount(args: MountArgs) -> ExitStatus {
    let coordinator = Coordinator::new(args.coordinator_config());
    let shutdown = coordinator.shutdown_signal();
    let service = LocalService::new(args.service_config());

    tracing::info!(
        mountpoint = %args.mountpoint.display(),
        service_args = ?args.service_args,
        "mounting"
    );
    let status = coordinator.run_with_setup(
        |notifier| install_termination_handler(notifier, shutdown),
        service,
    );

    if status.is_success() {
        tracing::info!("unmounted cleanly");
    } else {
        tracing::error!(%status, "session ended with failure");
    }
    status
}

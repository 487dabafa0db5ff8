use super::phase::{Phase, PhaseTracker};
use super::shutdown::ShutdownSignal;
use super::status::ExitStatus;
use std::panic::{self, AssertUnwindSafe};

/// The mount/unmount collaborator driven by the coordinator.
///
/// The coordinator guarantees `mount` is called once, `serve` only after a
/// successful mount, and `unmount` exactly once after both have returned,
/// even when mount failed.
pub trait Service: Send + 'static {
    fn mount(&mut self, shutdown: &ShutdownSignal) -> ExitStatus;

    /// Operate the mounted session until shutdown is requested or the service
    /// gives up on its own.
    fn serve(&mut self, shutdown: &ShutdownSignal) -> ExitStatus {
        shutdown.wait();
        ExitStatus::SUCCESS
    }

    /// Release everything acquired by `mount`, including partial setup.
    fn unmount(&mut self);
}

// Mount, and mark the session running when it came up.
pub(crate) fn mount_service<S: Service>(
    service: &mut S,
    shutdown: &ShutdownSignal,
    phases: &PhaseTracker,
) -> ExitStatus {
    phases.advance(Phase::Mounting);
    let status = service.mount(shutdown);
    if status.is_success() {
        phases.advance(Phase::Running);
        tracing::info!("service mounted");
    } else {
        tracing::error!(%status, "mount failed");
    }
    status
}

// Take over the shutdown request and release the session.
pub(crate) fn unmount_service<S: Service>(
    service: &mut S,
    shutdown: &ShutdownSignal,
    phases: &PhaseTracker,
    status: ExitStatus,
) {
    // A service that stopped on its own has not been asked to stop yet.
    if !shutdown.is_requested() {
        shutdown.request(status);
    }
    shutdown.consume();
    phases.advance(Phase::ShuttingDown);
    service.unmount();
    phases.advance(Phase::Unmounted);
    tracing::info!("service unmounted");
}

/// Worker entry: mount, operate, then unmount unconditionally. The returned
/// status is the mount status, or the serve status when mount succeeded.
///
/// A panic in `serve` still unmounts before the panic continues to the joiner.
pub fn run_session<S: Service>(
    mut service: S,
    shutdown: &ShutdownSignal,
    phases: &PhaseTracker,
) -> ExitStatus {
    let mut status = mount_service(&mut service, shutdown, phases);
    if status.is_success() {
        match panic::catch_unwind(AssertUnwindSafe(|| service.serve(shutdown))) {
            Ok(served) => status = served,
            Err(payload) => {
                tracing::error!("service loop panicked, unmounting");
                unmount_service(
                    &mut service,
                    shutdown,
                    phases,
                    ExitStatus::from_errno(libc::EIO),
                );
                panic::resume_unwind(payload);
            }
        }
        tracing::info!(%status, requested = shutdown.is_requested(), "service loop returned");
    }
    unmount_service(&mut service, shutdown, phases, status);
    status
}

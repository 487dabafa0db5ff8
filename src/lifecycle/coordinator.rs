//! Lifecycle coordinator.
//!
//! Sequences mount, the wait for termination, shutdown, unmount and the worker
//! join so that each happens exactly once and the process status reflects the
//! real outcome.
//!
//! # Topologies
//! - `Worker`: mount, serve and unmount all run on one background worker. The
//!   coordinator waits for a termination signal *or* the worker exiting on its
//!   own, then stops and joins the worker.
//! - `Inline`: mount and unmount run on the coordinator thread. A supervisory
//!   thread parks on the shutdown signal between them.
//!
//! Both converge on the same end state: unmounted once, joined once, `Done`.

use super::error::LifecycleError;
use super::events::{
    TerminationEvent, TerminationEvents, TerminationNotifier, termination_channel,
};
use super::phase::{Phase, PhaseTracker};
use super::service::{Service, mount_service, run_session, unmount_service};
use super::shutdown::ShutdownSignal;
use super::status::ExitStatus;
use super::worker::{Spawner, Worker, spawn_thread};
use clap::ValueEnum;
use std::sync::Arc;

const WORKER_THREAD_NAME: &str = "ngnfs-worker";
const SUPERVISOR_THREAD_NAME: &str = "ngnfs-supervisor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Topology {
    /// Mount, serve and unmount on a dedicated worker thread
    #[default]
    Worker,
    /// Mount and unmount on the main thread, supervised by a helper thread
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub topology: Topology,
    /// Request shutdown before joining. When false the join relies on the
    /// worker finishing by itself or on a signal having already requested it.
    pub request_stop: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Worker,
            request_stop: true,
        }
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    shutdown: Arc<ShutdownSignal>,
    phases: Arc<PhaseTracker>,
    // Dropped once the session's own senders exist, so the event source can close.
    notifier: Option<TerminationNotifier>,
    events: TerminationEvents,
    spawner: Spawner,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_spawner(config, spawn_thread)
    }

    pub fn with_spawner(config: CoordinatorConfig, spawner: Spawner) -> Self {
        let (notifier, events) = termination_channel();
        Self {
            config,
            shutdown: Arc::new(ShutdownSignal::new()),
            phases: Arc::new(PhaseTracker::new()),
            notifier: Some(notifier),
            events,
            spawner,
        }
    }

    /// Handle for delivering termination signals to this coordinator.
    #[cfg(test)]
    pub fn notifier(&self) -> TerminationNotifier {
        self.notifier
            .clone()
            .expect("notifier is held until the session starts")
    }

    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.shutdown)
    }

    #[cfg(test)]
    pub fn phases(&self) -> Arc<PhaseTracker> {
        Arc::clone(&self.phases)
    }

    #[cfg(test)]
    pub fn run<S: Service>(self, service: S) -> ExitStatus {
        self.run_with_setup(|_| Ok(()), service)
    }

    /// Run `setup` (typically installing the OS signal bridge), then drive one
    /// full session. A setup failure is reported without ever mounting.
    pub fn run_with_setup<S, F>(mut self, setup: F, service: S) -> ExitStatus
    where
        S: Service,
        F: FnOnce(&TerminationNotifier) -> Result<(), LifecycleError>,
    {
        let Some(notifier) = self.notifier.take() else {
            return LifecycleError::EventSourceClosed.status();
        };
        if let Err(err) = setup(&notifier) {
            tracing::error!(error = %err, "setup failed, not mounting");
            self.phases.advance(Phase::Done);
            return err.status();
        }

        tracing::info!(
            topology = ?self.config.topology,
            request_stop = self.config.request_stop,
            "starting session"
        );
        match self.config.topology {
            Topology::Worker => self.run_worker(notifier, service),
            Topology::Inline => self.run_inline(notifier, service),
        }
    }

    fn run_worker<S: Service>(self, notifier: TerminationNotifier, service: S) -> ExitStatus {
        let phases = Arc::clone(&self.phases);
        let worker = Worker::start_with(
            self.spawner,
            WORKER_THREAD_NAME,
            Arc::clone(&self.shutdown),
            notifier,
            move |shutdown| run_session(service, shutdown, &phases),
        );
        let mut worker = match worker {
            Ok(worker) => worker,
            Err(err) => {
                tracing::error!(error = %err, "worker could not be started, not mounting");
                self.phases.advance(Phase::Done);
                return err.status();
            }
        };

        let waited = self.wait_for_signal_or_completion();
        tracing::debug!(finished = worker.is_finished(), "stopping worker");
        let joined = worker.stop_and_wait(self.config.request_stop);
        self.finish(waited.err(), joined)
    }

    fn run_inline<S: Service>(self, notifier: TerminationNotifier, mut service: S) -> ExitStatus {
        let mount_status = mount_service(&mut service, &self.shutdown, &self.phases);
        if !mount_status.is_success() {
            unmount_service(&mut service, &self.shutdown, &self.phases, mount_status);
            return self.finish(None, Ok(mount_status));
        }

        let supervisor = Worker::start_with(
            self.spawner,
            SUPERVISOR_THREAD_NAME,
            Arc::clone(&self.shutdown),
            notifier,
            |shutdown| shutdown.wait(),
        );
        let mut supervisor = match supervisor {
            Ok(supervisor) => supervisor,
            Err(err) => {
                tracing::error!(error = %err, "supervisor could not be started");
                unmount_service(&mut service, &self.shutdown, &self.phases, err.status());
                return self.finish(Some(err), Ok(mount_status));
            }
        };

        let waited = self.wait_for_signal_or_completion();
        let joined = supervisor.stop_and_wait(self.config.request_stop);
        unmount_service(&mut service, &self.shutdown, &self.phases, mount_status);
        let joined = joined.map(|supervised| ExitStatus::compose(Some(mount_status), supervised));
        self.finish(waited.err(), joined)
    }

    /// Block until an OS termination signal arrives or the worker exits,
    /// whichever is first. A signal requests shutdown before returning.
    pub fn wait_for_signal_or_completion(&self) -> Result<TerminationEvent, LifecycleError> {
        let event = match self.events.recv() {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(error = %err, "no termination source left, stopping session");
                return Err(err);
            }
        };
        match event {
            TerminationEvent::Signal => {
                tracing::info!("termination signal received, shutting down");
                self.shutdown.request(ExitStatus::SUCCESS);
            }
            TerminationEvent::WorkerExited => {
                tracing::info!("worker exited before any termination signal");
            }
        }
        Ok(event)
    }

    fn finish(
        self,
        coordinator_error: Option<LifecycleError>,
        joined: Result<ExitStatus, LifecycleError>,
    ) -> ExitStatus {
        let worker_status = match joined {
            Ok(status) => status,
            Err(err) => err.status(),
        };
        let status = ExitStatus::compose(
            coordinator_error.as_ref().map(LifecycleError::status),
            worker_status,
        );
        tracing::debug!(
            phase = %self.phases.current(),
            shutdown_requests = self.shutdown.request_attempts(),
            "composing final status"
        );
        self.phases.advance(Phase::Done);
        tracing::info!(%status, "session finished");
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::ShutdownState;
    use std::io;
    use std::sync::Mutex;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        MountStart,
        MountEnd,
        Serve,
        Unmount,
    }

    // Scripted service recording every call in order.
    struct RecordingService {
        calls: Arc<Mutex<Vec<Call>>>,
        mount_status: ExitStatus,
        serve: ServeBehavior,
    }

    enum ServeBehavior {
        // Return this status as soon as serve is entered.
        Immediate(ExitStatus),
        // Return this status once shutdown is requested.
        UntilShutdown(ExitStatus),
        // Return this status once the test releases the gate.
        Gated(Receiver<()>, ExitStatus),
        Panic,
    }

    impl RecordingService {
        fn new(mount_status: ExitStatus, serve: ServeBehavior) -> (Self, Arc<Mutex<Vec<Call>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let service = Self {
                calls: Arc::clone(&calls),
                mount_status,
                serve,
            };
            (service, calls)
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Service for RecordingService {
        fn mount(&mut self, _shutdown: &ShutdownSignal) -> ExitStatus {
            self.record(Call::MountStart);
            thread::sleep(Duration::from_millis(5));
            self.record(Call::MountEnd);
            self.mount_status
        }

        fn serve(&mut self, shutdown: &ShutdownSignal) -> ExitStatus {
            self.record(Call::Serve);
            match &self.serve {
                ServeBehavior::Immediate(status) => *status,
                ServeBehavior::UntilShutdown(status) => {
                    shutdown.wait();
                    *status
                }
                ServeBehavior::Gated(gate, status) => {
                    let _ = gate.recv();
                    *status
                }
                ServeBehavior::Panic => panic!("operate loop blew up"),
            }
        }

        fn unmount(&mut self) {
            self.record(Call::Unmount);
        }
    }

    fn count(calls: &Arc<Mutex<Vec<Call>>>, call: Call) -> usize {
        calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    fn assert_single_session(calls: &Arc<Mutex<Vec<Call>>>) {
        assert_eq!(count(calls, Call::MountStart), 1, "mount called once");
        assert_eq!(count(calls, Call::Unmount), 1, "unmount called once");
        let calls = calls.lock().unwrap();
        let mount_end = calls.iter().position(|c| *c == Call::MountEnd).unwrap();
        let unmount = calls.iter().position(|c| *c == Call::Unmount).unwrap();
        assert!(mount_end < unmount, "unmount after mount returned: {calls:?}");
        assert_eq!(calls.last(), Some(&Call::Unmount));
    }

    fn gate() -> (Sender<()>, Receiver<()>) {
        mpsc::channel()
    }

    fn worker_config(request_stop: bool) -> CoordinatorConfig {
        CoordinatorConfig {
            topology: Topology::Worker,
            request_stop,
        }
    }

    #[test]
    fn worker_self_completion_status_is_reported() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Immediate(ExitStatus::new(7)),
        );
        let coordinator = Coordinator::new(worker_config(true));
        let phases = coordinator.phases();
        let shutdown = coordinator.shutdown_signal();

        assert_eq!(coordinator.run(service), ExitStatus::new(7));
        assert_single_session(&calls);
        assert_eq!(phases.current(), Phase::Done);
        assert_eq!(shutdown.state(), ShutdownState::Consumed(ExitStatus::new(7)));
        assert_eq!(shutdown.request_attempts(), 1);
    }

    #[test]
    fn mount_failure_still_unmounts_and_reports_mount_status() {
        let (service, calls) = RecordingService::new(
            ExitStatus::from_errno(libc::ENOENT),
            ServeBehavior::Immediate(ExitStatus::SUCCESS),
        );
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        let phases = coordinator.phases();

        assert_eq!(coordinator.run(service), ExitStatus::from_errno(libc::ENOENT));
        assert_single_session(&calls);
        assert_eq!(count(&calls, Call::Serve), 0);
        assert_eq!(phases.current(), Phase::Done);
    }

    #[test]
    fn signal_triggers_shutdown_and_keeps_worker_status() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::UntilShutdown(ExitStatus::SUCCESS),
        );
        let coordinator = Coordinator::new(worker_config(true));
        let phases = coordinator.phases();
        let shutdown = coordinator.shutdown_signal();
        coordinator.notifier().signal();

        assert_eq!(coordinator.run(service), ExitStatus::SUCCESS);
        assert_single_session(&calls);
        assert_eq!(phases.current(), Phase::Done);
        // The signal made the only request; stop_and_wait must not repeat it.
        assert_eq!(shutdown.request_attempts(), 1);
    }

    #[test]
    fn signal_without_stop_request_still_converges() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::UntilShutdown(ExitStatus::new(-4)),
        );
        let coordinator = Coordinator::new(worker_config(false));
        coordinator.notifier().signal();

        assert_eq!(coordinator.run(service), ExitStatus::new(-4));
        assert_single_session(&calls);
    }

    #[test]
    fn setup_error_never_mounts() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Immediate(ExitStatus::SUCCESS),
        );
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        let phases = coordinator.phases();

        let status = coordinator.run_with_setup(
            |_| Err(LifecycleError::setup("signal handler unavailable")),
            service,
        );

        assert_eq!(status, ExitStatus::from_errno(libc::EINVAL));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(phases.current(), Phase::Done);
    }

    #[test]
    fn signal_before_worker_completion_converges() {
        let (release, gate_rx) = gate();
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Gated(gate_rx, ExitStatus::new(3)),
        );
        let coordinator = Coordinator::new(worker_config(false));
        let notifier = coordinator.notifier();
        let shutdown = coordinator.shutdown_signal();
        let phases = coordinator.phases();

        let status = thread::scope(|scope| {
            let run = scope.spawn(move || coordinator.run(service));
            notifier.signal();
            while !shutdown.is_requested() {
                thread::sleep(Duration::from_millis(1));
            }
            release.send(()).unwrap();
            run.join().unwrap()
        });

        assert_eq!(status, ExitStatus::new(3));
        assert_single_session(&calls);
        assert_eq!(phases.current(), Phase::Done);
    }

    #[test]
    fn signal_after_worker_completion_converges() {
        let (release, gate_rx) = gate();
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Gated(gate_rx, ExitStatus::new(3)),
        );
        let coordinator = Coordinator::new(worker_config(true));
        let notifier = coordinator.notifier();
        let phases = coordinator.phases();

        let status = thread::scope(|scope| {
            let run = scope.spawn(move || coordinator.run(service));
            release.send(()).unwrap();
            while phases.current() != Phase::Done {
                thread::sleep(Duration::from_millis(1));
            }
            // Late signal after the session already ended.
            notifier.signal();
            run.join().unwrap()
        });

        assert_eq!(status, ExitStatus::new(3));
        assert_single_session(&calls);
    }

    #[test]
    fn repeated_signals_request_shutdown_once() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::UntilShutdown(ExitStatus::SUCCESS),
        );
        let coordinator = Coordinator::new(worker_config(true));
        let notifier = coordinator.notifier();
        for _ in 0..5 {
            notifier.signal();
        }

        assert_eq!(coordinator.run(service), ExitStatus::SUCCESS);
        assert_single_session(&calls);
    }

    #[test]
    fn worker_panic_is_surfaced_as_join_error() {
        struct PanickingService;

        impl Service for PanickingService {
            fn mount(&mut self, _shutdown: &ShutdownSignal) -> ExitStatus {
                panic!("mount blew up");
            }

            fn unmount(&mut self) {}
        }

        let coordinator = Coordinator::new(CoordinatorConfig::default());
        assert_eq!(coordinator.run(PanickingService), ExitStatus::from_errno(libc::EIO));
    }

    #[test]
    fn panicking_serve_still_unmounts_once() {
        let (service, calls) = RecordingService::new(ExitStatus::SUCCESS, ServeBehavior::Panic);
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        let phases = coordinator.phases();

        assert_eq!(coordinator.run(service), ExitStatus::from_errno(libc::EIO));
        assert_single_session(&calls);
        assert_eq!(count(&calls, Call::Serve), 1);
        assert_eq!(phases.current(), Phase::Done);
    }

    #[test]
    fn worker_spawn_failure_never_mounts() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Immediate(ExitStatus::SUCCESS),
        );
        let coordinator = Coordinator::with_spawner(CoordinatorConfig::default(), |_, _| {
            Err(io::Error::from_raw_os_error(libc::EAGAIN))
        });
        let phases = coordinator.phases();

        assert_eq!(coordinator.run(service), ExitStatus::from_errno(libc::EAGAIN));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(phases.current(), Phase::Done);
    }

    #[test]
    fn inline_supervisor_spawn_failure_unmounts_and_reports_it() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Immediate(ExitStatus::SUCCESS),
        );
        let config = CoordinatorConfig {
            topology: Topology::Inline,
            request_stop: true,
        };
        let coordinator = Coordinator::with_spawner(config, |_, _| {
            Err(io::Error::from_raw_os_error(libc::ENOMEM))
        });
        let phases = coordinator.phases();

        assert_eq!(coordinator.run(service), ExitStatus::from_errno(libc::ENOMEM));
        assert_single_session(&calls);
        assert_eq!(phases.current(), Phase::Done);
    }

    #[test]
    fn closed_event_source_is_reported_after_join() {
        // The thread drops its body unrun, so no sender survives and nothing is ever sent.
        let coordinator = Coordinator::with_spawner(CoordinatorConfig::default(), |builder, body| {
            builder.spawn(move || {
                drop(body);
                ExitStatus::SUCCESS
            })
        });
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Immediate(ExitStatus::SUCCESS),
        );

        assert_eq!(coordinator.run(service), ExitStatus::from_errno(libc::EPIPE));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn inline_signal_unmounts_on_coordinator_thread() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Immediate(ExitStatus::SUCCESS),
        );
        let coordinator = Coordinator::new(CoordinatorConfig {
            topology: Topology::Inline,
            request_stop: true,
        });
        let phases = coordinator.phases();
        coordinator.notifier().signal();

        assert_eq!(coordinator.run(service), ExitStatus::SUCCESS);
        assert_single_session(&calls);
        assert_eq!(count(&calls, Call::Serve), 0);
        assert_eq!(phases.current(), Phase::Done);
    }

    #[test]
    fn inline_mount_failure_skips_supervisor() {
        let (service, calls) = RecordingService::new(
            ExitStatus::from_errno(libc::EACCES),
            ServeBehavior::Immediate(ExitStatus::SUCCESS),
        );
        let coordinator = Coordinator::new(CoordinatorConfig {
            topology: Topology::Inline,
            request_stop: false,
        });
        let phases = coordinator.phases();

        assert_eq!(coordinator.run(service), ExitStatus::from_errno(libc::EACCES));
        assert_single_session(&calls);
        assert_eq!(phases.current(), Phase::Done);
    }

    #[test]
    fn inline_waits_for_signal_after_mount() {
        let (service, calls) = RecordingService::new(
            ExitStatus::SUCCESS,
            ServeBehavior::Immediate(ExitStatus::SUCCESS),
        );
        let coordinator = Coordinator::new(CoordinatorConfig {
            topology: Topology::Inline,
            request_stop: false,
        });
        let notifier = coordinator.notifier();
        let phases = coordinator.phases();

        let status = thread::scope(|scope| {
            let run = scope.spawn(move || coordinator.run(service));
            while phases.current() != Phase::Running {
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(count(&calls, Call::Unmount), 0);
            notifier.signal();
            run.join().unwrap()
        });

        assert_eq!(status, ExitStatus::SUCCESS);
        assert_single_session(&calls);
        assert_eq!(phases.current(), Phase::Done);
    }
}

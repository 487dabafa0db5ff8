// Startup/shutdown sequencing for one mount session.
pub mod coordinator;
pub mod error;
pub mod events;
pub mod phase;
pub mod service;
pub mod shutdown;
pub mod status;
pub mod worker;

pub use coordinator::{Coordinator, CoordinatorConfig, Topology};
pub use error::LifecycleError;
pub use events::TerminationNotifier;
pub use service::Service;
pub use shutdown::ShutdownSignal;
pub use status::ExitStatus;

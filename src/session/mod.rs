// Concrete mount session used by the daemon binary.
pub mod local;

pub use local::{LocalService, LocalServiceConfig, read_session};

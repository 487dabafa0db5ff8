pub mod lock;
pub mod logging;
pub mod signal;

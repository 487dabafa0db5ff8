// Command implementations split by subcommand for clarity.
pub mod mount;
pub mod status;

pub use mount::run_mount;
pub use status::run_status;

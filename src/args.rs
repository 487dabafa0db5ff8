use crate::lifecycle::{CoordinatorConfig, Topology};
use crate::session::LocalServiceConfig;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

// CLI root definition. This is the single entrypoint for all supported modes.
#[derive(Parser, Debug)]
#[command(name = "ngnfs-mount", version)]
#[command(about = "Mount daemon lifecycle: mount, wait for termination, unmount")]
pub struct Cli {
    /// Log level for this crate when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "NGNFS_LOG_LEVEL")]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: AppCommand,
}

#[derive(Subcommand, Debug)]
pub enum AppCommand {
    /// Mount a session and serve it until SIGINT/SIGTERM or the service stops
    Mount(MountArgs),
    /// Report whether a session is currently mounted at a mountpoint
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct MountArgs {
    #[arg(long, env = "NGNFS_MOUNTPOINT")]
    pub mountpoint: PathBuf,
    #[arg(long, value_enum, default_value_t = Topology::Worker)]
    pub topology: Topology,
    /// Join the worker without requesting shutdown first
    #[arg(long = "no-stop-request", action = ArgAction::SetFalse, default_value_t = true)]
    pub request_stop: bool,
    #[arg(long, default_value_t = 5)]
    pub heartbeat_secs: u64,
    #[arg(long, default_value = ".ngnfs.lock")]
    pub lock_file: String,
    #[arg(long, default_value = ".ngnfs.session")]
    pub session_file: String,
    /// Arguments handed to the service unchanged
    #[arg(last = true)]
    pub service_args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, env = "NGNFS_MOUNTPOINT")]
    pub mountpoint: PathBuf,
    #[arg(long, default_value = ".ngnfs.lock")]
    pub lock_file: String,
    #[arg(long, default_value = ".ngnfs.session")]
    pub session_file: String,
}

impl MountArgs {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            topology: self.topology,
            request_stop: self.request_stop,
        }
    }

    pub fn service_config(&self) -> LocalServiceConfig {
        LocalServiceConfig {
            mountpoint: self.mountpoint.clone(),
            lock_file: self.lock_file.clone(),
            session_file: self.session_file.clone(),
            heartbeat: Duration::from_secs(self.heartbeat_secs.max(1)),
            service_args: self.service_args.clone(),
        }
    }
}

impl StatusArgs {
    pub fn lock_path(&self) -> PathBuf {
        self.mountpoint.join(&self.lock_file)
    }

    pub fn session_path(&self) -> PathBuf {
        self.mountpoint.join(&self.session_file)
    }
}

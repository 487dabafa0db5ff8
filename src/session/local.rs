use crate::lifecycle::{ExitStatus, Service, ShutdownSignal};
use crate::shared::lock::LockGuard;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LocalServiceConfig {
    pub mountpoint: PathBuf,
    pub lock_file: String,
    pub session_file: String,
    pub heartbeat: Duration,
    pub service_args: Vec<String>,
}

impl LocalServiceConfig {
    pub fn lock_path(&self) -> PathBuf {
        self.mountpoint.join(&self.lock_file)
    }

    pub fn session_path(&self) -> PathBuf {
        self.mountpoint.join(&self.session_file)
    }
}

// Mount session backed by a local directory: an exclusive lock plus a
// session file that is refreshed while the session is served.
pub struct LocalService {
    config: LocalServiceConfig,
    lock: Option<LockGuard>,
    mounted_at: Option<DateTime<Utc>>,
}

impl LocalService {
    pub fn new(config: LocalServiceConfig) -> Self {
        Self {
            config,
            lock: None,
            mounted_at: None,
        }
    }

    fn establish(&mut self) -> Result<()> {
        fs::create_dir_all(&self.config.mountpoint).with_context(|| {
            format!(
                "creating mountpoint failed: {}",
                self.config.mountpoint.display()
            )
        })?;
        let lock = LockGuard::acquire(&self.config.lock_path())?;
        tracing::debug!(lock = %lock.path().display(), "mountpoint locked");
        self.lock = Some(lock);

        let now = Utc::now();
        self.mounted_at = Some(now);
        self.write_session_file(now)
    }

    fn write_session_file(&self, heartbeat: DateTime<Utc>) -> Result<()> {
        let mounted_at = self.mounted_at.unwrap_or(heartbeat);
        let contents = format!(
            "pid={}\nmounted_at={}\nheartbeat={}\nargs={}\n",
            std::process::id(),
            mounted_at.to_rfc3339(),
            heartbeat.to_rfc3339(),
            self.config.service_args.join(" "),
        );

        // Write then rename so readers never see a torn file.
        let path = self.config.session_path();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)
            .with_context(|| format!("writing session file failed: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("publishing session file failed: {}", path.display()))
    }
}

impl Service for LocalService {
    fn mount(&mut self, _shutdown: &ShutdownSignal) -> ExitStatus {
        match self.establish() {
            Ok(()) => {
                tracing::info!(
                    mountpoint = %self.config.mountpoint.display(),
                    "session established"
                );
                ExitStatus::SUCCESS
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "mount failed");
                error_status(&err)
            }
        }
    }

    fn serve(&mut self, shutdown: &ShutdownSignal) -> ExitStatus {
        let heartbeat = self.config.heartbeat.max(Duration::from_millis(10));
        while !shutdown.wait_timeout(heartbeat) {
            if let Err(err) = self.write_session_file(Utc::now()) {
                tracing::error!(error = %format!("{err:#}"), "heartbeat failed, stopping session");
                return error_status(&err);
            }
            tracing::trace!("session heartbeat");
        }
        tracing::debug!(requested = ?shutdown.requested_status(), "serve loop stopping");
        ExitStatus::SUCCESS
    }

    fn unmount(&mut self) {
        if self.lock.is_none() {
            tracing::debug!("no lock held, nothing to release");
            return;
        }

        let path = self.config.session_path();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "removing session file failed"
                );
            }
        }
        self.lock = None;
        self.mounted_at = None;
    }
}

// Map an anyhow chain to an errno-style status, preferring the OS error code.
fn error_status(err: &anyhow::Error) -> ExitStatus {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .and_then(io::Error::raw_os_error)
        .map_or(ExitStatus::from_errno(libc::EIO), ExitStatus::from_errno)
}

// Contents of a published session file, or None when no session is published.
pub fn read_session(session_path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(session_path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err)
            .with_context(|| format!("reading session file failed: {}", session_path.display())),
    }
}

use crate::args::StatusArgs;
use crate::session::read_session;
use crate::shared::lock::LockGuard;
use anyhow::Result;

// Public status command entrypoint. Returns whether a live session owns the mountpoint.
pub fn run_status(args: StatusArgs) -> Result<bool> {
    if !LockGuard::is_held(&args.lock_path())? {
        println!("{}: not mounted", args.mountpoint.display());
        return Ok(false);
    }

    println!("{}: mounted", args.mountpoint.display());
    match read_session(&args.session_path())? {
        Some(contents) => print!("{contents}"),
        None => tracing::warn!(
            path = %args.session_path().display(),
            "lock is held but no session file is published"
        ),
    }
    Ok(true)
}

//! Cancellable polling primitives shared by the installer and the
//! execution controller.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Polls made while waiting for an executable.
pub const MAX_WAIT_ATTEMPTS: usize = 10;

/// Pause between polls and between spawn attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<(), Cancelled> {
    tokio::select! {
        () = cancel.cancelled() => Err(Cancelled),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Whether `path` exists and carries the owner-execute bit.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.is_file() && metadata.permissions().mode() & 0o100 != 0
    }
    #[cfg(not(unix))]
    {
        metadata.is_file()
    }
}

/// Poll until `exe_path` is executable.
///
/// Returns `Ok(false)` when every attempt is exhausted; callers decide
/// whether that is fatal.
pub async fn wait_for_executable(
    exe_path: &Path,
    cancel: &CancellationToken,
) -> Result<bool, Cancelled> {
    for retry_count in 0..MAX_WAIT_ATTEMPTS {
        if is_executable(exe_path) {
            return Ok(true);
        }
        debug!(exe_path = %exe_path.display(), retry_count = retry_count + 1, "Waiting for executable");
        sleep(cancel, RETRY_INTERVAL).await?;
    }
    Ok(false)
}

//! Deferred deletion of delivered images
//!
//! After an image has been handed to the host, its file is removed on a
//! detached task. Failures are logged and dropped: the caller already has
//! what it needs, and the age-based sweep in [`crate::store`] catches
//! anything left behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Removes `path` after `delay` without blocking the caller.
///
/// Returns `None` (and does nothing) when called outside a Tokio runtime.
/// The returned handle may be awaited to keep the deletion alive through
/// shutdown; dropping it leaves the task running detached.
pub fn schedule_delete(path: impl Into<PathBuf>, delay: Duration) -> Option<JoinHandle<()>> {
    let path = path.into();

    let Ok(runtime) = Handle::try_current() else {
        tracing::debug!(
            "No async runtime running, skipping deferred delete of {}",
            path.display()
        );
        return None;
    };

    Some(runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        delete_now(&path).await;
    }))
}

async fn delete_now(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!("Deleted image after send -> {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Deferred delete of {} ignored: {}", path.display(), e),
    }
}

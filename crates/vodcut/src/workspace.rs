//! Per-job scratch directory holding downloaded segments and the combined stream.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;

/// Directory created under the temp root for all jobs.
const APP_DIR: &str = "vodcut";

/// Scratch directory removed when the job ends, on success, failure or cancellation.
///
/// [`cleanup`](Self::cleanup) removes it asynchronously; if that never runs the directory
/// is removed on drop.
#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    removed: bool,
}

impl WorkingDirectory {
    /// Create `<temp_root>/vodcut/<job>_<unix millis>`.
    pub async fn create(temp_root: &Path, job: &str) -> Result<Self> {
        let path = temp_root.join(APP_DIR).join(format!(
            "{}_{}",
            sanitize(job),
            Utc::now().timestamp_millis()
        ));
        recreate_dir(&path).await?;
        debug!(path = %path.display(), "Created working directory");
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory and everything left in it. Failures are logged, not returned.
    pub async fn cleanup(mut self) {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Removed working directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove working directory")
            }
        }
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// Create `path` empty, discarding anything already there.
async fn recreate_dir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => warn!(path = %path.display(), "Removed stale working directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn sanitize(job: &str) -> String {
    let cleaned: String = job
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "playlist".to_string()
    } else {
        cleaned
    }
}

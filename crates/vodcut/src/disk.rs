//! Free-space probing and the combiner's wait-for-space backpressure.

use std::path::Path;

use parking_lot::Mutex;
use sysinfo::Disks;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DiskWaitConfig;
use crate::error::{Result, VodError};
use crate::progress::{Phase, ProgressSink};

/// Reports the free space on the drive holding a path.
pub trait DiskSpaceProbe: Send + Sync {
    /// `None` when the drive cannot be determined; callers then proceed without waiting.
    fn free_bytes(&self, path: &Path) -> Option<u64>;
}

/// Probe backed by the mounted-disk list from `sysinfo`.
#[derive(Debug)]
pub struct SysinfoDiskProbe {
    disks: Mutex<Disks>,
}

impl SysinfoDiskProbe {
    pub fn new() -> Self {
        Self {
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }
}

impl Default for SysinfoDiskProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskSpaceProbe for SysinfoDiskProbe {
    fn free_bytes(&self, path: &Path) -> Option<u64> {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mut disks = self.disks.lock();
        disks.refresh(true);

        // Most specific mount point wins.
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Block until the drive holding `path` has at least `config.min_free_bytes` free.
///
/// Emits one status event when the wait starts. Fails with [`VodError::Cancelled`] if the
/// token fires, or [`VodError::DiskPressure`] once `config.max_wait` is exceeded.
pub async fn wait_for_free_space(
    probe: &dyn DiskSpaceProbe,
    path: &Path,
    config: &DiskWaitConfig,
    token: &CancellationToken,
    progress: &ProgressSink,
) -> Result<()> {
    let started = Instant::now();
    let mut announced = false;

    loop {
        let free = match probe.free_bytes(path) {
            Some(free) => free,
            None => {
                debug!(path = %path.display(), "Free space unknown, not waiting");
                return Ok(());
            }
        };
        if free >= config.min_free_bytes {
            if announced {
                info!(free_bytes = free, "Disk space recovered, resuming");
            }
            return Ok(());
        }

        if !announced {
            warn!(
                path = %path.display(),
                free_bytes = free,
                required_bytes = config.min_free_bytes,
                "Low disk space, waiting for space to free up"
            );
            progress.status(
                Phase::Combining,
                format!(
                    "Waiting for disk space: {} MiB free, {} MiB required",
                    free / (1024 * 1024),
                    config.min_free_bytes / (1024 * 1024)
                ),
            );
            announced = true;
        }

        if let Some(max_wait) = config.max_wait
            && started.elapsed() >= max_wait
        {
            return Err(VodError::disk_pressure(format!(
                "{free} bytes free on the drive holding {}, {} required; gave up after {:?}",
                path.display(),
                config.min_free_bytes,
                max_wait
            )));
        }

        tokio::select! {
            _ = token.cancelled() => return Err(VodError::Cancelled),
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }
}

//! Sequential concatenation of downloaded segments into a single transport stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DiskWaitConfig;
use crate::disk::{DiskSpaceProbe, wait_for_free_space};
use crate::error::{Result, VodError};
use crate::progress::{PercentTracker, Phase, ProgressSink};

/// Name of the combined stream inside the working directory.
pub const COMBINED_FILE_NAME: &str = "output.ts";

/// Appends segment files in playlist order, deleting each part once it is written.
pub struct Combiner {
    probe: Arc<dyn DiskSpaceProbe>,
    disk: DiskWaitConfig,
}

impl Combiner {
    pub fn new(probe: Arc<dyn DiskSpaceProbe>, disk: DiskWaitConfig) -> Self {
        Self { probe, disk }
    }

    /// Concatenate `file_names` from `directory` into `directory/output.ts`.
    ///
    /// Order follows `file_names`, never download completion. Missing parts are skipped.
    /// Returns the path of the combined file.
    pub async fn combine(
        &self,
        directory: &Path,
        file_names: &[String],
        progress: &ProgressSink,
        token: &CancellationToken,
    ) -> Result<PathBuf> {
        let output_path = directory.join(COMBINED_FILE_NAME);
        let mut writer = BufWriter::new(File::create(&output_path).await?);
        let tracker = PercentTracker::new(Phase::Combining, file_names.len(), progress.clone());
        let mut bytes_written = 0u64;
        let mut skipped = 0usize;

        info!(parts = file_names.len(), output = %output_path.display(), "Combining segments");

        for name in file_names {
            if token.is_cancelled() {
                return Err(VodError::Cancelled);
            }

            // Space is checked before each part so a full drive pauses instead of truncating.
            writer.flush().await?;
            wait_for_free_space(self.probe.as_ref(), directory, &self.disk, token, progress)
                .await?;

            let part_path = directory.join(name);
            match fs::read(&part_path).await {
                Ok(data) => {
                    writer.write_all(&data).await?;
                    bytes_written += data.len() as u64;
                    if let Err(e) = fs::remove_file(&part_path).await {
                        debug!(part = %part_path.display(), error = %e, "Could not delete combined part");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(part = %name, "Segment file missing, skipping");
                    skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }

            tracker.complete_one();
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        info!(bytes = bytes_written, skipped, "Segments combined");
        Ok(output_path)
    }
}

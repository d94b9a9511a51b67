//! Final trim and container remux through an external ffmpeg process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::process::Command;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::CropRange;
use crate::error::{Result, VodError};
use crate::progress::{Phase, ProgressSink};

/// Passed to ffmpeg for both `-analyzeduration` and `-probesize`.
const PROBE_LIMIT: i32 = i32::MAX;

/// Arguments for one remux run.
#[derive(Debug, Clone, PartialEq)]
pub struct RemuxArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Seek into the input, relative to the first retained segment.
    pub seek: Option<f64>,
    /// Limit on the output duration.
    pub duration: Option<f64>,
    /// Length of the produced video if known; used for percent reporting only.
    pub expected_duration: Option<f64>,
}

impl RemuxArgs {
    /// Derive seek and duration from the crop window and the dropped-prefix offset.
    ///
    /// `available` is the summed duration of the retained segments.
    pub fn from_crop(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        crop: &CropRange,
        start_offset: f64,
        available: f64,
    ) -> Self {
        let seek = crop.begin.map(|begin| (begin - start_offset).max(0.0));
        let duration = crop
            .end
            .map(|end| end - crop.begin.unwrap_or(0.0))
            .filter(|d| *d > 0.0);
        let expected_duration =
            duration.or_else(|| Some((available - seek.unwrap_or(0.0)).max(0.0)));

        Self {
            input: input.into(),
            output: output.into(),
            seek,
            duration,
            expected_duration,
        }
    }

    /// ffmpeg command line, excluding the program itself.
    pub fn build(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-loglevel",
            "error",
            "-stats",
            "-y",
            "-avoid_negative_ts",
            "make_zero",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        if let Some(seek) = self.seek {
            args.extend(["-ss".to_string(), format_seconds(seek)]);
        }
        args.extend([
            "-i".to_string(),
            self.input.to_string_lossy().into_owned(),
            "-analyzeduration".to_string(),
            PROBE_LIMIT.to_string(),
            "-probesize".to_string(),
            PROBE_LIMIT.to_string(),
        ]);
        if let Some(duration) = self.duration {
            args.extend(["-t".to_string(), format_seconds(duration)]);
        }
        args.extend([
            "-c:v".to_string(),
            "copy".to_string(),
            self.output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

/// Rust's float formatting is locale independent and round-trips exactly.
fn format_seconds(seconds: f64) -> String {
    format!("{seconds}")
}

/// Runs the final trim/remux step.
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(
        &self,
        args: &RemuxArgs,
        progress: &ProgressSink,
        token: &CancellationToken,
    ) -> Result<()>;
}

pub struct FfmpegRemuxer {
    ffmpeg_path: PathBuf,
}

impl FfmpegRemuxer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn tool_name(&self) -> String {
        self.ffmpeg_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ffmpeg".to_string())
    }
}

/// Create a command that opens no console window on Windows.
fn tool_command(program: &Path) -> Command {
    #[allow(unused_mut)]
    let mut command = Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.as_std_mut().creation_flags(CREATE_NO_WINDOW);
    }
    command
}

/// Parse the `time=HH:MM:SS.ss` field of an ffmpeg `-stats` line.
async fn remove_partial_output(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(output = %output.display(), error = %e, "Could not remove partial output");
    }
}

fn parse_stats_time(line: &str) -> Option<f64> {
    let value = line.split("time=").nth(1)?.split_whitespace().next()?;
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(
        &self,
        args: &RemuxArgs,
        progress: &ProgressSink,
        token: &CancellationToken,
    ) -> Result<()> {
        if let Some(parent) = args.output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let argv = args.build();
        debug!(ffmpeg = %self.ffmpeg_path.display(), args = ?argv, "Starting remux");
        progress.status(Phase::Finalizing, "Finalizing video");

        let mut child = tool_command(&self.ffmpeg_path)
            .args(&argv)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VodError::external_tool(
                    self.tool_name(),
                    None,
                    format!("failed to start {}: {e}", self.ffmpeg_path.display()),
                )
            })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let expected = args.expected_duration.filter(|d| *d > 0.0);
            let progress = progress.clone();
            tokio::spawn(async move {
                // -stats rewrites its line with '\r', errors end with '\n'.
                let mut lines = FramedRead::new(
                    stderr,
                    AnyDelimiterCodec::new(b"\r\n".to_vec(), b"\n".to_vec()),
                );
                let mut last_line = None;
                let mut last_percent = None;
                while let Some(Ok(chunk)) = lines.next().await {
                    let line = String::from_utf8_lossy(&chunk).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if let (Some(total), Some(time)) = (expected, parse_stats_time(&line)) {
                        let percent = ((time / total) * 100.0).clamp(0.0, 100.0) as u8;
                        if last_percent.is_none_or(|p| percent > p) {
                            progress.percent(Phase::Finalizing, percent);
                            last_percent = Some(percent);
                        }
                        trace!("ffmpeg: {line}");
                    } else {
                        debug!("ffmpeg: {line}");
                        last_line = Some(line);
                    }
                }
                last_line
            })
        });

        let status = tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelling remux, stopping ffmpeg");
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Failed to kill ffmpeg");
                }
                remove_partial_output(&args.output).await;
                return Err(VodError::Cancelled);
            }
            status = child.wait() => status?,
        };

        let last_line = match stderr_task {
            Some(task) => task.await.ok().flatten(),
            None => None,
        };

        if !status.success() {
            remove_partial_output(&args.output).await;
            return Err(VodError::external_tool(
                self.tool_name(),
                status.code(),
                last_line.unwrap_or_else(|| "no error output".to_string()),
            ));
        }

        progress.percent(Phase::Finalizing, 100);
        info!(output = %args.output.display(), "Remux finished");
        Ok(())
    }
}

//! HTTP, retry and disk-wait tunables plus the per-job download options.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::{Result, VodError};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// HTTP client options shared by the manifest fetcher and the segment transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Overall timeout for a single request. Zero disables it.
    pub timeout: Duration,

    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,

    /// Maximum time between two received chunks.
    pub read_timeout: Duration,

    pub follow_redirects: bool,

    pub user_agent: String,

    /// Extra headers sent with every request.
    pub headers: HeaderMap,

    /// Whether to honour the system proxy settings.
    pub use_system_proxy: bool,

    /// Idle connections kept per host. Should be at least the download concurrency.
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(0),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::default_headers(),
            use_system_proxy: true,
            pool_max_idle_per_host: 10,
        }
    }
}

impl HttpConfig {
    pub fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers
    }
}

/// Per-segment retry behaviour.
#[derive(Debug, Clone)]
pub struct SegmentRetryConfig {
    /// Failed attempts tolerated for one segment before the job fails.
    pub max_attempts: u32,
    /// Fixed pause after a non-forbidden failure.
    pub delay: Duration,
}

impl Default for SegmentRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(10),
        }
    }
}

/// Backpressure applied by the combiner when the working drive runs low.
#[derive(Debug, Clone)]
pub struct DiskWaitConfig {
    /// Writing pauses while free space is below this many bytes.
    pub min_free_bytes: u64,
    pub poll_interval: Duration,
    /// Give up with [`VodError::DiskPressure`] after waiting this long. `None` waits forever.
    pub max_wait: Option<Duration>,
}

impl Default for DiskWaitConfig {
    fn default() -> Self {
        Self {
            min_free_bytes: 100 * 1024 * 1024,
            poll_interval: Duration::from_secs(5),
            max_wait: None,
        }
    }
}

/// Engine tunables. The defaults are the production values.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub http: HttpConfig,
    pub retry: SegmentRetryConfig,
    /// Unmuted originals are only requested for VODs younger than this.
    pub unmute_max_age_hours: f64,
    pub disk: DiskWaitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            retry: SegmentRetryConfig::default(),
            unmute_max_age_hours: 24.0,
            disk: DiskWaitConfig::default(),
        }
    }
}

/// Time window to keep, in seconds from the start of the VOD. `None` leaves that end uncropped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CropRange {
    pub begin: Option<f64>,
    pub end: Option<f64>,
}

impl CropRange {
    pub fn new(begin: Option<f64>, end: Option<f64>) -> Self {
        Self { begin, end }
    }

    pub fn is_empty_window(&self) -> bool {
        matches!((self.begin, self.end), (Some(b), Some(e)) if b >= e)
    }
}

/// Everything a single download job needs. Built once, never mutated while the job runs.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub video_id: String,
    /// Media playlist URL; skips the token request and quality selection when present.
    pub playlist_url: Option<String>,
    /// Quality label prefix, e.g. `720p` or `1080p60`.
    pub quality: Option<String>,
    pub crop: CropRange,
    pub download_threads: usize,
    pub temp_root: PathBuf,
    pub output: PathBuf,
    pub ffmpeg_path: PathBuf,
    /// OAuth token forwarded to the access token request.
    pub oauth: Option<String>,
}

impl DownloadOptions {
    pub fn builder(video_id: impl Into<String>, output: impl Into<PathBuf>) -> DownloadOptionsBuilder {
        DownloadOptionsBuilder::new(video_id, output)
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_id.trim().is_empty() && self.playlist_url.is_none() {
            return Err(VodError::configuration(
                "either a video id or a playlist URL is required",
            ));
        }
        if self.download_threads == 0 {
            return Err(VodError::configuration("download threads must be at least 1"));
        }
        for (name, value) in [("beginning", self.crop.begin), ("ending", self.crop.end)] {
            if let Some(v) = value
                && (!v.is_finite() || v < 0.0)
            {
                return Err(VodError::configuration(format!(
                    "crop {name} must be a non-negative number of seconds, got {v}"
                )));
            }
        }
        if self.crop.is_empty_window() {
            return Err(VodError::configuration(format!(
                "crop beginning ({}) must be before crop ending ({})",
                self.crop.begin.unwrap_or_default(),
                self.crop.end.unwrap_or_default()
            )));
        }
        if self.output.as_os_str().is_empty() {
            return Err(VodError::configuration("output path is empty"));
        }
        Ok(())
    }
}

pub struct DownloadOptionsBuilder {
    options: DownloadOptions,
}

impl DownloadOptionsBuilder {
    pub fn new(video_id: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            options: DownloadOptions {
                video_id: video_id.into(),
                playlist_url: None,
                quality: None,
                crop: CropRange::default(),
                download_threads: 4,
                temp_root: std::env::temp_dir(),
                output: output.into(),
                ffmpeg_path: PathBuf::from("ffmpeg"),
                oauth: None,
            },
        }
    }

    pub fn with_playlist_url(mut self, url: impl Into<String>) -> Self {
        self.options.playlist_url = Some(url.into());
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.options.quality = Some(quality.into());
        self
    }

    pub fn with_crop_begin(mut self, seconds: f64) -> Self {
        self.options.crop.begin = Some(seconds);
        self
    }

    pub fn with_crop_end(mut self, seconds: f64) -> Self {
        self.options.crop.end = Some(seconds);
        self
    }

    pub fn with_crop(mut self, crop: CropRange) -> Self {
        self.options.crop = crop;
        self
    }

    pub fn with_download_threads(mut self, threads: usize) -> Self {
        self.options.download_threads = threads;
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.temp_root = root.into();
        self
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.ffmpeg_path = path.into();
        self
    }

    pub fn with_oauth(mut self, token: impl Into<String>) -> Self {
        self.options.oauth = Some(token.into());
        self
    }

    pub fn build(self) -> DownloadOptions {
        self.options
    }
}

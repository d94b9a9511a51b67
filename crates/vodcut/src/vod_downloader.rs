//! Job orchestration: resolve, crop, download, combine, finalize, clean up.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::{HttpTransport, Transport, create_client, get_text};
use crate::combine::Combiner;
use crate::config::{DownloadOptions, EngineConfig};
use crate::crop::{CroppedSegmentList, crop_segments};
use crate::disk::{DiskSpaceProbe, SysinfoDiskProbe};
use crate::downloader::{DownloadRequest, SegmentDownloader};
use crate::error::{Result, VodError};
use crate::manifest::{ManifestSource, TwitchGqlSource};
use crate::playlist::{MediaPlaylistInfo, parse_media_playlist, parse_variant_playlist};
use crate::progress::{ProgressCallback, ProgressSink};
use crate::remux::{FfmpegRemuxer, RemuxArgs, Remuxer};
use crate::workspace::WorkingDirectory;

/// Pluggable collaborators of a [`VodDownloader`].
pub struct Components {
    pub manifest: Arc<dyn ManifestSource>,
    pub transport: Arc<dyn Transport>,
    pub disk_probe: Arc<dyn DiskSpaceProbe>,
    pub remuxer: Arc<dyn Remuxer>,
}

/// Media playlist resolved and cropped, ready to download.
struct PreparedJob {
    playlist: MediaPlaylistInfo,
    cropped: CroppedSegmentList,
}

/// Downloads one VOD, optionally cropped, into `options.output`.
pub struct VodDownloader {
    options: DownloadOptions,
    config: EngineConfig,
    components: Components,
}

impl VodDownloader {
    /// Downloader wired to the live platform, `sysinfo` disk probing and ffmpeg.
    pub fn new(options: DownloadOptions, config: EngineConfig) -> Result<Self> {
        let client = create_client(&config.http)?;
        let components = Components {
            manifest: Arc::new(TwitchGqlSource::new(client.clone())),
            transport: Arc::new(HttpTransport::new(client)),
            disk_probe: Arc::new(SysinfoDiskProbe::new()),
            remuxer: Arc::new(FfmpegRemuxer::new(options.ffmpeg_path.clone())),
        };
        Ok(Self::with_components(options, config, components))
    }

    pub fn with_components(
        options: DownloadOptions,
        config: EngineConfig,
        components: Components,
    ) -> Self {
        Self {
            options,
            config,
            components,
        }
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Run the whole job and return the absolute path of the produced file.
    ///
    /// Nothing touches the filesystem until the playlist is resolved and cropped. Once the
    /// working directory exists it is removed on every exit path.
    pub async fn run(
        &self,
        progress: Option<ProgressCallback>,
        token: &CancellationToken,
    ) -> Result<PathBuf> {
        self.options.validate()?;
        let progress = ProgressSink::from(progress);

        let prepared = tokio::select! {
            _ = token.cancelled() => return Err(VodError::Cancelled),
            prepared = self.prepare() => prepared?,
        };

        let output = std::path::absolute(&self.options.output)?;
        let workdir = WorkingDirectory::create(&self.options.temp_root, &self.job_name()).await?;

        let result = self
            .execute(&workdir, &prepared, output, &progress, token)
            .await;
        workdir.cleanup().await;

        match &result {
            Ok(path) => info!(output = %path.display(), "Download complete"),
            Err(e) if e.is_cancelled() => info!("Download cancelled"),
            Err(e) => warn!(error = %e, "Download failed"),
        }
        result
    }

    fn job_name(&self) -> String {
        if self.options.video_id.trim().is_empty() {
            "playlist".to_string()
        } else {
            self.options.video_id.clone()
        }
    }

    async fn prepare(&self) -> Result<PreparedJob> {
        let playlist_url = self.resolve_playlist_url().await?;
        let text = get_text(self.components.transport.as_ref(), &playlist_url).await?;
        let playlist = parse_media_playlist(&text, &playlist_url, Utc::now())?;

        let cropped = crop_segments(&playlist.segments, &self.options.crop);
        if cropped.is_empty() {
            return Err(VodError::configuration(format!(
                "crop window selects no segments (VOD length {:.1}s)",
                playlist.total_duration()
            )));
        }

        info!(
            segments = cropped.len(),
            total_segments = playlist.segments.len(),
            start_offset = cropped.start_offset,
            age_hours = %format!("{:.1}", playlist.age_hours),
            "Playlist prepared"
        );
        Ok(PreparedJob { playlist, cropped })
    }

    async fn resolve_playlist_url(&self) -> Result<Url> {
        if let Some(raw) = &self.options.playlist_url {
            return Url::parse(raw).map_err(|e| VodError::invalid_url(raw, e.to_string()));
        }

        let video_id = self.options.video_id.trim();
        let manifest = &self.components.manifest;
        let access = manifest
            .playback_access_token(video_id, self.options.oauth.as_deref())
            .await?;
        let master = manifest.variant_playlist(video_id, &access).await?;
        let variants = parse_variant_playlist(&master.text, &master.url)?;
        let variant = variants.select(self.options.quality.as_deref())?;

        info!(quality = %variant.label, "Selected quality");
        debug!(url = %variant.url, "Media playlist");
        Ok(variant.url.clone())
    }

    async fn execute(
        &self,
        workdir: &WorkingDirectory,
        prepared: &PreparedJob,
        output: PathBuf,
        progress: &ProgressSink,
        token: &CancellationToken,
    ) -> Result<PathBuf> {
        let attempt_unmute = prepared.playlist.age_hours < self.config.unmute_max_age_hours;

        SegmentDownloader::new(
            self.components.transport.clone(),
            self.config.retry.clone(),
            self.options.download_threads,
        )
        .download_all(
            DownloadRequest {
                segments: &prepared.cropped.segments,
                base_url: &prepared.playlist.base_url,
                directory: workdir.path(),
                attempt_unmute,
            },
            progress,
            token,
        )
        .await?;

        let file_names: Vec<String> = prepared
            .cropped
            .segments
            .iter()
            .map(|s| s.file_name())
            .collect();
        let combined = Combiner::new(
            self.components.disk_probe.clone(),
            self.config.disk.clone(),
        )
        .combine(workdir.path(), &file_names, progress, token)
        .await?;

        if token.is_cancelled() {
            return Err(VodError::Cancelled);
        }

        let args = RemuxArgs::from_crop(
            combined,
            output.clone(),
            &self.options.crop,
            prepared.cropped.start_offset,
            prepared.cropped.duration(),
        );
        self.components
            .remuxer
            .remux(&args, progress, token)
            .await?;

        Ok(output)
    }
}

//! Downloads a platform VOD as HLS segments, optionally cropped to a time window, and
//! remuxes the result with ffmpeg.
//!
//! The pipeline runs in fixed phases: resolve the playlist, crop the segment list,
//! download segments in parallel, combine them in playlist order, then trim and remux.
//! [`VodDownloader`] drives a whole job; the phases are also usable on their own.

pub mod client;
pub mod combine;
pub mod config;
pub mod crop;
pub mod disk;
pub mod downloader;
pub mod error;
pub mod manifest;
pub mod playlist;
pub mod progress;
pub mod remux;
pub mod vod_downloader;
pub mod workspace;

pub use client::{HttpTransport, Transport, create_client};
pub use combine::Combiner;
pub use config::{
    CropRange, DiskWaitConfig, DownloadOptions, DownloadOptionsBuilder, EngineConfig, HttpConfig,
    SegmentRetryConfig,
};
pub use crop::{CroppedSegmentList, crop_segments};
pub use disk::{DiskSpaceProbe, SysinfoDiskProbe};
pub use downloader::{DownloadRequest, SegmentDownloader};
pub use error::{Result, TransportError, VodError};
pub use manifest::{FetchedPlaylist, ManifestSource, PlaybackAccessToken, TwitchGqlSource};
pub use playlist::{MediaPlaylistInfo, Segment, Variant, VariantPlaylist};
pub use progress::{Phase, ProgressCallback, ProgressEvent, ProgressSink};
pub use remux::{FfmpegRemuxer, RemuxArgs, Remuxer};
pub use vod_downloader::{Components, VodDownloader};
pub use workspace::WorkingDirectory;

pub use tokio_util::sync::CancellationToken;

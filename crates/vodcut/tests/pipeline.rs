//! End-to-end runs of `VodDownloader` against in-memory platform, network, disk and ffmpeg fakes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use url::Url;
use vodcut_engine::{
    CancellationToken, Components, DiskSpaceProbe, DownloadOptions, EngineConfig,
    FetchedPlaylist, ManifestSource, PlaybackAccessToken, ProgressEvent, RemuxArgs, Remuxer,
    Result, Transport, TransportError, VodDownloader, VodError,
};

const MASTER_URL: &str = "https://usher.test/vod/1000.m3u8";
const MEDIA_URL: &str = "https://cdn.test/abc/chunked/index-dvr.m3u8";

fn master_playlist() -> String {
    "#EXTM3U
#EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID=\"chunked\",NAME=\"1080p60\",AUTOSELECT=YES,DEFAULT=YES
#EXT-X-STREAM-INF:BANDWIDTH=6000000,RESOLUTION=1920x1080,VIDEO=\"chunked\"
https://cdn.test/abc/chunked/index-dvr.m3u8
#EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID=\"480p30\",NAME=\"480p\",AUTOSELECT=YES,DEFAULT=YES
#EXT-X-STREAM-INF:BANDWIDTH=1400000,RESOLUTION=852x480,VIDEO=\"480p30\"
https://cdn.test/abc/480p30/index-dvr.m3u8
"
    .to_string()
}

/// Four 10 second segments; the second is muted. A fresh timestamp makes the VOD young.
fn media_playlist(fresh: bool) -> String {
    let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n");
    if fresh {
        let recorded = chrono::Utc::now() - chrono::Duration::hours(1);
        text.push_str(&format!(
            "#ID3-EQUIV-TDTG:{}\n",
            recorded.format("%Y-%m-%dT%H:%M:%S")
        ));
    }
    for uri in ["0.ts", "1-muted.ts", "2.ts", "3.ts"] {
        text.push_str(&format!("#EXTINF:10.000,\n{uri}\n"));
    }
    text.push_str("#EXT-X-ENDLIST\n");
    text
}

struct FakeManifest {
    token_calls: AtomicU32,
}

#[async_trait]
impl ManifestSource for FakeManifest {
    async fn playback_access_token(
        &self,
        _video_id: &str,
        _oauth: Option<&str>,
    ) -> Result<PlaybackAccessToken> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PlaybackAccessToken {
            value: "token".to_string(),
            signature: "sig".to_string(),
        })
    }

    async fn variant_playlist(
        &self,
        _video_id: &str,
        _token: &PlaybackAccessToken,
    ) -> Result<FetchedPlaylist> {
        Ok(FetchedPlaylist {
            url: Url::parse(MASTER_URL).unwrap(),
            text: master_playlist(),
        })
    }
}

struct FailingManifest;

#[async_trait]
impl ManifestSource for FailingManifest {
    async fn playback_access_token(
        &self,
        video_id: &str,
        _oauth: Option<&str>,
    ) -> Result<PlaybackAccessToken> {
        Err(VodError::manifest(format!("video {video_id} not found")))
    }

    async fn variant_playlist(
        &self,
        _video_id: &str,
        _token: &PlaybackAccessToken,
    ) -> Result<FetchedPlaylist> {
        unreachable!("token request always fails")
    }
}

/// What a fake URL answers.
#[derive(Clone)]
enum Reply {
    Body(Vec<u8>),
    Status(StatusCode),
    /// Fail with 500 this many times, then serve the body.
    FlakyThen(u32, Vec<u8>),
    /// Never answers; only cancellation ends the request.
    Hang,
}

#[derive(Default)]
struct FakeTransport {
    routes: Mutex<HashMap<String, Reply>>,
    hits: Mutex<HashMap<String, u32>>,
}

impl FakeTransport {
    fn route(self, url: &str, reply: Reply) -> Self {
        self.routes.lock().insert(url.to_string(), reply);
        self
    }

    fn hits(&self, url: &str) -> u32 {
        self.hits.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &Url) -> std::result::Result<Bytes, TransportError> {
        let key = url.as_str().to_string();
        let hit = {
            let mut hits = self.hits.lock();
            let count = hits.entry(key.clone()).or_default();
            *count += 1;
            *count
        };
        let reply = self.routes.lock().get(&key).cloned();
        match reply {
            Some(Reply::Body(body)) => Ok(Bytes::from(body)),
            Some(Reply::Status(status)) => Err(TransportError::from_status(status, key)),
            Some(Reply::FlakyThen(failures, body)) => {
                if hit <= failures {
                    Err(TransportError::from_status(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        key,
                    ))
                } else {
                    Ok(Bytes::from(body))
                }
            }
            Some(Reply::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(TransportError::from_status(StatusCode::NOT_FOUND, key)),
        }
    }
}

struct PlentyOfSpace;

impl DiskSpaceProbe for PlentyOfSpace {
    fn free_bytes(&self, _path: &Path) -> Option<u64> {
        Some(u64::MAX)
    }
}

/// Copies the combined stream to the output and records the arguments it was given.
#[derive(Default)]
struct RecordingRemuxer {
    calls: Mutex<Vec<RemuxArgs>>,
    combined: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl Remuxer for RecordingRemuxer {
    async fn remux(
        &self,
        args: &RemuxArgs,
        _progress: &vodcut_engine::ProgressSink,
        _token: &CancellationToken,
    ) -> Result<()> {
        let data = tokio::fs::read(&args.input).await?;
        if let Some(parent) = args.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&args.output, &data).await?;
        *self.combined.lock() = Some(data);
        self.calls.lock().push(args.clone());
        Ok(())
    }
}

fn segment_url(name: &str) -> String {
    format!("https://cdn.test/abc/chunked/{name}")
}

fn healthy_transport(fresh: bool) -> FakeTransport {
    FakeTransport::default()
        .route(MEDIA_URL, Reply::Body(media_playlist(fresh).into_bytes()))
        .route(&segment_url("0.ts"), Reply::Body(b"[0]".to_vec()))
        .route(&segment_url("1-muted.ts"), Reply::Body(b"[1m]".to_vec()))
        .route(&segment_url("1.ts"), Reply::Body(b"[1]".to_vec()))
        .route(&segment_url("2.ts"), Reply::Body(b"[2]".to_vec()))
        .route(&segment_url("3.ts"), Reply::Body(b"[3]".to_vec()))
}

fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.delay = Duration::from_millis(1);
    config.disk.poll_interval = Duration::from_millis(1);
    config
}

struct Harness {
    temp_root: tempfile::TempDir,
    out_dir: tempfile::TempDir,
    transport: Arc<FakeTransport>,
    remuxer: Arc<RecordingRemuxer>,
    manifest: Arc<FakeManifest>,
}

impl Harness {
    fn new(transport: FakeTransport) -> Self {
        Self {
            temp_root: tempfile::tempdir().unwrap(),
            out_dir: tempfile::tempdir().unwrap(),
            transport: Arc::new(transport),
            remuxer: Arc::new(RecordingRemuxer::default()),
            manifest: Arc::new(FakeManifest {
                token_calls: AtomicU32::new(0),
            }),
        }
    }

    fn output(&self) -> PathBuf {
        self.out_dir.path().join("nested").join("vod.mp4")
    }

    fn options(&self) -> vodcut_engine::DownloadOptionsBuilder {
        DownloadOptions::builder("1000", self.output())
            .with_temp_root(self.temp_root.path())
            .with_download_threads(3)
    }

    fn downloader(&self, options: DownloadOptions) -> VodDownloader {
        self.downloader_with(options, self.manifest.clone())
    }

    fn downloader_with(
        &self,
        options: DownloadOptions,
        manifest: Arc<dyn ManifestSource>,
    ) -> VodDownloader {
        VodDownloader::with_components(
            options,
            fast_config(),
            Components {
                manifest,
                transport: self.transport.clone(),
                disk_probe: Arc::new(PlentyOfSpace),
                remuxer: self.remuxer.clone(),
            },
        )
    }

    /// Directories left under `<temp_root>/vodcut`.
    fn leftover_workdirs(&self) -> usize {
        std::fs::read_dir(self.temp_root.path().join("vodcut"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    fn combined(&self) -> Vec<u8> {
        self.remuxer.combined.lock().clone().unwrap_or_default()
    }
}

#[tokio::test]
async fn downloads_full_vod_in_playlist_order() {
    let harness = Harness::new(healthy_transport(false));
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();

    let output = harness
        .downloader(harness.options().build())
        .run(
            Some(Arc::new(move |event: ProgressEvent| {
                captured.lock().push(event)
            })),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output, harness.output());
    assert!(output.is_absolute());
    // Old VOD: muted segment is fetched as listed.
    assert_eq!(harness.combined(), b"[0][1m][2][3]");
    assert_eq!(harness.transport.hits(&segment_url("1.ts")), 0);
    assert_eq!(harness.manifest.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.leftover_workdirs(), 0);

    let calls = harness.remuxer.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].seek, None);
    assert_eq!(calls[0].duration, None);

    let events = events.lock();
    assert!(events.contains(&ProgressEvent::Percent {
        phase: vodcut_engine::Phase::Downloading,
        percent: 100
    }));
    assert!(events.contains(&ProgressEvent::Percent {
        phase: vodcut_engine::Phase::Combining,
        percent: 100
    }));
}

#[tokio::test]
async fn crop_downloads_only_covering_segments() {
    let harness = Harness::new(healthy_transport(false));
    let options = harness
        .options()
        .with_crop_begin(15.0)
        .with_crop_end(25.0)
        .build();

    harness
        .downloader(options)
        .run(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.combined(), b"[1m][2]");
    assert_eq!(harness.transport.hits(&segment_url("0.ts")), 0);
    assert_eq!(harness.transport.hits(&segment_url("3.ts")), 0);

    let calls = harness.remuxer.calls.lock();
    assert_eq!(calls[0].seek, Some(5.0));
    assert_eq!(calls[0].duration, Some(10.0));
}

#[tokio::test]
async fn young_vod_prefers_unmuted_audio() {
    let harness = Harness::new(healthy_transport(true));
    harness
        .downloader(harness.options().build())
        .run(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.combined(), b"[0][1][2][3]");
    assert_eq!(harness.transport.hits(&segment_url("1-muted.ts")), 0);
}

#[tokio::test]
async fn forbidden_unmute_falls_back_without_failing() {
    let transport =
        healthy_transport(true).route(&segment_url("1.ts"), Reply::Status(StatusCode::FORBIDDEN));
    let harness = Harness::new(transport);
    harness
        .downloader(harness.options().build())
        .run(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.combined(), b"[0][1m][2][3]");
    assert_eq!(harness.transport.hits(&segment_url("1.ts")), 1);
    assert_eq!(harness.transport.hits(&segment_url("1-muted.ts")), 1);
}

#[tokio::test]
async fn forbidden_unmute_stops_unmuting_later_segments() {
    let playlist = media_playlist(true)
        .replace("\n2.ts\n", "\n2-muted.ts\n")
        .replace("\n3.ts\n", "\n3-muted.ts\n");
    let transport = healthy_transport(true)
        .route(MEDIA_URL, Reply::Body(playlist.into_bytes()))
        .route(&segment_url("1.ts"), Reply::Status(StatusCode::FORBIDDEN))
        .route(&segment_url("2-muted.ts"), Reply::Body(b"[2m]".to_vec()))
        .route(&segment_url("3-muted.ts"), Reply::Body(b"[3m]".to_vec()));
    let harness = Harness::new(transport);
    harness
        .downloader(harness.options().with_download_threads(1).build())
        .run(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.combined(), b"[0][1m][2m][3m]");
    assert_eq!(harness.transport.hits(&segment_url("1.ts")), 1);
    assert_eq!(harness.transport.hits(&segment_url("2.ts")), 0);
    assert_eq!(harness.transport.hits(&segment_url("3.ts")), 0);
    assert_eq!(harness.transport.hits(&segment_url("2-muted.ts")), 1);
    assert_eq!(harness.transport.hits(&segment_url("3-muted.ts")), 1);
}

#[tokio::test]
async fn segment_recovers_on_last_allowed_attempt() {
    let transport =
        healthy_transport(false).route(&segment_url("2.ts"), Reply::FlakyThen(9, b"[2]".to_vec()));
    let harness = Harness::new(transport);
    harness
        .downloader(harness.options().build())
        .run(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.transport.hits(&segment_url("2.ts")), 10);
    assert_eq!(harness.combined(), b"[0][1m][2][3]");
}

#[tokio::test]
async fn exhausted_segment_fails_job_and_cleans_up() {
    let transport = healthy_transport(false)
        .route(&segment_url("2.ts"), Reply::FlakyThen(10, b"[2]".to_vec()));
    let harness = Harness::new(transport);
    let err = harness
        .downloader(harness.options().build())
        .run(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VodError::SegmentFetchExhausted { attempts: 10, .. }
    ));
    assert_eq!(harness.transport.hits(&segment_url("2.ts")), 10);
    assert!(harness.remuxer.calls.lock().is_empty());
    assert!(!harness.output().exists());
    assert_eq!(harness.leftover_workdirs(), 0);
}

#[tokio::test]
async fn cancellation_removes_working_directory() {
    let transport = healthy_transport(false).route(&segment_url("3.ts"), Reply::Hang);
    let harness = Harness::new(transport);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = harness
        .downloader(harness.options().build())
        .run(None, &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(harness.remuxer.calls.lock().is_empty());
    assert!(!harness.output().exists());
    assert_eq!(harness.leftover_workdirs(), 0);
}

#[tokio::test]
async fn manifest_failure_has_no_filesystem_side_effects() {
    let harness = Harness::new(healthy_transport(false));
    let err = harness
        .downloader_with(harness.options().build(), Arc::new(FailingManifest))
        .run(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VodError::Manifest { .. }));
    assert!(!harness.temp_root.path().join("vodcut").exists());
}

#[tokio::test]
async fn empty_crop_window_is_a_configuration_error() {
    let harness = Harness::new(healthy_transport(false));
    let options = harness.options().with_crop_begin(500.0).build();
    let err = harness
        .downloader(options)
        .run(None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, VodError::Configuration { .. }));
    assert!(!harness.temp_root.path().join("vodcut").exists());
    assert_eq!(harness.transport.hits(&segment_url("0.ts")), 0);
}

#[tokio::test]
async fn playlist_url_skips_token_request() {
    let harness = Harness::new(healthy_transport(false));
    let options = DownloadOptions::builder("", harness.output())
        .with_temp_root(harness.temp_root.path())
        .with_playlist_url(MEDIA_URL)
        .build();

    harness
        .downloader(options)
        .run(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.manifest.token_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.combined(), b"[0][1m][2][3]");
}

#[tokio::test]
async fn unknown_quality_falls_back_to_first_variant() {
    let harness = Harness::new(healthy_transport(false));
    let options = harness.options().with_quality("144p").build();
    harness
        .downloader(options)
        .run(None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harness.transport.hits(MEDIA_URL), 1);
}

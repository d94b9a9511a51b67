//! Turns master and media playlists into the variant map and the ordered segment list.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist, parse_playlist_res};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, VodError};

/// Marker the platform inserts in the file name of segments whose audio was removed.
pub const MUTED_MARKER: &str = "-muted";

/// Comment tag carrying the recording timestamp of a VOD.
const TIMESTAMP_TAG: &str = "#ID3-EQUIV-TDTG:";

/// Age assumed when the playlist carries no usable timestamp. Old enough to skip unmuting.
pub const UNKNOWN_AGE_HOURS: f64 = 25.0;

/// One independently fetchable chunk of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub uri: String,
    pub duration: f64,
    pub muted: bool,
}

impl Segment {
    pub fn new(uri: impl Into<String>, duration: f64) -> Self {
        let uri = uri.into();
        let muted = uri.contains(MUTED_MARKER);
        Self {
            uri,
            duration,
            muted,
        }
    }

    /// URI of the original, unmuted audio variant.
    pub fn unmuted_uri(&self) -> String {
        self.uri.replace(MUTED_MARKER, "")
    }

    /// Local file name: the last path component with any query string removed.
    ///
    /// Old manifests embed offsets such as `1.ts?start_offset=0`, which are not valid
    /// file names everywhere.
    pub fn file_name(&self) -> String {
        segment_file_name(&self.uri)
    }
}

pub fn segment_file_name(uri: &str) -> String {
    let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
    without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string()
}

/// A quality label and the media playlist serving it.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub label: String,
    pub url: Url,
}

/// Quality variants in manifest order, highest quality first by platform convention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantPlaylist {
    variants: Vec<Variant>,
}

impl VariantPlaylist {
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn get(&self, label_prefix: &str) -> Option<&Variant> {
        self.variants
            .iter()
            .find(|v| v.label.starts_with(label_prefix))
    }

    /// Pick the variant whose label starts with `quality`, falling back to the first one.
    pub fn select(&self, quality: Option<&str>) -> Result<&Variant> {
        if let Some(quality) = quality {
            if let Some(variant) = self.get(quality) {
                return Ok(variant);
            }
            warn!(
                quality,
                available = ?self.labels(),
                "Requested quality not found, using the highest available"
            );
        }
        self.variants
            .first()
            .ok_or_else(|| VodError::configuration("the manifest lists no quality variants"))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.label.as_str()).collect()
    }
}

/// Parsed media playlist: ordered segments, age of the recording and the base for relative URIs.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylistInfo {
    pub segments: Vec<Segment>,
    pub age_hours: f64,
    pub base_url: Url,
}

impl MediaPlaylistInfo {
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

fn parse(text: &str) -> Result<Playlist> {
    parse_playlist_res(text.as_bytes())
        .map_err(|e| VodError::playlist(format!("failed to parse playlist: {e}")))
}

/// Parse a master playlist into its quality variants.
///
/// Labels come from the `NAME` of the `#EXT-X-MEDIA` entry linked through the variant's
/// video group. Only the first variant for each label is kept.
pub fn parse_variant_playlist(text: &str, master_url: &Url) -> Result<VariantPlaylist> {
    let master = match parse(text)? {
        Playlist::MasterPlaylist(master) => master,
        Playlist::MediaPlaylist(_) => {
            return Err(VodError::playlist(
                "expected a master playlist, got a media playlist",
            ));
        }
    };

    let mut seen = HashSet::new();
    let mut variants = Vec::new();
    for stream in master.variants.iter().filter(|v| !v.is_i_frame) {
        let label = variant_label(&master, stream);
        if !seen.insert(label.clone()) {
            continue;
        }
        let url = master_url.join(&stream.uri).map_err(|e| {
            VodError::invalid_url(&stream.uri, format!("cannot resolve variant URI: {e}"))
        })?;
        variants.push(Variant { label, url });
    }

    debug!(count = variants.len(), "Parsed quality variants");
    Ok(VariantPlaylist { variants })
}

fn variant_label(master: &MasterPlaylist, stream: &m3u8_rs::VariantStream) -> String {
    let group = stream.video.as_deref();
    group
        .and_then(|group| {
            master
                .alternatives
                .iter()
                .find(|media| media.group_id == group)
                .map(|media| media.name.clone())
        })
        .or_else(|| group.map(str::to_string))
        .or_else(|| stream.resolution.map(|r| format!("{}p", r.height)))
        .unwrap_or_else(|| stream.uri.clone())
}

/// Parse a media playlist fetched from `playlist_url`, measuring its age against `now`.
pub fn parse_media_playlist(
    text: &str,
    playlist_url: &Url,
    now: DateTime<Utc>,
) -> Result<MediaPlaylistInfo> {
    let playlist = match parse(text)? {
        Playlist::MediaPlaylist(media) => media,
        Playlist::MasterPlaylist(_) => {
            return Err(VodError::playlist(
                "expected a media playlist, got a master playlist",
            ));
        }
    };

    let segments = collect_segments(&playlist);
    let age_hours = playlist_age_hours(text, now).unwrap_or(UNKNOWN_AGE_HOURS);
    let base_url = base_url(playlist_url)?;

    debug!(
        segments = segments.len(),
        age_hours = %format!("{age_hours:.1}"),
        base_url = %base_url,
        "Parsed media playlist"
    );

    Ok(MediaPlaylistInfo {
        segments,
        age_hours,
        base_url,
    })
}

/// Flatten the playlist into logical segments.
///
/// Byte-range entries that share a URI are one file fetched once, so their durations
/// accumulate on the first entry for that URI.
fn collect_segments(playlist: &MediaPlaylist) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::with_capacity(playlist.segments.len());
    let mut first_index: HashMap<&str, usize> = HashMap::new();

    for media_segment in &playlist.segments {
        let duration = exact_duration(media_segment.duration);
        let uri = media_segment.uri.as_str();

        if media_segment.byte_range.is_some()
            && let Some(&index) = first_index.get(uri)
        {
            segments[index].duration += duration;
            continue;
        }

        first_index.entry(uri).or_insert(segments.len());
        segments.push(Segment::new(uri, duration));
    }

    segments
}

/// `m3u8-rs` stores `#EXTINF` as `f32`; widening bit-for-bit turns `10.7` into
/// `10.699999809`, so go through the shortest decimal form instead.
fn exact_duration(duration: f32) -> f64 {
    duration
        .to_string()
        .parse::<f64>()
        .unwrap_or_else(|_| f64::from(duration))
}

/// Hours elapsed since the timestamp comment, if the playlist carries one.
pub fn playlist_age_hours(text: &str, now: DateTime<Utc>) -> Option<f64> {
    let raw = text
        .lines()
        .find_map(|line| line.trim().strip_prefix(TIMESTAMP_TAG))?
        .trim();

    let recorded = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc())
        })
        .map_err(|e| debug!(timestamp = raw, error = %e, "Unparsable playlist timestamp"))
        .ok()?;

    Some((now - recorded).num_milliseconds() as f64 / 3_600_000.0)
}

/// The playlist URL with its file name stripped; relative segment URIs resolve against it.
pub fn base_url(playlist_url: &Url) -> Result<Url> {
    playlist_url.join(".").map_err(|e| {
        VodError::invalid_url(playlist_url.as_str(), format!("cannot derive base URL: {e}"))
    })
}

//! Segment-granular cropping of the playlist to the requested time window.

use crate::config::CropRange;
use crate::playlist::Segment;

/// Contiguous run of segments covering the crop window.
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedSegmentList {
    pub segments: Vec<Segment>,
    /// Index of the first retained segment in the full playlist.
    pub first_index: usize,
    /// Summed duration of the segments dropped from the front.
    pub start_offset: f64,
}

impl CroppedSegmentList {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// Reduce `segments` to the ones overlapping `[crop.begin, crop.end)`.
///
/// A segment straddling either boundary is kept whole; frame-accurate trimming is left to
/// the remux step. Times are measured on the VOD timeline, so the end boundary is compared
/// against `start_offset` plus the retained durations.
pub fn crop_segments(segments: &[Segment], crop: &CropRange) -> CroppedSegmentList {
    if crop.is_empty_window() {
        return CroppedSegmentList {
            segments: Vec::new(),
            first_index: 0,
            start_offset: 0.0,
        };
    }

    let mut start = 0;
    let mut start_offset = 0.0;
    if let Some(begin) = crop.begin {
        while start < segments.len() && start_offset + segments[start].duration < begin {
            start_offset += segments[start].duration;
            start += 1;
        }
    }

    let mut end = segments.len();
    if let Some(limit) = crop.end {
        let mut total = start_offset + segments[start..].iter().map(|s| s.duration).sum::<f64>();
        while end > start && total - segments[end - 1].duration > limit {
            total -= segments[end - 1].duration;
            end -= 1;
        }
    }

    CroppedSegmentList {
        segments: segments[start..end].to_vec(),
        first_index: start,
        start_offset,
    }
}

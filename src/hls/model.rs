//! Structural model of an HLS media playlist.
//!
//! Only the tags the stitcher reasons about are modelled; everything else is
//! dropped by the parser. All values are request-scoped and owned.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// `#EXT-X-PLAYLIST-TYPE` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Event,
}

impl PlaylistType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "VOD" => Some(PlaylistType::Vod),
            "EVENT" => Some(PlaylistType::Event),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistType::Vod => "VOD",
            PlaylistType::Event => "EVENT",
        }
    }
}

/// A parsed media playlist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub version: Option<u32>,
    pub playlist_type: Option<PlaylistType>,
    /// `#EXT-X-TARGETDURATION`, whole seconds
    pub target_duration: u64,
    /// Sequence number of the leading segment. Never rewritten by stitching.
    pub media_sequence: u64,
    /// Segments in timeline order
    pub segments: Vec<Segment>,
    /// Set when any segment carries `#EXT-X-DISCONTINUITY`
    pub discontinuity: bool,
    pub end_list: bool,
}

impl Manifest {
    /// Sum of all segment durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// A single media segment
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub uri: String,
    /// Seconds, rounded to millisecond precision
    pub duration: f64,
    /// Display-only; retained in the model but never rendered
    pub title: Option<String>,
    pub discontinuity: bool,
    pub byte_range: Option<ByteRange>,
    /// Shared across consecutive segments encrypted with the same key
    pub key: Option<Arc<Key>>,
    /// Millisecond precision
    pub program_date_time: Option<DateTime<Utc>>,
}

/// Titles are never rendered, so they take no part in structural equality.
impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
            && self.duration == other.duration
            && self.discontinuity == other.discontinuity
            && self.byte_range == other.byte_range
            && self.key == other.key
            && self.program_date_time == other.program_date_time
    }
}

/// `#EXT-X-BYTERANGE:<length>[@<offset>]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub length: u64,
    pub offset: Option<u64>,
}

/// `#EXT-X-KEY` attributes. `METHOD=NONE` is represented by the absence of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub method: String,
    pub uri: Option<String>,
    pub iv: Option<String>,
    pub key_format: Option<String>,
    pub key_format_versions: Option<String>,
}

//! Lenient, line-oriented M3U8 media playlist parser.
//!
//! Unknown tags are ignored rather than rejected: origins in the wild emit
//! vendor tags, comments and odd orderings, and the stitcher only needs the
//! tags modelled in [`crate::hls::model`].

use crate::error::{Result, SplicerError};
use crate::hls::model::{ByteRange, Key, Manifest, PlaylistType, Segment};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use std::sync::Arc;
use tracing::debug;

/// Millisecond `Z`-suffixed timestamp, e.g. `2025-12-25T02:05:34.242Z`
const PDT_MILLIS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Parse M3U8 text into a [`Manifest`].
///
/// Fails only when the text carries no HLS directive at all.
pub fn parse_manifest(content: &str) -> Result<Manifest> {
    if !content.lines().any(|line| line.trim_start().starts_with("#EXT")) {
        return Err(SplicerError::MalformedManifest(
            "no HLS directives found".to_string(),
        ));
    }

    let manifest = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .fold(Accumulator::default(), Accumulator::feed)
        .finish();

    debug!(
        "Parsed manifest: {} segments, media sequence {}",
        manifest.segments.len(),
        manifest.media_sequence
    );

    Ok(manifest)
}

/// Segment under construction. Opened by `#EXTINF` or by any per-segment tag
/// that precedes it, closed by the URI line.
#[derive(Debug, Default)]
struct PendingSegment {
    extinf: Option<(f64, Option<String>)>,
    discontinuity: bool,
    byte_range: Option<ByteRange>,
    key: Option<Arc<Key>>,
    program_date_time: Option<DateTime<Utc>>,
}

/// Parse state threaded through the line fold.
#[derive(Debug, Default)]
struct Accumulator {
    manifest: Manifest,
    current_key: Option<Arc<Key>>,
    pending: Option<PendingSegment>,
}

impl Accumulator {
    fn feed(mut self, line: &str) -> Self {
        if let Some(value) = line.strip_prefix("#EXT-X-VERSION:") {
            self.manifest.version = value.trim().parse().ok();
        } else if let Some(value) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
            self.manifest.playlist_type = PlaylistType::parse(value);
        } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            self.manifest.target_duration = value
                .trim()
                .parse::<f64>()
                .map(|d| d.max(0.0).ceil() as u64)
                .unwrap_or(0);
        } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            self.manifest.media_sequence = value.trim().parse().unwrap_or(0);
        } else if line.starts_with("#EXT-X-DISCONTINUITY-SEQUENCE") {
            // Not modelled
        } else if line.starts_with("#EXT-X-DISCONTINUITY") {
            self.pending_mut().discontinuity = true;
        } else if line.starts_with("#EXT-X-ENDLIST") {
            self.manifest.end_list = true;
        } else if let Some(attrs) = line.strip_prefix("#EXT-X-KEY:") {
            self.current_key = parse_key(attrs).map(Arc::new);
        } else if let Some(value) = line.strip_prefix("#EXT-X-BYTERANGE:") {
            self.pending_mut().byte_range = parse_byte_range(value);
        } else if let Some(value) = line.strip_prefix("#EXT-X-PROGRAM-DATE-TIME:") {
            match parse_program_date_time(value) {
                Some(pdt) => self.pending_mut().program_date_time = Some(pdt),
                None => debug!("Ignoring unparseable PROGRAM-DATE-TIME: {}", value),
            }
        } else if let Some(value) = line.strip_prefix("#EXTINF:") {
            let extinf = parse_extinf(value);
            let key = self.current_key.clone();
            let pending = self.pending_mut();
            pending.extinf = Some(extinf);
            pending.key = key;
        } else if !line.starts_with('#') {
            self.close_segment(line);
        }
        self
    }

    fn pending_mut(&mut self) -> &mut PendingSegment {
        self.pending.get_or_insert_with(PendingSegment::default)
    }

    fn close_segment(&mut self, uri: &str) {
        let Some(pending) = self.pending.take() else {
            debug!("URI line without #EXTINF ignored: {}", uri);
            return;
        };
        let Some((duration, title)) = pending.extinf else {
            debug!("URI line without #EXTINF ignored: {}", uri);
            return;
        };
        if duration <= 0.0 {
            debug!("Dropping zero-duration segment: {}", uri);
            if pending.discontinuity || pending.program_date_time.is_some() {
                self.pending = Some(PendingSegment {
                    discontinuity: pending.discontinuity,
                    program_date_time: pending.program_date_time,
                    ..Default::default()
                });
            }
            return;
        }

        self.manifest.segments.push(Segment {
            uri: uri.to_string(),
            duration,
            title,
            discontinuity: pending.discontinuity,
            byte_range: pending.byte_range,
            key: pending.key,
            program_date_time: pending.program_date_time,
        });
    }

    fn finish(mut self) -> Manifest {
        self.manifest.discontinuity = self.manifest.segments.iter().any(|s| s.discontinuity);
        self.manifest
    }
}

/// `<duration>,<title>` with the title being everything after the first comma.
fn parse_extinf(value: &str) -> (f64, Option<String>) {
    let (duration, title) = match value.split_once(',') {
        Some((d, t)) => (d, Some(t.trim())),
        None => (value, None),
    };

    let duration = duration
        .trim()
        .parse::<f64>()
        .map(round_millis)
        .unwrap_or(0.0);
    let title = title.filter(|t| !t.is_empty()).map(str::to_string);

    (duration, title)
}

/// Round seconds to millisecond precision, the precision the writer emits.
/// Non-finite, non-positive and overflowing values become 0.
pub(crate) fn round_millis(seconds: f64) -> f64 {
    let rounded = (seconds * 1000.0).round() / 1000.0;
    if rounded.is_finite() && rounded > 0.0 {
        rounded
    } else {
        0.0
    }
}

fn parse_byte_range(value: &str) -> Option<ByteRange> {
    let value = value.trim();
    let (length, offset) = match value.split_once('@') {
        Some((l, o)) => (l, Some(o.trim().parse().ok()?)),
        None => (value, None),
    };
    Some(ByteRange {
        length: length.trim().parse().ok()?,
        offset,
    })
}

/// Accepts millisecond and full-fractional RFC 3339 `Z` timestamps.
fn parse_program_date_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let parsed = NaiveDateTime::parse_from_str(value, PDT_MILLIS_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)))
        .ok()?;
    Some(parsed.trunc_subsecs(3))
}

fn parse_key(attrs: &str) -> Option<Key> {
    let mut key = Key {
        method: "NONE".to_string(),
        uri: None,
        iv: None,
        key_format: None,
        key_format_versions: None,
    };

    for (name, value) in parse_attributes(attrs) {
        match name.as_str() {
            "METHOD" => key.method = value,
            "URI" => key.uri = Some(value),
            "IV" => key.iv = Some(value),
            "KEYFORMAT" => key.key_format = Some(value),
            "KEYFORMATVERSIONS" => key.key_format_versions = Some(value),
            _ => {}
        }
    }

    if key.method.eq_ignore_ascii_case("NONE") {
        None
    } else {
        Some(key)
    }
}

/// Split an HLS attribute list, honouring commas inside quoted values.
/// Quotes are stripped from the returned values.
pub(crate) fn parse_attributes(attrs: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = attrs.trim();

    while !rest.is_empty() {
        let Some((name, after_eq)) = rest.split_once('=') else {
            break;
        };
        let name = name.trim().to_ascii_uppercase();

        let (value, remainder) = if let Some(quoted) = after_eq.strip_prefix('"') {
            match quoted.split_once('"') {
                Some((value, tail)) => (value, tail),
                None => (quoted, ""),
            }
        } else {
            match after_eq.split_once(',') {
                Some((value, tail)) => (value, tail),
                None => (after_eq, ""),
            }
        };

        pairs.push((name, value.trim().to_string()));
        rest = remainder.trim_start_matches(',').trim_start();
    }

    pairs
}

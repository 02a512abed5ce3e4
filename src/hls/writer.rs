//! Renders a [`Manifest`] back to M3U8 text.
//!
//! The output is normalised for strict players: a fixed header order,
//! `#EXT-X-INDEPENDENT-SEGMENTS` always present, millisecond
//! `PROGRAM-DATE-TIME` values and `#EXTINF` lines without titles.

use crate::hls::model::{Key, Manifest};
use std::fmt::Write;
use std::sync::Arc;

const PDT_RENDER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Render a manifest. Pure and deterministic.
pub fn render_manifest(manifest: &Manifest) -> String {
    let mut out = String::with_capacity(64 + manifest.segments.len() * 96);

    let _ = writeln!(out, "#EXTM3U");
    if let Some(version) = manifest.version {
        let _ = writeln!(out, "#EXT-X-VERSION:{}", version);
    }
    let _ = writeln!(out, "#EXT-X-INDEPENDENT-SEGMENTS");
    if let Some(playlist_type) = manifest.playlist_type {
        let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:{}", playlist_type.as_str());
    }
    if manifest.target_duration > 0 {
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", manifest.target_duration);
    }
    if manifest.media_sequence > 0 {
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", manifest.media_sequence);
    }

    let mut emitted_key: Option<&Arc<Key>> = None;
    for segment in &manifest.segments {
        if segment.duration <= 0.0 {
            continue;
        }

        if segment.discontinuity {
            let _ = writeln!(out, "#EXT-X-DISCONTINUITY");
        }

        if segment.key.as_ref() != emitted_key {
            match &segment.key {
                Some(key) => write_key(&mut out, key),
                None => {
                    let _ = writeln!(out, "#EXT-X-KEY:METHOD=NONE");
                }
            }
            emitted_key = segment.key.as_ref();
        }

        if let Some(range) = &segment.byte_range {
            match range.offset {
                Some(offset) => {
                    let _ = writeln!(out, "#EXT-X-BYTERANGE:{}@{}", range.length, offset);
                }
                None => {
                    let _ = writeln!(out, "#EXT-X-BYTERANGE:{}", range.length);
                }
            }
        }

        if let Some(pdt) = &segment.program_date_time {
            let _ = writeln!(
                out,
                "#EXT-X-PROGRAM-DATE-TIME:{}",
                pdt.format(PDT_RENDER_FORMAT)
            );
        }

        let _ = writeln!(out, "#EXTINF:{:.3},", segment.duration);
        let _ = writeln!(out, "{}", segment.uri);
    }

    if manifest.end_list {
        let _ = writeln!(out, "#EXT-X-ENDLIST");
    }

    out
}

fn write_key(out: &mut String, key: &Key) {
    let _ = write!(out, "#EXT-X-KEY:METHOD={}", key.method);
    if let Some(uri) = &key.uri {
        let _ = write!(out, ",URI=\"{}\"", uri);
    }
    if let Some(iv) = &key.iv {
        let _ = write!(out, ",IV={}", iv);
    }
    if let Some(format) = &key.key_format {
        let _ = write!(out, ",KEYFORMAT=\"{}\"", format);
    }
    if let Some(versions) = &key.key_format_versions {
        let _ = write!(out, ",KEYFORMATVERSIONS=\"{}\"", versions);
    }
    out.push('\n');
}

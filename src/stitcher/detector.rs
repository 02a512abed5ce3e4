//! Ad-break detection from in-band cue tags and operator rules.
//!
//! Cue detection always runs first. Static rules are then layered on top
//! whenever any are configured (or when no cue was found), and the union is
//! de-duplicated per whole second and sorted by offset.

use crate::hls::Manifest;
use crate::stitcher::ad_break::{AdBreak, BreakPosition, BreakSource, StaticAdRule};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Manifests shorter than this are treated as a live window.
pub const LIVE_WINDOW_THRESHOLD_SECS: f64 = 300.0;
/// Cap on stepped mid-rolls inside a live window.
pub const LIVE_MAX_BREAKS: usize = 2;
/// Cap on stepped mid-rolls for VOD.
pub const VOD_MAX_BREAKS: usize = 5;
/// Earliest synthesized live mid-roll offset.
pub const LIVE_MIN_OFFSET_SECS: f64 = 12.0;
/// Single mid-rolls further out than this are only kept if inside the manifest.
pub const SINGLE_MIDROLL_HORIZON_SECS: f64 = 600.0;

static FIRST_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)").expect("static regex is valid"));

/// Detect, de-duplicate and order ad breaks for one manifest.
///
/// `raw` is the origin text the manifest was parsed from; cue tags are not
/// part of the structural model.
pub fn detect_ad_breaks(manifest: &Manifest, raw: &str, rules: &[StaticAdRule]) -> Vec<AdBreak> {
    let mut breaks = detect_cue_breaks(raw);
    let cue_count = breaks.len();

    if breaks.is_empty() || !rules.is_empty() {
        breaks.extend(detect_static_breaks(manifest.total_duration(), rules));
    }

    let breaks = deduplicate_and_sort(breaks);
    info!(
        "Detected {} ad break(s) ({} from cues, {} rule(s))",
        breaks.len(),
        cue_count,
        rules.len()
    );
    breaks
}

/// Scan raw playlist text for `#EXT-X-CUE-OUT`/`#EXT-X-CUE-IN` pairs and
/// `#EXT-X-SCTE35` tags, tracking the cumulative `#EXTINF` offset.
pub fn detect_cue_breaks(raw: &str) -> Vec<AdBreak> {
    let mut breaks = Vec::new();
    let mut offset = 0.0_f64;
    let mut pending: Option<(f64, u32)> = None;

    for line in raw.lines().map(str::trim) {
        if line.starts_with("#EXT-X-CUE-OUT") && !line.starts_with("#EXT-X-CUE-OUT-CONT") {
            let duration = FIRST_INTEGER
                .captures(line)
                .and_then(|caps| caps[1].parse().ok())
                .unwrap_or(0);
            debug!("CUE-OUT at {:.3}s (duration {}s)", offset, duration);
            pending = Some((offset, duration));
        } else if line.starts_with("#EXT-X-CUE-IN") {
            if let Some((start, duration)) = pending.take() {
                breaks.push(AdBreak::new(
                    BreakPosition::MidRoll,
                    start,
                    duration,
                    BreakSource::Scte35,
                ));
            }
        } else if let Some(payload) = line.strip_prefix("#EXT-X-SCTE35:") {
            if is_valid_cue_payload(payload) {
                breaks.push(AdBreak::new(
                    BreakPosition::MidRoll,
                    offset,
                    0,
                    BreakSource::Scte35,
                ));
            } else {
                debug!("Ignoring #EXT-X-SCTE35 with undecodable payload");
            }
        } else if let Some(value) = line.strip_prefix("#EXTINF:") {
            let duration = value.split(',').next().unwrap_or_default().trim();
            if let Ok(duration) = duration.parse::<f64>() {
                offset += duration;
            }
        }
    }

    breaks
}

/// The splice_info_section is not decoded: a payload counts as a cue when it
/// is valid base64, the empty payload included. Accepts a bare payload or a
/// quoted `CUE="..."` attribute.
fn is_valid_cue_payload(payload: &str) -> bool {
    let payload = payload.trim();
    let encoded = match payload.find("CUE=\"") {
        Some(idx) => {
            let rest = &payload[idx + 5..];
            rest.split('"').next().unwrap_or_default()
        }
        None => payload,
    };
    B64.decode(encoded).is_ok()
}

/// Expand operator rules against a manifest of `total_duration` seconds.
pub fn detect_static_breaks(total_duration: f64, rules: &[StaticAdRule]) -> Vec<AdBreak> {
    let mut breaks = Vec::new();

    for rule in rules {
        match rule.position {
            BreakPosition::PreRoll => {
                breaks.push(AdBreak::new(
                    BreakPosition::PreRoll,
                    0.0,
                    rule.duration,
                    BreakSource::Static,
                ));
            }
            BreakPosition::MidRoll if rule.interval > 0.0 => {
                breaks.extend(interval_mid_rolls(total_duration, rule));
            }
            BreakPosition::MidRoll => {
                if rule.offset <= SINGLE_MIDROLL_HORIZON_SECS || rule.offset <= total_duration {
                    breaks.push(AdBreak::new(
                        BreakPosition::MidRoll,
                        rule.offset,
                        rule.duration,
                        BreakSource::Static,
                    ));
                }
            }
            BreakPosition::PostRoll => {
                breaks.push(AdBreak::new(
                    BreakPosition::PostRoll,
                    (total_duration - rule.offset).max(0.0),
                    rule.duration,
                    BreakSource::Static,
                ));
            }
        }
    }

    breaks
}

fn interval_mid_rolls(total_duration: f64, rule: &StaticAdRule) -> Vec<AdBreak> {
    if total_duration < LIVE_WINDOW_THRESHOLD_SECS {
        if rule.offset >= total_duration {
            // The window is too short for the configured start; place one
            // break inside it instead of dropping the opportunity.
            let offset = live_window_offset(total_duration);
            debug!(
                "Live window {:.1}s shorter than rule offset {:.1}s, synthesized break at {:.1}s",
                total_duration, rule.offset, offset
            );
            return vec![AdBreak::new(
                BreakPosition::MidRoll,
                offset,
                rule.duration,
                BreakSource::Static,
            )];
        }
        return stepped_mid_rolls(total_duration, rule, LIVE_MAX_BREAKS);
    }

    stepped_mid_rolls(total_duration, rule, VOD_MAX_BREAKS)
}

/// 50% of the window, at least 12s, falling back to 75% when that lands past the end.
fn live_window_offset(total_duration: f64) -> f64 {
    let offset = (total_duration * 0.5).max(LIVE_MIN_OFFSET_SECS);
    if offset >= total_duration {
        total_duration * 0.75
    } else {
        offset
    }
}

fn stepped_mid_rolls(total_duration: f64, rule: &StaticAdRule, max_breaks: usize) -> Vec<AdBreak> {
    std::iter::successors(Some(rule.offset), |offset| Some(offset + rule.interval))
        .take_while(|offset| *offset < total_duration)
        .take(max_breaks)
        .map(|offset| {
            AdBreak::new(
                BreakPosition::MidRoll,
                offset,
                rule.duration,
                BreakSource::Static,
            )
        })
        .collect()
}

/// Keep the first break per whole second, then sort ascending by offset.
pub fn deduplicate_and_sort(breaks: Vec<AdBreak>) -> Vec<AdBreak> {
    let mut seen = HashSet::new();
    let mut unique: Vec<AdBreak> = breaks
        .into_iter()
        .filter(|b| seen.insert(b.offset.trunc() as i64))
        .collect();
    unique.sort_by(|a, b| a.offset.total_cmp(&b.offset));
    unique
}

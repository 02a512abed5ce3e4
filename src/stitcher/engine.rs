//! Multi-break stitching.
//!
//! Breaks are applied highest offset first so insertion indices computed for
//! the remaining (lower-offset) breaks stay valid: an insertion only shifts
//! segments at or after its own position.

use crate::hls::{Manifest, Segment};
use crate::stitcher::ad_break::AdBreakWithAds;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

/// A break that made it into the output
#[derive(Debug, Clone, PartialEq)]
pub struct InsertedBreak {
    pub offset: f64,
    /// Index of the first ad segment in the stitched manifest at the time of insertion
    pub index: usize,
    pub ad_ids: Vec<String>,
    pub segment_count: usize,
}

/// Why a break was left out of the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Offset lies past the last segment of the window
    OutsideWindow,
    /// None of the break's ads carry a positive-duration segment
    NoPlayableAds,
    /// Ad durations cannot be laid out on the program-date-time timeline
    InvalidDuration,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::OutsideWindow => "outside_window",
            SkipReason::NoPlayableAds => "no_playable_ads",
            SkipReason::InvalidDuration => "invalid_duration",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBreak {
    pub offset: f64,
    pub reason: SkipReason,
}

/// Result of a stitching pass
#[derive(Debug, Clone)]
pub struct Stitched {
    pub manifest: Manifest,
    /// Inserted breaks, ascending by offset
    pub inserted: Vec<InsertedBreak>,
    /// Breaks left out, in processing (descending offset) order
    pub skipped: Vec<SkippedBreak>,
}

/// Splice every break into `manifest`, using the current time as the
/// pre-roll anchor. Never fails; unusable breaks are skipped.
pub fn stitch_multiple_ad_breaks(manifest: Manifest, breaks: &[AdBreakWithAds]) -> Stitched {
    stitch_multiple_ad_breaks_at(manifest, breaks, Utc::now())
}

/// Same as [`stitch_multiple_ad_breaks`] with an explicit pre-roll start time.
pub fn stitch_multiple_ad_breaks_at(
    mut manifest: Manifest,
    breaks: &[AdBreakWithAds],
    now: DateTime<Utc>,
) -> Stitched {
    if manifest.segments.is_empty() {
        debug!("Nothing to stitch into: manifest has no segments");
        return Stitched {
            manifest,
            inserted: Vec::new(),
            skipped: Vec::new(),
        };
    }

    let mut ordered: Vec<&AdBreakWithAds> = breaks.iter().collect();
    ordered.sort_by(|a, b| a.offset.total_cmp(&b.offset));

    let total_duration = manifest.total_duration();
    let mut inserted = Vec::with_capacity(ordered.len());
    let mut skipped = Vec::new();
    let mut skip = |offset: f64, reason: SkipReason| skipped.push(SkippedBreak { offset, reason });

    for ad_break in ordered.into_iter().rev() {
        if ad_break.offset > total_duration {
            warn!(
                "Skipping ad break at {:.1}s: beyond manifest duration {:.1}s",
                ad_break.offset, total_duration
            );
            skip(ad_break.offset, SkipReason::OutsideWindow);
            continue;
        }

        let Some(index) = insertion_index(&manifest.segments, ad_break.offset) else {
            warn!(
                "Skipping ad break at {:.1}s: no segment reaches that offset",
                ad_break.offset
            );
            skip(ad_break.offset, SkipReason::OutsideWindow);
            continue;
        };

        let mut ad_segments = collect_ad_segments(ad_break);
        if ad_segments.is_empty() {
            warn!(
                "Skipping ad break at {:.1}s: ads carry no playable segments",
                ad_break.offset
            );
            skip(ad_break.offset, SkipReason::NoPlayableAds);
            continue;
        }

        let resume_pdt = if index == 0 {
            match stamp_pre_roll(&mut ad_segments, now) {
                Some(pdt) => Some(pdt),
                None => {
                    warn!(
                        "Skipping pre-roll ad break: ad durations overflow the program-date-time timeline"
                    );
                    skip(ad_break.offset, SkipReason::InvalidDuration);
                    continue;
                }
            }
        } else {
            None
        };

        let segment_count = ad_segments.len();
        splice(&mut manifest.segments, index, ad_segments, resume_pdt);
        manifest.discontinuity = true;

        debug!(
            "Inserted {} ad segment(s) at index {} for break at {:.1}s",
            segment_count, index, ad_break.offset
        );
        inserted.push(InsertedBreak {
            offset: ad_break.offset,
            index,
            ad_ids: ad_break.ads.iter().map(|ad| ad.ad_id.clone()).collect(),
            segment_count,
        });
    }

    inserted.reverse();
    info!(
        "Stitched {}/{} ad break(s) into {} segment(s)",
        inserted.len(),
        breaks.len(),
        manifest.segments.len()
    );

    Stitched {
        manifest,
        inserted,
        skipped,
    }
}

/// Offset 0 always maps to the head. Any other offset lands after the first
/// segment whose inclusive cumulative duration reaches it.
fn insertion_index(segments: &[Segment], offset: f64) -> Option<usize> {
    if offset == 0.0 {
        return Some(0);
    }

    let mut cumulative = 0.0;
    segments.iter().position(|segment| {
        cumulative += segment.duration;
        cumulative >= offset
    })
    .map(|idx| idx + 1)
}

/// Flatten every ad's segments in play order, marking the entry discontinuity.
fn collect_ad_segments(ad_break: &AdBreakWithAds) -> Vec<Segment> {
    let mut segments: Vec<Segment> = ad_break
        .ads
        .iter()
        .flat_map(|ad| ad.manifest.segments.iter())
        .filter(|segment| segment.duration > 0.0)
        .map(|segment| Segment {
            discontinuity: false,
            program_date_time: None,
            ..segment.clone()
        })
        .collect();

    if let Some(first) = segments.first_mut() {
        first.discontinuity = true;
    }
    segments
}

/// Stamp pre-roll ads back to back from `now` and return the time the
/// content resumes. `None` when any timestamp falls outside chrono's range;
/// `ads` may then be partially stamped and must be discarded.
fn stamp_pre_roll(ads: &mut [Segment], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut elapsed = TimeDelta::zero();
    for ad in ads.iter_mut() {
        ad.program_date_time = Some(now.checked_add_signed(elapsed)?);
        elapsed = elapsed.checked_add(&seconds(ad.duration)?)?;
    }
    now.checked_add_signed(elapsed)
}

/// Insert `ads` at `index` and mark the return to content. `resume_pdt`
/// overwrites the first original segment's program-date-time.
fn splice(
    segments: &mut Vec<Segment>,
    index: usize,
    ads: Vec<Segment>,
    resume_pdt: Option<DateTime<Utc>>,
) {
    let resume = index + ads.len();
    segments.splice(index..index, ads);

    if let Some(next) = segments.get_mut(resume) {
        next.discontinuity = true;
        if resume_pdt.is_some() {
            next.program_date_time = resume_pdt;
        }
    }
}

fn seconds(value: f64) -> Option<TimeDelta> {
    let millis = (value * 1000.0).round();
    if !millis.is_finite() || millis < i64::MIN as f64 || millis >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64)
}

use crate::hls::Manifest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a break sits relative to the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakPosition {
    PreRoll,
    MidRoll,
    PostRoll,
}

impl BreakPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakPosition::PreRoll => "pre-roll",
            BreakPosition::MidRoll => "mid-roll",
            BreakPosition::PostRoll => "post-roll",
        }
    }
}

impl fmt::Display for BreakPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a break was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakSource {
    /// In-band `#EXT-X-CUE-OUT`/`#EXT-X-CUE-IN` or `#EXT-X-SCTE35` markers
    Scte35,
    /// Operator-configured rule
    Static,
}

impl BreakSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakSource::Scte35 => "scte35",
            BreakSource::Static => "static",
        }
    }
}

/// A candidate ad break
#[derive(Debug, Clone, PartialEq)]
pub struct AdBreak {
    /// Stable across detection runs: derived from source, position and offset
    pub id: String,
    pub position: BreakPosition,
    /// Seconds from manifest start, always resolved (post-rolls included)
    pub offset: f64,
    /// Expected duration in seconds. Advisory.
    pub duration: u32,
    pub source: BreakSource,
}

impl AdBreak {
    pub fn new(position: BreakPosition, offset: f64, duration: u32, source: BreakSource) -> Self {
        let offset = offset.max(0.0);
        let id = match source {
            BreakSource::Scte35 => format!("scte35_{:.0}", offset),
            BreakSource::Static => {
                format!("{}_{:.0}", position.as_str().replace('-', "_"), offset)
            }
        };
        Self {
            id,
            position,
            offset,
            duration,
            source,
        }
    }
}

/// Operator-configured break rule.
///
/// For mid-rolls `offset` counts from the start; for post-rolls it counts
/// back from the end of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAdRule {
    pub position: BreakPosition,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub duration: u32,
    /// Repeat interval for mid-rolls; `<= 0` means a single break
    #[serde(default)]
    pub interval: f64,
}

/// One ad's own media playlist, already parsed
#[derive(Debug, Clone)]
pub struct AdPlaylist {
    pub ad_id: String,
    pub manifest: Manifest,
}

/// A resolved break offset paired with the ads to splice in, in play order
#[derive(Debug, Clone)]
pub struct AdBreakWithAds {
    pub offset: f64,
    pub ads: Vec<AdPlaylist>,
}

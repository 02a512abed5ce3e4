pub mod ad_break;
pub mod detector;
pub mod engine;

pub use ad_break::{AdBreak, AdBreakWithAds, AdPlaylist, BreakPosition, BreakSource, StaticAdRule};
pub use detector::detect_ad_breaks;
pub use engine::{
    InsertedBreak, SkipReason, SkippedBreak, Stitched, stitch_multiple_ad_breaks,
    stitch_multiple_ad_breaks_at,
};

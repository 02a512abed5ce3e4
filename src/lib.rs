//! Server-side ad insertion for live HLS.
//!
//! Origin playlists are fetched, ad breaks detected from cue tags or static
//! rules, ads decided and resolved to HLS renditions, then spliced into the
//! media playlist behind discontinuities.

pub mod ad;
pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod stitcher;

pub mod media;
pub mod provider;
pub mod tracking;
pub mod vast;

pub use media::AdMediaResolver;
pub use provider::{
    Ad, AdDecision, AdDecisionRequest, AdId, AdProvider, DecisionServiceProvider, StaticAdProvider,
};
pub use tracking::{
    HttpTrackingSink, LogTrackingSink, TrackingDispatcher, TrackingEvent, TrackingEventType,
    TrackingSink,
};
pub use vast::{AdMedia, VastResolver};

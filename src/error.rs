use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SplicerError>;

#[derive(Debug, Error)]
pub enum SplicerError {
    #[error("request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("master playlist resolution failed: {0}")]
    MasterPlaylist(String),

    #[error("origin manifest unavailable at {url}: {reason}")]
    OriginUnavailable { url: String, reason: String },

    #[error("channel lookup failed: {0}")]
    ChannelLookup(String),

    #[error("ad decision failed: {0}")]
    AdDecision(String),

    #[error("VAST resolution failed: {0}")]
    Vast(String),

    #[error("ad media not usable for stitching: {0}")]
    UnsupportedAdMedia(String),

    #[error("tracking sink rejected event: {0}")]
    Tracking(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SplicerError {
    /// Machine-readable reason reported to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            SplicerError::Upstream { .. } | SplicerError::UpstreamStatus { .. } => {
                "upstream_failure"
            }
            SplicerError::MalformedManifest(_) => "malformed_manifest",
            SplicerError::MasterPlaylist(_) => "master_playlist_unresolved",
            SplicerError::OriginUnavailable { .. } => "origin_unavailable",
            SplicerError::ChannelLookup(_) => "channel_lookup_failed",
            SplicerError::AdDecision(_) => "ad_decision_failed",
            SplicerError::Vast(_) => "vast_failed",
            SplicerError::UnsupportedAdMedia(_) => "unsupported_ad_media",
            SplicerError::Tracking(_) => "tracking_failed",
            SplicerError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            SplicerError::OriginUnavailable { .. }
            | SplicerError::Upstream { .. }
            | SplicerError::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SplicerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.reason(),
            "details": self.to_string(),
        }));
        (status, body).into_response()
    }
}

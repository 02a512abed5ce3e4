//! Player beacons: `POST /tracking/{impression,quartile,complete}`.
//!
//! Beacons are stamped with server time and caller identity, then queued on
//! the tracking dispatcher. The response never waits on the tracking sink.

use crate::ad::provider::AdId;
use crate::ad::tracking::{TrackingEvent, TrackingEventType};
use crate::metrics;
use crate::server::handlers::manifest::{client_ip, header_value};
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, warn};

/// Beacon body as sent by players
#[derive(Debug, Clone, Deserialize)]
pub struct Beacon {
    pub tenant_id: u64,
    #[serde(default)]
    pub channel_id: Option<u64>,
    pub ad_id: AdId,
    #[serde(default)]
    pub event_type: Option<TrackingEventType>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub geo_country: Option<String>,
}

pub async fn impression(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Beacon>, JsonRejection>,
) -> Response {
    accept("tracking_impression", &state, &headers, body, |_| {
        Ok(TrackingEventType::Impression)
    })
}

/// Start and quartile beacons; the body's `event_type` is kept.
pub async fn quartile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Beacon>, JsonRejection>,
) -> Response {
    accept("tracking_quartile", &state, &headers, body, |beacon| {
        match beacon.event_type {
            Some(
                kind @ (TrackingEventType::Start
                | TrackingEventType::FirstQuartile
                | TrackingEventType::Midpoint
                | TrackingEventType::ThirdQuartile),
            ) => Ok(kind),
            Some(other) => Err(format!(
                "event_type {} is not a quartile event",
                other.as_str()
            )),
            None => Err("event_type is required".to_string()),
        }
    })
}

pub async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Beacon>, JsonRejection>,
) -> Response {
    accept("tracking_complete", &state, &headers, body, |_| {
        Ok(TrackingEventType::Complete)
    })
}

fn accept(
    endpoint: &'static str,
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Json<Beacon>, JsonRejection>,
    event_type: impl FnOnce(&Beacon) -> Result<TrackingEventType, String>,
) -> Response {
    let start = Instant::now();
    let response = match body {
        Ok(Json(beacon)) => match event_type(&beacon) {
            Ok(kind) => enqueue(state, headers, beacon, kind),
            Err(message) => bad_request(message),
        },
        Err(rejection) => {
            warn!("Rejected {} beacon: {}", endpoint, rejection.body_text());
            bad_request(rejection.body_text())
        }
    };
    metrics::record_request(endpoint, response.status().as_u16());
    metrics::record_duration(endpoint, start);
    response
}

fn enqueue(
    state: &AppState,
    headers: &HeaderMap,
    beacon: Beacon,
    event_type: TrackingEventType,
) -> Response {
    let event = TrackingEvent {
        tenant_id: beacon.tenant_id,
        channel_id: beacon.channel_id,
        ad_id: beacon.ad_id,
        event_type,
        session_id: beacon.session_id,
        device_type: beacon.device_type,
        geo_country: beacon.geo_country,
        ip_address: client_ip(headers),
        user_agent: header_value(headers, header::USER_AGENT.as_str()),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    debug!("Queueing {} beacon for ad {}", event_type.as_str(), event.ad_id);

    if state.tracking.dispatch(event) {
        (StatusCode::OK, Json(json!({ "success": true }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "tracking queue full" })),
        )
            .into_response()
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

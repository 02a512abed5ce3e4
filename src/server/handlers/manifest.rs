use crate::{
    metrics,
    pipeline::{self, ManifestRequest},
    server::state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::time::Instant;
use tracing::info;

pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Default, Deserialize)]
pub struct ManifestQuery {
    pub session_id: Option<String>,
}

/// Serve the ad-stitched playlist for `GET /fast/{tenant}/{channel}[.m3u8]`
pub async fn serve_manifest(
    Path((tenant, channel)): Path<(String, String)>,
    Query(query): Query<ManifestQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let channel = channel
        .strip_suffix(".m3u8")
        .unwrap_or(&channel)
        .to_string();
    info!("Serving manifest for {}/{}", tenant, channel);

    let request = ManifestRequest {
        tenant,
        channel,
        geo: header_value(&headers, "cf-ipcountry"),
        user_agent: header_value(&headers, header::USER_AGENT.as_str()),
        client_ip: client_ip(&headers),
        session_id: query.session_id,
    };

    let output = match pipeline::build_manifest(&state, &request).await {
        Ok(output) => output,
        Err(e) => {
            let response = e.into_response();
            metrics::record_request("manifest", response.status().as_u16());
            metrics::record_duration("manifest", start);
            return response;
        }
    };

    if let Some(reason) = output.fallback {
        info!("Returned unmodified origin playlist ({})", reason);
    }

    metrics::record_request("manifest", 200);
    metrics::record_duration("manifest", start);

    let mut response = (StatusCode::OK, output.body).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HLS_CONTENT_TYPE));
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    response_headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response_headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

pub(crate) fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"))
}

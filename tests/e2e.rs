//! End-to-end tests for the splicer SSAI server
//!
//! Starts a real Axum server on a random port, backed by wiremock origin and
//! ad servers, and exercises the full HTTP pipeline with a real client.

use m3u8_rs::Playlist;
use splicer::config::Config;
use splicer::server::{build_router, state::AppState};
use std::net::SocketAddr;
use tokio_util::task::TaskTracker;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Test server helpers ───────────────────────────────────────────────────────

/// Live window of ten 6s segments with a 30s cue starting at 24s.
fn live_playlist() -> String {
    let mut out = String::from(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:500\n",
    );
    for n in 500..510 {
        if n == 504 {
            out.push_str("#EXT-X-CUE-OUT:30\n");
        }
        if n == 509 {
            out.push_str("#EXT-X-CUE-IN\n");
        }
        out.push_str(&format!("#EXTINF:6.000,\nchunk_{n}.ts\n"));
    }
    out
}

const AD_PLAYLIST: &str = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXTINF:10.000,
creative/0.ts
#EXTINF:10.000,
creative/1.ts
#EXTINF:10.000,
creative/2.ts
#EXT-X-ENDLIST
";

async fn start_origin() -> MockServer {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channel/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(live_playlist()))
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/ads/spot.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AD_PLAYLIST))
        .mount(&origin)
        .await;
    origin
}

/// Spin up the server on a random port with `config`.
async fn start_server(config: Config) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().unwrap();

    let state = AppState::new(config, &TaskTracker::new()).unwrap();
    let app = build_router(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

async fn start_test_server(origin: &MockServer) -> SocketAddr {
    let mut config = Config::for_origin(format!("{}/channel/index.m3u8", origin.uri()));
    config.ad_source_url = format!("{}/ads/spot.m3u8", origin.uri());
    start_server(config).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_check() {
    let origin = start_origin().await;
    let addr = start_test_server(&origin).await;

    let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn stitched_live_manifest_is_valid_hls() {
    let origin = start_origin().await;
    let addr = start_test_server(&origin).await;

    let resp = reqwest::get(format!("http://{}/fast/acme/news.m3u8", addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/vnd.apple.mpegurl"
    );
    let body = resp.text().await.unwrap();

    let playlist =
        m3u8_rs::parse_playlist_res(body.as_bytes()).expect("Response should be valid M3U8");
    let Playlist::MediaPlaylist(pl) = playlist else {
        panic!("Expected a MediaPlaylist, got MasterPlaylist");
    };

    assert_eq!(pl.media_sequence, 500);
    assert_eq!(pl.segments.len(), 13, "10 content + 3 ad segments");
    assert_eq!(
        pl.segments.iter().filter(|s| s.discontinuity).count(),
        2,
        "Expected one DISCONTINUITY pair, got:\n{}",
        body
    );

    // Cue at 24s lands after the fourth content chunk
    assert!(pl.segments[3].uri.ends_with("/channel/chunk_503.ts"));
    assert!(pl.segments[4].uri.ends_with("/ads/creative/0.ts"));
    assert!(pl.segments[4].discontinuity);
    assert!(pl.segments[7].uri.ends_with("/channel/chunk_504.ts"));
    assert!(pl.segments[7].discontinuity);
    assert!(pl.segments.iter().all(|s| s.uri.starts_with("http://")));
}

#[tokio::test]
async fn cors_preflight_is_allowed() {
    let origin = start_origin().await;
    let addr = start_test_server(&origin).await;

    let resp = reqwest::Client::new()
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{}/fast/acme/news.m3u8", addr),
        )
        .header("origin", "https://player.example.com")
        .header("access-control-request-method", "GET")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn tracking_beacon_round_trip() {
    let origin = start_origin().await;
    let addr = start_test_server(&origin).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/tracking/quartile", addr))
        .json(&serde_json::json!({
            "tenant_id": 1,
            "ad_id": "static-scte35_24",
            "event_type": "midpoint",
            "session_id": "viewer-1"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
}

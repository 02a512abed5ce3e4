//! Bounded single-attempt HTTP GET for upstream text resources.
//!
//! Origin playlists, ad playlists and VAST documents are fetched once with a
//! per-request timeout. Any transport error or non-200 status is returned to
//! the caller, which decides whether it is fatal or only skips a break.

use crate::error::{Result, SplicerError};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Fetch `url` and return its body as text.
///
/// # Errors
///
/// [`SplicerError::Upstream`] on transport failure or timeout,
/// [`SplicerError::UpstreamStatus`] on any status other than 200.
pub async fn fetch_text(client: &Client, url: &str, timeout: Duration) -> Result<String> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| {
            warn!("HTTP fetch failed for {}: {}", url, source);
            SplicerError::Upstream {
                url: url.to_string(),
                source,
            }
        })?;

    let status = response.status();
    if status != StatusCode::OK {
        warn!("HTTP fetch returned {} for {}", status, url);
        return Err(SplicerError::UpstreamStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|source| SplicerError::Upstream {
            url: url.to_string(),
            source,
        })?;

    debug!("Fetched {} bytes from {}", body.len(), url);
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_body_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetch_text(
            &Client::new(),
            &format!("{}/live.m3u8", server.uri()),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(body, "#EXTM3U\n");
    }

    #[tokio::test]
    async fn non_200_is_an_error_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetch_text(&Client::new(), &server.uri(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SplicerError::UpstreamStatus { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn other_success_codes_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = fetch_text(&Client::new(), &server.uri(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SplicerError::UpstreamStatus { status: 204, .. }
        ));
    }

    #[tokio::test]
    async fn timeout_surfaces_as_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("#EXTM3U\n")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = fetch_text(&Client::new(), &server.uri(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SplicerError::Upstream { .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_an_upstream_error() {
        let err = fetch_text(
            &Client::new(),
            "http://127.0.0.1:1/unreachable.m3u8",
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert_eq!(err.reason(), "upstream_failure");
    }
}

//! Ad tracking: event model, sinks, and the fire-and-forget dispatcher.
//!
//! Events are queued on a bounded channel and drained by one detached worker
//! registered on a [`TaskTracker`]. The worker is independent of any request:
//! a cancelled request never cancels an already queued event.

use crate::ad::provider::AdId;
use crate::error::{Result, SplicerError};
use crate::metrics;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Capacity of the dispatch queue; events beyond it are dropped.
pub const DISPATCH_QUEUE_CAPACITY: usize = 1024;

/// Kind of tracking event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingEventType {
    Impression,
    Start,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
}

impl TrackingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingEventType::Impression => "impression",
            TrackingEventType::Start => "start",
            TrackingEventType::FirstQuartile => "first_quartile",
            TrackingEventType::Midpoint => "midpoint",
            TrackingEventType::ThirdQuartile => "third_quartile",
            TrackingEventType::Complete => "complete",
        }
    }
}

/// One tracking event as accepted by the tracking sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub tenant_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,
    pub ad_id: AdId,
    pub event_type: TrackingEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// RFC 3339, stamped by the service when absent
    #[serde(default)]
    pub timestamp: String,
}

/// Destination for tracking events
#[async_trait]
pub trait TrackingSink: Send + Sync {
    async fn send(&self, event: &TrackingEvent) -> Result<()>;
}

/// Posts `{"events": [event]}` to `{base}/api/v1/tracking/events`
#[derive(Clone, Debug)]
pub struct HttpTrackingSink {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl HttpTrackingSink {
    pub fn new(client: Client, base_url: &str, api_key: String, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/v1/tracking/events", base_url.trim_end_matches('/')),
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl TrackingSink for HttpTrackingSink {
    async fn send(&self, event: &TrackingEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-Key", &self.api_key)
            .timeout(self.timeout)
            .json(&json!({ "events": [event] }))
            .send()
            .await
            .map_err(|e| SplicerError::Tracking(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SplicerError::Tracking(format!(
                "unexpected status {}: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(())
    }
}

/// Sink used when no tracking service is configured: events are only logged.
#[derive(Clone, Debug, Default)]
pub struct LogTrackingSink;

#[async_trait]
impl TrackingSink for LogTrackingSink {
    async fn send(&self, event: &TrackingEvent) -> Result<()> {
        info!(
            "Tracking {} for ad {} (tenant {})",
            event.event_type.as_str(),
            event.ad_id,
            event.tenant_id
        );
        Ok(())
    }
}

/// Handle for queueing events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TrackingDispatcher {
    tx: mpsc::Sender<TrackingEvent>,
}

impl TrackingDispatcher {
    /// Start the worker on `tracker`. It exits once every handle is dropped
    /// and the queue is drained.
    pub fn spawn(sink: Arc<dyn TrackingSink>, tracker: &TaskTracker) -> Self {
        let (tx, mut rx) = mpsc::channel::<TrackingEvent>(DISPATCH_QUEUE_CAPACITY);

        tracker.spawn(async move {
            while let Some(event) = rx.recv().await {
                match sink.send(&event).await {
                    Ok(()) => {
                        debug!(
                            "Delivered {} event for ad {}",
                            event.event_type.as_str(),
                            event.ad_id
                        );
                        metrics::record_tracking_event("sent");
                    }
                    Err(e) => {
                        warn!(
                            "Failed to deliver {} event for ad {}: {}",
                            event.event_type.as_str(),
                            event.ad_id,
                            e
                        );
                        metrics::record_tracking_event("failed");
                    }
                }
            }
            debug!("Tracking worker drained and stopped");
        });

        Self { tx }
    }

    /// Queue an event without waiting. Returns `false` if it was dropped.
    pub fn dispatch(&self, event: TrackingEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping tracking event: {}", e);
                metrics::record_tracking_event("dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(ad: u64) -> TrackingEvent {
        TrackingEvent {
            tenant_id: 1,
            channel_id: Some(9),
            ad_id: AdId::Numeric(ad),
            event_type: TrackingEventType::Impression,
            session_id: None,
            device_type: Some("Roku".to_string()),
            geo_country: Some("SE".to_string()),
            ip_address: None,
            user_agent: None,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<AdId>>,
        fail: bool,
    }

    #[async_trait]
    impl TrackingSink for RecordingSink {
        async fn send(&self, event: &TrackingEvent) -> Result<()> {
            self.seen.lock().unwrap().push(event.ad_id.clone());
            if self.fail {
                Err(SplicerError::Tracking("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn event_serializes_without_missing_optionals() {
        let json = serde_json::to_value(event(5)).unwrap();
        assert_eq!(json["event_type"], "impression");
        assert_eq!(json["ad_id"], 5);
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn beacon_body_deserializes_with_defaults() {
        let event: TrackingEvent = serde_json::from_str(
            r#"{"tenant_id": 2, "ad_id": "a-1", "event_type": "first_quartile"}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, TrackingEventType::FirstQuartile);
        assert!(event.timestamp.is_empty());
    }

    #[tokio::test]
    async fn http_sink_wraps_event_in_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tracking/events"))
            .and(header("X-API-Key", "k"))
            .and(body_partial_json(serde_json::json!({
                "events": [{"tenant_id": 1, "channel_id": 9, "ad_id": 5, "event_type": "impression"}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpTrackingSink::new(Client::new(), &server.uri(), "k".to_string(), Duration::from_secs(2));
        sink.send(&event(5)).await.unwrap();
    }

    #[tokio::test]
    async fn http_sink_reports_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = HttpTrackingSink::new(Client::new(), &server.uri(), "k".to_string(), Duration::from_secs(2));
        assert!(matches!(
            sink.send(&event(5)).await,
            Err(SplicerError::Tracking(_))
        ));
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_background_and_drains_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = TaskTracker::new();
        let dispatcher = TrackingDispatcher::spawn(sink.clone(), &tracker);

        assert!(dispatcher.dispatch(event(1)));
        assert!(dispatcher.dispatch(event(2)));
        drop(dispatcher);

        tracker.close();
        tracker.wait().await;
        assert_eq!(
            *sink.seen.lock().unwrap(),
            vec![AdId::Numeric(1), AdId::Numeric(2)]
        );
    }

    #[tokio::test]
    async fn sink_failures_do_not_stop_the_worker() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let tracker = TaskTracker::new();
        let dispatcher = TrackingDispatcher::spawn(sink.clone(), &tracker);

        dispatcher.dispatch(event(1));
        dispatcher.dispatch(event(2));
        drop(dispatcher);

        tracker.close();
        tracker.wait().await;
        assert_eq!(sink.seen.lock().unwrap().len(), 2);
    }
}

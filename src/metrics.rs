//! Prometheus metrics.
//!
//! Thin wrappers over the `metrics` facade so call sites stay one line and
//! metric names live in one place.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder (once) and return its handle.
///
/// If another recorder is already installed the returned handle renders an
/// empty registry.
pub fn init() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Prometheus recorder not installed: {}", e);
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

pub fn record_request(endpoint: &'static str, status: u16) {
    ::metrics::counter!(
        "splicer_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_duration(endpoint: &'static str, start: Instant) {
    ::metrics::histogram!("splicer_request_duration_seconds", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_origin_error() {
    ::metrics::counter!("splicer_origin_errors_total").increment(1);
}

pub fn record_breaks_detected(source: &'static str, count: usize) {
    ::metrics::counter!("splicer_ad_breaks_detected_total", "source" => source)
        .increment(count as u64);
}

pub fn record_break_stitched(count: usize) {
    ::metrics::counter!("splicer_ad_breaks_stitched_total").increment(count as u64);
}

pub fn record_break_skipped(reason: &'static str) {
    ::metrics::counter!("splicer_ad_breaks_skipped_total", "reason" => reason).increment(1);
}

pub fn record_tracking_event(outcome: &'static str) {
    ::metrics::counter!("splicer_tracking_events_total", "outcome" => outcome).increment(1);
}

use crate::ad::{
    AdMediaResolver, AdProvider, DecisionServiceProvider, HttpTrackingSink, LogTrackingSink,
    StaticAdProvider, TrackingDispatcher, TrackingSink,
};
use crate::channel::{ChannelDirectory, HttpChannelDirectory, StaticChannelDirectory};
use crate::config::{AdProviderType, Config};
use crate::error::{Result, SplicerError};
use crate::metrics;
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Shared HTTP client for connection pooling
    pub http_client: Client,
    pub channels: Arc<dyn ChannelDirectory>,
    pub ad_provider: Arc<dyn AdProvider>,
    pub ad_media: AdMediaResolver,
    /// Queue for fire-and-forget tracking events
    pub tracking: TrackingDispatcher,
    /// Present when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire collaborators from `config`. The tracking worker is spawned on `tracker`.
    pub fn new(config: Config, tracker: &TaskTracker) -> Result<Self> {
        let http_client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("splicer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SplicerError::Internal(format!("failed to create HTTP client: {e}")))?;

        let timeout = config.upstream_timeout;

        let channels: Arc<dyn ChannelDirectory> = match (&config.channel_service_url, &config.origin_url) {
            (Some(base), _) => {
                info!("Channel lookup via channel service at {}", base);
                Arc::new(HttpChannelDirectory::new(
                    http_client.clone(),
                    base,
                    config.channel_service_api_key.clone(),
                    timeout,
                    config.channel_cache_ttl,
                ))
            }
            (None, Some(origin)) => {
                info!("Serving fixed origin {} for every channel", origin);
                Arc::new(StaticChannelDirectory::new(
                    origin.clone(),
                    config.ad_break_interval_secs,
                ))
            }
            (None, None) => {
                return Err(SplicerError::Internal(
                    "either a channel service or an origin URL must be configured".to_string(),
                ));
            }
        };

        let ad_provider: Arc<dyn AdProvider> = match (&config.ad_provider_type, &config.channel_service_url) {
            (AdProviderType::Decision, Some(base)) => {
                info!("Using decision service ad provider");
                Arc::new(DecisionServiceProvider::new(
                    http_client.clone(),
                    base,
                    config.channel_service_api_key.clone(),
                    timeout,
                ))
            }
            _ => {
                info!("Using static ad provider ({})", config.ad_source_url);
                Arc::new(StaticAdProvider::new(
                    config.ad_source_url.clone(),
                    config.ad_duration,
                ))
            }
        };

        let sink: Arc<dyn TrackingSink> = match &config.channel_service_url {
            Some(base) => Arc::new(HttpTrackingSink::new(
                http_client.clone(),
                base,
                config.channel_service_api_key.clone(),
                timeout,
            )),
            None => Arc::new(LogTrackingSink),
        };
        let tracking = TrackingDispatcher::spawn(sink, tracker);

        let ad_media = AdMediaResolver::new(
            http_client.clone(),
            timeout,
            config.host_aliases.clone(),
            config.vast_max_wrapper_depth,
        );

        let metrics = config.metrics_enabled.then(metrics::init);

        Ok(Self {
            config: Arc::new(config),
            http_client,
            channels,
            ad_provider,
            ad_media,
            tracking,
            metrics,
        })
    }
}

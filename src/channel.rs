//! Channel lookup and per-channel ad rules.

use crate::cache::TtlCache;
use crate::error::{Result, SplicerError};
use crate::stitcher::{BreakPosition, StaticAdRule};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Break duration advertised for channel-derived rules, seconds
pub const CHANNEL_BREAK_DURATION_SECS: u32 = 30;
/// Offset of the fallback mid-roll when pre-roll is requested without an interval
pub const PRE_ROLL_FALLBACK_OFFSET_SECS: f64 = 60.0;

/// Channel metadata from the channel service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub tenant_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    /// Origin HLS playlist (media or master)
    #[serde(default)]
    pub hls_manifest_url: String,
    #[serde(default)]
    pub ad_break_strategy: String,
    #[serde(default)]
    pub ad_break_interval_seconds: u32,
    #[serde(default)]
    pub enable_pre_roll: bool,
    #[serde(default)]
    pub status: String,
}

/// Additional break rules configured for a channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub channel_id: u64,
    #[serde(default)]
    pub ad_rules: Vec<StaticAdRule>,
}

#[derive(Debug, Deserialize)]
struct ChannelEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<ChannelInfo>,
}

/// Source of channel metadata
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Look up a channel by tenant and channel slug.
    async fn channel(&self, tenant: &str, channel: &str) -> Result<ChannelInfo>;

    /// Extra rules for a channel. Missing configuration is an empty rule set.
    async fn channel_config(&self, tenant_id: u64, channel: &str) -> Result<ChannelConfig>;
}

/// Channel service client with a short-TTL lookup cache
#[derive(Clone, Debug)]
pub struct HttpChannelDirectory {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    cache: TtlCache<ChannelInfo>,
}

impl HttpChannelDirectory {
    pub fn new(
        client: Client,
        base_url: &str,
        api_key: String,
        timeout: Duration,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            cache: TtlCache::new(cache_ttl),
        }
    }
}

#[async_trait]
impl ChannelDirectory for HttpChannelDirectory {
    async fn channel(&self, tenant: &str, channel: &str) -> Result<ChannelInfo> {
        let key = format!("{}/{}", tenant, channel);
        if let Some(info) = self.cache.get(&key) {
            return Ok(info);
        }

        let url = format!("{}/api/v1/channels/{}/{}", self.base_url, tenant, channel);
        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SplicerError::ChannelLookup(format!("{url}: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SplicerError::ChannelLookup(format!(
                "{url}: unexpected status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let envelope: ChannelEnvelope = response
            .json()
            .await
            .map_err(|e| SplicerError::ChannelLookup(format!("{url}: invalid body: {e}")))?;

        let info = match envelope {
            ChannelEnvelope {
                success: true,
                data: Some(info),
            } => info,
            _ => {
                return Err(SplicerError::ChannelLookup(format!(
                    "{url}: service returned success=false"
                )));
            }
        };

        info!(
            "Channel {}/{} resolved: id={}, tenant={}, interval={}s",
            tenant, channel, info.id, info.tenant_id, info.ad_break_interval_seconds
        );
        self.cache.insert(&key, info.clone());
        Ok(info)
    }

    async fn channel_config(&self, tenant_id: u64, channel: &str) -> Result<ChannelConfig> {
        let url = format!("{}/channels/{}/config", self.base_url, channel);
        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .header("X-Tenant-ID", tenant_id.to_string())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SplicerError::ChannelLookup(format!("{url}: {e}")))?;

        if response.status() != StatusCode::OK {
            debug!(
                "No channel config for {} ({}), using defaults",
                channel,
                response.status()
            );
            return Ok(ChannelConfig::default());
        }

        response
            .json()
            .await
            .map_err(|e| SplicerError::ChannelLookup(format!("{url}: invalid body: {e}")))
    }
}

/// Serves one fixed origin for every tenant/channel pair
#[derive(Clone, Debug)]
pub struct StaticChannelDirectory {
    origin_url: String,
    ad_break_interval_secs: u32,
}

impl StaticChannelDirectory {
    pub fn new(origin_url: String, ad_break_interval_secs: Option<u32>) -> Self {
        Self {
            origin_url,
            ad_break_interval_secs: ad_break_interval_secs.unwrap_or(0),
        }
    }
}

#[async_trait]
impl ChannelDirectory for StaticChannelDirectory {
    async fn channel(&self, _tenant: &str, channel: &str) -> Result<ChannelInfo> {
        Ok(ChannelInfo {
            slug: channel.to_string(),
            name: channel.to_string(),
            hls_manifest_url: self.origin_url.clone(),
            ad_break_interval_seconds: self.ad_break_interval_secs,
            status: "active".to_string(),
            ..Default::default()
        })
    }

    async fn channel_config(&self, _tenant_id: u64, _channel: &str) -> Result<ChannelConfig> {
        Ok(ChannelConfig::default())
    }
}

/// Rules implied by a channel's own settings.
///
/// An interval yields repeating mid-rolls starting at the interval. A pre-roll
/// request is honoured as a single early mid-roll instead; no pre-roll is ever
/// emitted here.
pub fn rules_from_channel(info: &ChannelInfo) -> Vec<StaticAdRule> {
    if info.ad_break_interval_seconds > 0 {
        let interval = f64::from(info.ad_break_interval_seconds);
        return vec![StaticAdRule {
            position: BreakPosition::MidRoll,
            offset: interval,
            duration: CHANNEL_BREAK_DURATION_SECS,
            interval,
        }];
    }

    if info.enable_pre_roll {
        warn!(
            "Channel {} requests pre-roll; scheduling a mid-roll at {}s instead",
            info.slug, PRE_ROLL_FALLBACK_OFFSET_SECS
        );
        return vec![StaticAdRule {
            position: BreakPosition::MidRoll,
            offset: PRE_ROLL_FALLBACK_OFFSET_SECS,
            duration: CHANNEL_BREAK_DURATION_SECS,
            interval: 0.0,
        }];
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn directory(server: &MockServer) -> HttpChannelDirectory {
        HttpChannelDirectory::new(
            Client::new(),
            &server.uri(),
            "key".to_string(),
            Duration::from_secs(2),
            Duration::from_secs(30),
        )
    }

    // ── Rules ───────────────────────────────────────────────────────────────

    #[test]
    fn interval_yields_repeating_mid_roll() {
        let info = ChannelInfo {
            ad_break_interval_seconds: 120,
            enable_pre_roll: true,
            ..Default::default()
        };
        let rules = rules_from_channel(&info);
        assert_eq!(
            rules,
            vec![StaticAdRule {
                position: BreakPosition::MidRoll,
                offset: 120.0,
                duration: 30,
                interval: 120.0,
            }]
        );
    }

    #[test]
    fn pre_roll_without_interval_becomes_mid_roll_at_sixty() {
        let info = ChannelInfo {
            enable_pre_roll: true,
            ..Default::default()
        };
        let rules = rules_from_channel(&info);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].position, BreakPosition::MidRoll);
        assert_eq!(rules[0].offset, 60.0);
        assert_eq!(rules[0].interval, 0.0);
    }

    #[test]
    fn no_settings_no_rules() {
        assert!(rules_from_channel(&ChannelInfo::default()).is_empty());
    }

    // ── HTTP directory ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn channel_lookup_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/channels/acme/news"))
            .and(header("X-API-Key", "key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": {
                    "id": 4,
                    "tenant_id": 2,
                    "name": "News",
                    "slug": "news",
                    "hls_manifest_url": "https://cdn.example.com/news/index.m3u8",
                    "ad_break_interval_seconds": 300,
                    "enable_pre_roll": false,
                    "status": "active"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = directory(&server);
        let first = dir.channel("acme", "news").await.unwrap();
        let second = dir.channel("acme", "news").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.tenant_id, 2);
        assert_eq!(first.hls_manifest_url, "https://cdn.example.com/news/index.m3u8");
    }

    #[tokio::test]
    async fn unsuccessful_lookup_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false})),
            )
            .mount(&server)
            .await;

        let err = directory(&server).channel("acme", "gone").await.unwrap_err();
        assert!(matches!(err, SplicerError::ChannelLookup(_)));
    }

    #[tokio::test]
    async fn missing_channel_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(directory(&server).channel("acme", "nope").await.is_err());
    }

    #[tokio::test]
    async fn channel_config_sends_tenant_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/news/config"))
            .and(header("X-Tenant-ID", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "channel_id": 4,
                "ad_rules": [{"position": "post-roll", "offset": 10, "duration": 15}]
            })))
            .mount(&server)
            .await;

        let config = directory(&server).channel_config(2, "news").await.unwrap();
        assert_eq!(config.ad_rules.len(), 1);
        assert_eq!(config.ad_rules[0].position, BreakPosition::PostRoll);
    }

    #[tokio::test]
    async fn missing_channel_config_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = directory(&server).channel_config(2, "news").await.unwrap();
        assert_eq!(config, ChannelConfig::default());
    }

    // ── Static directory ────────────────────────────────────────────────────

    #[tokio::test]
    async fn static_directory_serves_fixed_origin() {
        let dir = StaticChannelDirectory::new("https://cdn/live.m3u8".to_string(), Some(90));
        let info = dir.channel("any", "chan").await.unwrap();
        assert_eq!(info.hls_manifest_url, "https://cdn/live.m3u8");
        assert_eq!(info.ad_break_interval_seconds, 90);
        assert_eq!(rules_from_channel(&info)[0].offset, 90.0);
    }
}

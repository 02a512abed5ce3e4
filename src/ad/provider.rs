use crate::error::{Result, SplicerError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Maximum `device` length accepted by the decision service
pub const MAX_DEVICE_LEN: usize = 100;

/// Ad identifier. Decision services hand out numeric ids; static and VAST
/// sourced ads may carry opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for AdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdId::Numeric(id) => write!(f, "{}", id),
            AdId::Text(id) => f.write_str(id),
        }
    }
}

/// Request body for one ad break decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdDecisionRequest {
    pub tenant_id: u64,
    pub channel: String,
    pub ad_break_id: String,
    pub position: String,
    pub duration_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// RFC 3339
    pub timestamp: String,
}

/// Optional beacon URLs supplied with an ad
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_quartile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub third_quartile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<String>,
}

/// A single ad chosen for a break
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    #[serde(alias = "id")]
    pub ad_id: AdId,
    /// Either a VAST tag or a direct `.m3u8` media playlist
    #[serde(rename = "vast_url", alias = "media_source_uri")]
    pub media_uri: String,
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default, rename = "ad_type", alias = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_through_url: Option<String>,
    #[serde(default, alias = "tracking_uris")]
    pub tracking_urls: TrackingUrls,
}

/// Outcome of a decision call, decoded once at the boundary
#[derive(Debug, Clone, PartialEq)]
pub enum AdDecision {
    Ads(Vec<Ad>),
    /// `success = false` or no ads. Not an error: the break is skipped.
    Empty,
}

impl AdDecision {
    fn from_ads(ads: Vec<Ad>) -> Self {
        if ads.is_empty() {
            AdDecision::Empty
        } else {
            AdDecision::Ads(ads)
        }
    }
}

#[derive(Debug, Deserialize)]
struct DecisionEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: DecisionData,
}

#[derive(Debug, Default, Deserialize)]
struct DecisionData {
    #[serde(default)]
    ads: Vec<Ad>,
}

/// Trait for ad decision sources
///
/// Implementations pick the ads that fill one break. The stitcher resolves
/// each ad's media afterwards, so providers only deal in references.
#[async_trait]
pub trait AdProvider: Send + Sync {
    /// Choose ads for a break.
    ///
    /// # Errors
    ///
    /// Transport or decoding failures. Callers skip the break.
    async fn decide(&self, request: &AdDecisionRequest) -> Result<AdDecision>;
}

/// Serves the same configured ad playlist for every break
#[derive(Clone, Debug)]
pub struct StaticAdProvider {
    /// Media playlist (or VAST tag) handed out for every break
    ad_source_url: String,
    /// Advertised ad duration in seconds
    ad_duration: u32,
}

impl StaticAdProvider {
    pub fn new(ad_source_url: String, ad_duration: u32) -> Self {
        Self {
            ad_source_url,
            ad_duration,
        }
    }
}

#[async_trait]
impl AdProvider for StaticAdProvider {
    async fn decide(&self, request: &AdDecisionRequest) -> Result<AdDecision> {
        if self.ad_source_url.is_empty() {
            return Ok(AdDecision::Empty);
        }

        info!(
            "StaticAdProvider: serving {} for break {}",
            self.ad_source_url, request.ad_break_id
        );

        Ok(AdDecision::Ads(vec![Ad {
            ad_id: AdId::Text(format!("static-{}", request.ad_break_id)),
            media_uri: self.ad_source_url.clone(),
            duration_seconds: self.ad_duration,
            kind: "static".to_string(),
            click_through_url: None,
            tracking_urls: TrackingUrls::default(),
        }]))
    }
}

/// Asks the channel service's decision endpoint (`POST /api/v1/ads/decision`)
#[derive(Clone, Debug)]
pub struct DecisionServiceProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl DecisionServiceProvider {
    pub fn new(client: Client, base_url: &str, api_key: String, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/v1/ads/decision", base_url.trim_end_matches('/')),
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl AdProvider for DecisionServiceProvider {
    async fn decide(&self, request: &AdDecisionRequest) -> Result<AdDecision> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-Key", &self.api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| SplicerError::AdDecision(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SplicerError::AdDecision(format!(
                "unexpected status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let envelope: DecisionEnvelope = response
            .json()
            .await
            .map_err(|e| SplicerError::AdDecision(format!("invalid response body: {e}")))?;

        if !envelope.success {
            warn!(
                "Decision service declined break {} (success=false)",
                request.ad_break_id
            );
            return Ok(AdDecision::Empty);
        }

        let decision = AdDecision::from_ads(envelope.data.ads);
        if let AdDecision::Ads(ads) = &decision {
            info!(
                "Decision service returned {} ad(s) for break {}",
                ads.len(),
                request.ad_break_id
            );
        }
        Ok(decision)
    }
}

/// Clamp a user agent to what the decision service accepts, defaulting to `Unknown`.
pub fn device_from_user_agent(user_agent: Option<&str>) -> String {
    match user_agent.map(str::trim).filter(|ua| !ua.is_empty()) {
        Some(ua) => ua.chars().take(MAX_DEVICE_LEN).collect(),
        None => "Unknown".to_string(),
    }
}

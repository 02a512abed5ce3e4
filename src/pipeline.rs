//! The manifest request pipeline.
//!
//! fetch → normalize → (master → media) → parse → detect → decide and resolve
//! ads → stitch → render. Steps run one after another for a request; only
//! tracking leaves the request, through the dispatcher queue.
//!
//! Failure policy: only channel lookup and the first origin fetch can fail the
//! request. Anything later degrades to the normalized origin text or to a
//! manifest with fewer breaks.

use crate::ad::provider::{AdDecision, AdDecisionRequest, AdId, device_from_user_agent};
use crate::ad::tracking::{TrackingEvent, TrackingEventType};
use crate::channel::{ChannelInfo, rules_from_channel};
use crate::error::{Result, SplicerError};
use crate::fetch::fetch_text;
use crate::hls::playlist::{first_variant_url, is_master_playlist, normalize_urls};
use crate::hls::{Manifest, parse_manifest, render_manifest};
use crate::metrics;
use crate::server::state::AppState;
use crate::stitcher::{
    AdBreak, AdBreakWithAds, AdPlaylist, BreakSource, StaticAdRule, detect_ad_breaks,
    stitch_multiple_ad_breaks,
};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

/// Caller context for one manifest request
#[derive(Debug, Clone, Default)]
pub struct ManifestRequest {
    pub tenant: String,
    pub channel: String,
    /// `CF-IPCountry`
    pub geo: Option<String>,
    pub user_agent: Option<String>,
    pub client_ip: Option<String>,
    pub session_id: Option<String>,
}

/// Result of a manifest request
#[derive(Debug, Clone)]
pub struct ManifestOutput {
    pub body: String,
    /// Breaks actually spliced in
    pub inserted_breaks: usize,
    /// Set when the normalized origin text was returned unmodified
    pub fallback: Option<&'static str>,
}

impl ManifestOutput {
    fn fallback(body: String, reason: &'static str) -> Self {
        Self {
            body,
            inserted_breaks: 0,
            fallback: Some(reason),
        }
    }
}

/// A media playlist ready for detection
struct MediaPlaylist {
    url: String,
    raw: String,
    normalized: String,
}

/// Ads that survived resolution for one break
struct PreparedBreak {
    ad_break: AdBreak,
    ad_ids: Vec<AdId>,
    playlists: Vec<AdPlaylist>,
}

/// Build the stitched manifest for one channel.
///
/// # Errors
///
/// [`SplicerError::ChannelLookup`] when the channel cannot be resolved,
/// [`SplicerError::OriginUnavailable`] when the origin playlist cannot be fetched.
pub async fn build_manifest(state: &AppState, request: &ManifestRequest) -> Result<ManifestOutput> {
    let channel = state
        .channels
        .channel(&request.tenant, &request.channel)
        .await?;

    let origin_url = channel.hls_manifest_url.trim().to_string();
    if origin_url.is_empty() {
        return Err(SplicerError::ChannelLookup(format!(
            "channel {}/{} has no manifest URL",
            request.tenant, request.channel
        )));
    }

    let raw = fetch_text(&state.http_client, &origin_url, state.config.upstream_timeout)
        .await
        .map_err(|e| {
            metrics::record_origin_error();
            SplicerError::OriginUnavailable {
                url: origin_url.clone(),
                reason: e.to_string(),
            }
        })?;

    let aliases = &state.config.host_aliases;
    let normalized_origin = normalize_urls(&raw, &origin_url, aliases);

    let media = if is_master_playlist(&normalized_origin) {
        match resolve_media_playlist(state, &normalized_origin, &origin_url).await {
            Ok(media) => media,
            Err(e) => {
                warn!("Master playlist resolution failed, serving origin as-is: {}", e);
                return Ok(ManifestOutput::fallback(normalized_origin, "master_playlist"));
            }
        }
    } else {
        MediaPlaylist {
            url: origin_url.clone(),
            raw,
            normalized: normalized_origin,
        }
    };

    let manifest = match parse_manifest(&media.normalized) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!("Origin playlist not parseable, serving it as-is: {}", e);
            return Ok(ManifestOutput::fallback(media.normalized, "parse"));
        }
    };
    debug!(
        "Parsed {} segment(s), {:.2}s from {}",
        manifest.segments.len(),
        manifest.total_duration(),
        media.url
    );

    let rules = collect_rules(state, &channel, &request.channel).await;
    let breaks = detect_ad_breaks(&manifest, &media.raw, &rules);
    record_detected(&breaks);

    let origin_is_http = origin_url.starts_with("http://");
    let mut prepared = Vec::with_capacity(breaks.len());
    for ad_break in breaks {
        if let Some(ready) =
            prepare_break(state, request, &channel, ad_break, origin_is_http).await
        {
            prepared.push(ready);
        }
    }

    let (stitched, inserted_breaks) = stitch(state, request, &channel, manifest, prepared);
    let rendered = render_manifest(&stitched);
    let body = normalize_urls(&rendered, &media.url, aliases);

    info!(
        "Served {}/{}: {} ad break(s) stitched",
        request.tenant, request.channel, inserted_breaks
    );
    Ok(ManifestOutput {
        body,
        inserted_breaks,
        fallback: None,
    })
}

async fn resolve_media_playlist(
    state: &AppState,
    master: &str,
    master_url: &str,
) -> Result<MediaPlaylist> {
    let url = first_variant_url(master, master_url)?;
    debug!("Master playlist detected, following first variant {}", url);

    let raw = fetch_text(&state.http_client, &url, state.config.upstream_timeout).await?;
    let normalized = normalize_urls(&raw, &url, &state.config.host_aliases);
    Ok(MediaPlaylist {
        url,
        raw,
        normalized,
    })
}

/// Channel-derived rules, then channel config rules, then globally configured rules.
async fn collect_rules(state: &AppState, channel: &ChannelInfo, slug: &str) -> Vec<StaticAdRule> {
    let mut rules = rules_from_channel(channel);

    match state.channels.channel_config(channel.tenant_id, slug).await {
        Ok(config) => rules.extend(config.ad_rules),
        Err(e) => warn!("Channel config for {} unavailable: {}", slug, e),
    }

    rules.extend(state.config.static_ad_rules.iter().cloned());
    rules
}

fn record_detected(breaks: &[AdBreak]) {
    let cues = breaks
        .iter()
        .filter(|b| b.source == BreakSource::Scte35)
        .count();
    metrics::record_breaks_detected(BreakSource::Scte35.as_str(), cues);
    metrics::record_breaks_detected(BreakSource::Static.as_str(), breaks.len() - cues);
}

/// Decide and resolve ads for one break. `None` skips the break.
async fn prepare_break(
    state: &AppState,
    request: &ManifestRequest,
    channel: &ChannelInfo,
    ad_break: AdBreak,
    origin_is_http: bool,
) -> Option<PreparedBreak> {
    let decision_request = AdDecisionRequest {
        tenant_id: channel.tenant_id,
        channel: request.channel.clone(),
        ad_break_id: ad_break.id.clone(),
        position: ad_break.position.as_str().to_string(),
        duration_seconds: ad_break.duration,
        geo: request.geo.clone(),
        device: Some(device_from_user_agent(request.user_agent.as_deref())),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    let ads = match state.ad_provider.decide(&decision_request).await {
        Ok(AdDecision::Ads(ads)) => ads,
        Ok(AdDecision::Empty) => {
            warn!("No ads for break {} at {:.1}s", ad_break.id, ad_break.offset);
            metrics::record_break_skipped("no_ads");
            return None;
        }
        Err(e) => {
            warn!("Ad decision failed for break {}: {}", ad_break.id, e);
            metrics::record_break_skipped("decision_failed");
            return None;
        }
    };

    let mut ad_ids = Vec::with_capacity(ads.len());
    let mut playlists = Vec::with_capacity(ads.len());
    for ad in &ads {
        match state.ad_media.resolve(ad, origin_is_http).await {
            Ok(playlist) => {
                ad_ids.push(ad.ad_id.clone());
                playlists.push(playlist);
            }
            Err(e) => warn!("Skipping ad {} in break {}: {}", ad.ad_id, ad_break.id, e),
        }
    }

    if playlists.is_empty() {
        warn!("Break {} has no playable ads, skipping", ad_break.id);
        metrics::record_break_skipped("no_playable_ads");
        return None;
    }

    Some(PreparedBreak {
        ad_break,
        ad_ids,
        playlists,
    })
}

/// Stitch prepared breaks and queue impressions for the ones that landed.
fn stitch(
    state: &AppState,
    request: &ManifestRequest,
    channel: &ChannelInfo,
    manifest: Manifest,
    prepared: Vec<PreparedBreak>,
) -> (Manifest, usize) {
    if prepared.is_empty() {
        return (manifest, 0);
    }

    let with_ads: Vec<AdBreakWithAds> = prepared
        .iter()
        .map(|p| AdBreakWithAds {
            offset: p.ad_break.offset,
            ads: p.playlists.clone(),
        })
        .collect();

    let stitched = stitch_multiple_ad_breaks(manifest, &with_ads);
    for skipped in &stitched.skipped {
        metrics::record_break_skipped(skipped.reason.as_str());
    }
    metrics::record_break_stitched(stitched.inserted.len());

    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    for inserted in &stitched.inserted {
        let Some(source) = prepared.iter().find(|p| p.ad_break.offset == inserted.offset) else {
            continue;
        };
        for ad_id in &source.ad_ids {
            state.tracking.dispatch(TrackingEvent {
                tenant_id: channel.tenant_id,
                channel_id: (channel.id > 0).then_some(channel.id),
                ad_id: ad_id.clone(),
                event_type: TrackingEventType::Impression,
                session_id: request.session_id.clone(),
                device_type: Some(device_from_user_agent(request.user_agent.as_deref())),
                geo_country: request.geo.clone(),
                ip_address: request.client_ip.clone(),
                user_agent: request.user_agent.clone(),
                timestamp: timestamp.clone(),
            });
        }
    }

    let count = stitched.inserted.len();
    (stitched.manifest, count)
}

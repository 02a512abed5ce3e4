//! Turns a decided [`Ad`] into a parsed, stitch-ready ad playlist.

use crate::ad::provider::Ad;
use crate::ad::vast::{AdMedia, VastResolver};
use crate::error::{Result, SplicerError};
use crate::fetch::fetch_text;
use crate::hls::parse_manifest;
use crate::hls::playlist::{HostAliases, first_variant_url, is_master_playlist, normalize_urls};
use crate::stitcher::AdPlaylist;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches and prepares ad media playlists
#[derive(Clone, Debug)]
pub struct AdMediaResolver {
    client: Client,
    timeout: Duration,
    aliases: HostAliases,
    vast: VastResolver,
}

impl AdMediaResolver {
    pub fn new(
        client: Client,
        timeout: Duration,
        aliases: HostAliases,
        max_wrapper_depth: usize,
    ) -> Self {
        let vast = VastResolver::new(client.clone(), timeout, max_wrapper_depth);
        Self {
            client,
            timeout,
            aliases,
            vast,
        }
    }

    /// Resolve, fetch and parse the media playlist for one ad.
    ///
    /// `origin_is_http` downgrades alias-canonical HTTPS ad URLs to HTTP so a
    /// plain-HTTP stream does not mix schemes for those hosts.
    ///
    /// # Errors
    ///
    /// VAST failures, MP4-only creatives, ad playlist fetch or parse failures.
    /// Callers drop the ad and keep going.
    pub async fn resolve(&self, ad: &Ad, origin_is_http: bool) -> Result<AdPlaylist> {
        let playlist_url = self.playlist_url(ad).await?;
        let playlist_url = self.aliases.apply(&playlist_url);

        let mut text = fetch_text(&self.client, &playlist_url, self.timeout).await?;
        let mut text_url = playlist_url;

        if is_master_playlist(&text) {
            let variant = first_variant_url(&text, &text_url)?;
            debug!("Ad {} uses a master playlist, following {}", ad.ad_id, variant);
            text = fetch_text(&self.client, &variant, self.timeout).await?;
            text_url = variant;
        }

        let mut text = normalize_urls(&text, &text_url, &self.aliases);
        if origin_is_http {
            text = self.aliases.downgrade_to_http(&text);
        }

        let manifest = parse_manifest(&text)?;
        info!(
            "Prepared ad {}: {} segment(s), {:.1}s",
            ad.ad_id,
            manifest.segments.len(),
            manifest.total_duration()
        );

        Ok(AdPlaylist {
            ad_id: ad.ad_id.to_string(),
            manifest,
        })
    }

    /// Direct `.m3u8` references are used as-is; anything else is a VAST tag.
    async fn playlist_url(&self, ad: &Ad) -> Result<String> {
        let uri = ad.media_uri.trim();
        if is_playlist_reference(uri) {
            return Ok(uri.to_string());
        }

        match self.vast.resolve(uri).await? {
            AdMedia::Playlist(url) => Ok(url),
            AdMedia::Progressive(url) => Err(SplicerError::UnsupportedAdMedia(format!(
                "ad {} only offers progressive media {}",
                ad.ad_id, url
            ))),
        }
    }
}

fn is_playlist_reference(uri: &str) -> bool {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    path.to_ascii_lowercase().ends_with(".m3u8")
}

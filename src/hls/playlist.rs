//! Playlist resolution and URI normalisation applied to raw origin text
//! before it reaches the parser.

use crate::error::{Result, SplicerError};
use tracing::{debug, warn};
use url::{Position, Url};

/// Host rewrite table: each entry replaces a non-canonical ad-origin prefix
/// (e.g. `http://localhost:8000`) with its public form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostAliases {
    entries: Vec<(String, String)>,
}

impl HostAliases {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Parse `from=to,from=to`. Malformed pairs are skipped.
    pub fn parse(pairs: &str) -> Self {
        let entries = pairs
            .split(',')
            .filter_map(|pair| {
                let (from, to) = pair.split_once('=')?;
                let (from, to) = (from.trim(), to.trim());
                (!from.is_empty() && !to.is_empty()).then(|| (from.to_string(), to.to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite every alias occurrence to its canonical form.
    pub fn apply(&self, text: &str) -> String {
        self.entries
            .iter()
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }

    /// Turn `https://` canonical hosts back into `http://` so ad segments match
    /// a plain-HTTP origin.
    pub fn downgrade_to_http(&self, text: &str) -> String {
        self.entries
            .iter()
            .filter_map(|(_, to)| {
                to.strip_prefix("https://")
                    .map(|host| (to.as_str(), format!("http://{}", host)))
            })
            .fold(text.to_string(), |acc, (secure, plain)| {
                acc.replace(secure, &plain)
            })
    }
}

/// Rewrite host aliases and make every URI line absolute.
///
/// Relative URIs resolve against the directory of `fetch_url`; path-absolute
/// URIs (`/...`) against its scheme and host. Lines already carrying a scheme
/// are left untouched, mixed HTTP/HTTPS included.
pub fn normalize_urls(content: &str, fetch_url: &str, aliases: &HostAliases) -> String {
    let content = aliases.apply(content);

    let Ok(base) = Url::parse(fetch_url) else {
        warn!("Cannot normalize URLs against unparseable base: {}", fetch_url);
        return content;
    };

    let origin = &base[..Position::BeforePath];
    let directory = match base.path().rfind('/') {
        Some(idx) => &base.path()[..=idx],
        None => "/",
    };

    content
        .split('\n')
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.contains("://") {
                line.to_string()
            } else if trimmed.starts_with('/') {
                format!("{}{}", origin, trimmed)
            } else {
                format!("{}{}{}", origin, directory, trimmed)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// A playlist carrying `#EXT-X-STREAM-INF` is a master (variant) playlist.
pub fn is_master_playlist(content: &str) -> bool {
    content.contains("#EXT-X-STREAM-INF")
}

/// URI of the first variant in a master playlist, resolved to absolute.
pub fn first_variant_url(content: &str, base_url: &str) -> Result<String> {
    let mut lines = content.lines().map(str::trim);

    lines
        .by_ref()
        .find(|line| line.starts_with("#EXT-X-STREAM-INF"))
        .ok_or_else(|| SplicerError::MasterPlaylist("no #EXT-X-STREAM-INF tag".to_string()))?;

    let variant = lines
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .ok_or_else(|| {
            SplicerError::MasterPlaylist("no media playlist URI after #EXT-X-STREAM-INF".to_string())
        })?;

    if variant.contains("://") {
        return Ok(variant.to_string());
    }

    let base = Url::parse(base_url)
        .map_err(|e| SplicerError::MasterPlaylist(format!("invalid base URL {base_url}: {e}")))?;
    let resolved = base
        .join(variant)
        .map_err(|e| SplicerError::MasterPlaylist(format!("cannot resolve {variant}: {e}")))?;

    debug!("Resolved first variant {} -> {}", variant, resolved);
    Ok(resolved.to_string())
}

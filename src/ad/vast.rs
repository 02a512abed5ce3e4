//! VAST ad-response handling.
//!
//! Only what stitching needs is extracted: the wrapper redirect and the
//! linear media files. Wrapper chains are followed up to a configured depth.

use crate::error::{Result, SplicerError};
use crate::fetch::fetch_text;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

const HLS_MIME_TYPES: [&str; 2] = ["application/x-mpegurl", "application/vnd.apple.mpegurl"];

/// A `<MediaFile>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub mime_type: String,
    pub url: String,
}

impl MediaFile {
    fn is_hls(&self) -> bool {
        HLS_MIME_TYPES.contains(&self.mime_type.to_ascii_lowercase().as_str())
            || self.url.to_ascii_lowercase().ends_with(".m3u8")
    }

    fn is_mp4(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("video/mp4")
            || self.url.to_ascii_lowercase().ends_with(".mp4")
    }
}

/// The parts of one VAST document the stitcher cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VastDocument {
    pub ad_id: Option<String>,
    /// `<Wrapper><VASTAdTagURI>`; set when this document only redirects
    pub wrapper_uri: Option<String>,
    pub has_inline: bool,
    pub media_files: Vec<MediaFile>,
}

/// Final media of a VAST chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdMedia {
    /// HLS media or master playlist, ready for stitching
    Playlist(String),
    /// Progressive download only; cannot be stitched into HLS
    Progressive(String),
}

impl VastDocument {
    /// Prefer an HLS rendition, fall back to MP4.
    pub fn select_media(&self) -> Result<AdMedia> {
        if let Some(hls) = self.media_files.iter().find(|m| m.is_hls()) {
            return Ok(AdMedia::Playlist(hls.url.clone()));
        }
        if let Some(mp4) = self.media_files.iter().find(|m| m.is_mp4()) {
            return Ok(AdMedia::Progressive(mp4.url.clone()));
        }
        if !self.has_inline {
            return Err(SplicerError::Vast("no inline ad content".to_string()));
        }
        Err(SplicerError::Vast("no usable media file".to_string()))
    }
}

enum TextTarget {
    None,
    WrapperUri,
    MediaFile,
}

/// Parse a VAST document. Only the first `<Ad>` is considered.
pub fn parse_vast(xml: &str) -> Result<VastDocument> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = VastDocument::default();
    let mut saw_root = false;
    let mut ads_seen = 0usize;
    let mut depth_in_ad = 0usize;
    let mut target = TextTarget::None;
    let mut wrapper_uri = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SplicerError::Vast(format!("XML parse error: {e}")))?;

        match event {
            Event::Start(e) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == b"VAST" {
                    saw_root = true;
                    continue;
                }
                if name == b"Ad" {
                    ads_seen += 1;
                    if ads_seen == 1 {
                        doc.ad_id = attribute(&e, b"id");
                    }
                }
                if ads_seen != 1 {
                    continue;
                }
                depth_in_ad += 1;
                match name {
                    b"InLine" => doc.has_inline = true,
                    b"VASTAdTagURI" => target = TextTarget::WrapperUri,
                    b"MediaFile" => {
                        doc.media_files.push(MediaFile {
                            mime_type: attribute(&e, b"type").unwrap_or_default(),
                            url: String::new(),
                        });
                        target = TextTarget::MediaFile;
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                if ads_seen == 1 && depth_in_ad > 0 {
                    depth_in_ad -= 1;
                    if e.local_name().as_ref() == b"Ad" {
                        // Everything after the first ad is ignored.
                        ads_seen += 1;
                    }
                }
                target = TextTarget::None;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SplicerError::Vast(format!("invalid text: {e}")))?;
                push_text(&mut doc, &mut wrapper_uri, &target, &text);
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                let text = String::from_utf8_lossy(&raw);
                push_text(&mut doc, &mut wrapper_uri, &target, &text);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"VAST" => saw_root = true,
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(SplicerError::Vast("missing <VAST> root element".to_string()));
    }

    doc.media_files.retain(|m| !m.url.is_empty());
    let wrapper_uri = wrapper_uri.trim();
    if !wrapper_uri.is_empty() {
        doc.wrapper_uri = Some(wrapper_uri.to_string());
    }
    Ok(doc)
}

fn push_text(doc: &mut VastDocument, wrapper_uri: &mut String, target: &TextTarget, text: &str) {
    match target {
        TextTarget::WrapperUri => wrapper_uri.push_str(text.trim()),
        TextTarget::MediaFile => {
            if let Some(media) = doc.media_files.last_mut() {
                media.url.push_str(text.trim());
            }
        }
        TextTarget::None => {}
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Follows VAST wrapper chains to the final media
#[derive(Clone, Debug)]
pub struct VastResolver {
    client: Client,
    timeout: Duration,
    max_wrapper_depth: usize,
}

impl VastResolver {
    pub fn new(client: Client, timeout: Duration, max_wrapper_depth: usize) -> Self {
        Self {
            client,
            timeout,
            max_wrapper_depth,
        }
    }

    /// Resolve a VAST tag URL to its media.
    ///
    /// # Errors
    ///
    /// Fetch failures, malformed XML, documents without media, or a wrapper
    /// chain longer than the configured depth.
    pub async fn resolve(&self, tag_url: &str) -> Result<AdMedia> {
        let mut url = tag_url.to_string();

        for hop in 0..=self.max_wrapper_depth {
            let xml = fetch_text(&self.client, &url, self.timeout)
                .await
                .map_err(|e| SplicerError::Vast(format!("fetch {url}: {e}")))?;
            let doc = parse_vast(&xml)?;

            if let Some(next) = doc.wrapper_uri {
                debug!("VAST wrapper hop {}: {} -> {}", hop + 1, url, next);
                url = next;
                continue;
            }

            let media = doc.select_media()?;
            info!("Resolved VAST {} to {:?}", tag_url, media);
            return Ok(media);
        }

        Err(SplicerError::Vast(format!(
            "wrapper chain deeper than {} for {}",
            self.max_wrapper_depth, tag_url
        )))
    }
}

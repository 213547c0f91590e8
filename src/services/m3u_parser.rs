use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::models::{Category, Channel, ParsedPlaylist, UNCATEGORIZED, UNKNOWN_NAME};

const EXTINF_TAG: &str = "#EXTINF";

lazy_static! {
    /// Regex to parse EXTINF attributes (tvg-id="...", group-title="...", etc)
    static ref ATTR_REGEX: Regex = Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap();

    /// Regex to extract duration from EXTINF line
    static ref DURATION_REGEX: Regex = Regex::new(r"^\s*(-?\d+)").unwrap();
}

/// Parsed EXTINF line data
#[derive(Debug, Default)]
struct ExtinfData {
    duration: i32,
    attributes: HashMap<String, String>,
    title: String,
}

impl ExtinfData {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Split EXTINF content into attribute header and display title.
/// The separator is the last comma outside a quoted attribute value,
/// or simply the last comma when the quotes never balance.
fn split_title(content: &str) -> (&str, &str) {
    let mut in_quotes = false;
    let mut separator = None;

    for (idx, ch) in content.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => separator = Some(idx),
            _ => {}
        }
    }

    if in_quotes {
        separator = content.rfind(',');
    }

    match separator {
        Some(idx) => (&content[..idx], &content[idx + 1..]),
        None => (content, ""),
    }
}

/// Parse an EXTINF line
/// Format: #EXTINF:duration tvg-id="..." tvg-name="..." tvg-logo="..." group-title="...",Title
///
/// Never fails: a line without a comma or attributes yields empty data.
fn parse_extinf(line: &str) -> ExtinfData {
    let content = line.strip_prefix(EXTINF_TAG).unwrap_or(line);
    let content = content.strip_prefix(':').unwrap_or(content);

    let (header, title) = split_title(content);

    let duration = DURATION_REGEX
        .captures(header)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(-1);

    let mut attributes = HashMap::new();
    for caps in ATTR_REGEX.captures_iter(header) {
        let key = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let value = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
        attributes.insert(key, value);
    }

    ExtinfData {
        duration,
        attributes,
        title: title.trim().to_string(),
    }
}

/// Assigns category ids in first-seen order
#[derive(Default)]
struct CategoryTable {
    ids: HashMap<String, String>,
    categories: Vec<Category>,
}

impl CategoryTable {
    fn id_for(&mut self, name: &str) -> String {
        if let Some(id) = self.ids.get(name) {
            return id.clone();
        }

        let id = (self.categories.len() + 1).to_string();
        self.ids.insert(name.to_string(), id.clone());
        self.categories.push(Category {
            category_id: id.clone(),
            category_name: name.to_string(),
            parent_id: 0,
        });
        id
    }
}

/// Parse M3U/M3U8 text into channels and categories.
///
/// Line oriented and tolerant: unknown tags, stray URL lines and
/// EXTINF records without a following URL are skipped, never reported.
pub fn parse_m3u(text: &str) -> ParsedPlaylist {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut channels: Vec<Channel> = Vec::new();
    let mut categories = CategoryTable::default();
    let mut current_extinf: Option<ExtinfData> = None;
    let mut dropped = 0usize;

    // CR-only line endings show up in playlists exported from old tools
    for line in text.split(['\n', '\r']) {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with(EXTINF_TAG) {
            if current_extinf.is_some() {
                dropped += 1;
            }
            current_extinf = Some(parse_extinf(trimmed));
            continue;
        }

        // #EXTM3U, #EXTGRP, #EXTVLCOPT and friends
        if trimmed.starts_with('#') {
            continue;
        }

        // Stream URL line; ignored unless an EXTINF record is open
        let Some(extinf) = current_extinf.take() else {
            continue;
        };

        let name = if !extinf.title.is_empty() {
            extinf.title.clone()
        } else {
            extinf
                .attribute("tvg-name")
                .unwrap_or(UNKNOWN_NAME)
                .to_string()
        };

        let category_name = extinf
            .attribute("group-title")
            .unwrap_or(UNCATEGORIZED)
            .to_string();
        let category_id = categories.id_for(&category_name);

        let stream_id = u32::try_from(channels.len() + 1).unwrap_or(u32::MAX);

        channels.push(Channel {
            stream_id,
            name,
            category_id,
            category_name,
            logo_url: extinf.attribute("tvg-logo").unwrap_or_default().to_string(),
            epg_id: extinf.attribute("tvg-id").unwrap_or_default().to_string(),
            stream_url: trimmed.to_string(),
            duration: extinf.duration,
        });
    }

    if current_extinf.is_some() {
        dropped += 1;
    }

    if dropped > 0 {
        tracing::debug!(
            channels = channels.len(),
            dropped = dropped,
            "EXTINF records without a stream URL skipped"
        );
    }

    ParsedPlaylist {
        channels,
        categories: categories.categories,
    }
}

/// Parse raw playlist bytes, replacing invalid UTF-8 sequences
pub fn parse_bytes(bytes: &[u8]) -> ParsedPlaylist {
    parse_m3u(&String::from_utf8_lossy(bytes))
}

/// Render channels back into an M3U playlist pointing at their direct URLs
pub fn render_m3u(channels: &[Channel]) -> String {
    let mut out = String::from("#EXTM3U\n");

    for channel in channels {
        let mut attrs: Vec<String> = Vec::with_capacity(4);
        if !channel.epg_id.is_empty() {
            attrs.push(format!("tvg-id=\"{}\"", channel.epg_id));
        }
        attrs.push(format!("tvg-name=\"{}\"", channel.name.replace('"', "'")));
        if !channel.logo_url.is_empty() {
            attrs.push(format!("tvg-logo=\"{}\"", channel.logo_url));
        }
        if channel.category_name != UNCATEGORIZED {
            attrs.push(format!("group-title=\"{}\"", channel.category_name));
        }

        // Readers split the title at the last comma
        out.push_str(&format!(
            "#EXTINF:{} {},{}\n",
            channel.duration,
            attrs.join(" "),
            channel.name.replace(',', "")
        ));
        out.push_str(&channel.stream_url);
        out.push('\n');
    }

    out
}

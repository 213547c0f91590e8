use serde::Serialize;

/// Display name used when an EXTINF line carries neither a title nor `tvg-name`
pub const UNKNOWN_NAME: &str = "Unknown";

/// Category name used when `group-title` is missing or empty
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Single playable entry of a parsed playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Dense, 1-based position in the parse that produced it.
    /// Not stable across upstream releases of the playlist.
    pub stream_id: u32,
    pub name: String,
    pub category_id: String,
    pub category_name: String,
    /// `tvg-logo` or empty
    pub logo_url: String,
    /// `tvg-id` or empty
    pub epg_id: String,
    pub stream_url: String,
    /// EXTINF duration, -1 for live entries
    pub duration: i32,
}

/// Group/category information, derived from `group-title`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub category_id: String,
    pub category_name: String,
    pub parent_id: u32,
}

/// Result of one playlist parse: channels in file order plus the
/// categories in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    pub categories: Vec<Category>,
}

impl ParsedPlaylist {
    /// Look up a channel by its stream id
    pub fn channel(&self, stream_id: u32) -> Option<&Channel> {
        let index = usize::try_from(stream_id.checked_sub(1)?).ok()?;
        self.channels
            .get(index)
            .filter(|channel| channel.stream_id == stream_id)
    }

    /// Channels belonging to a category id, in playlist order
    pub fn channels_in_category<'a>(
        &'a self,
        category_id: &'a str,
    ) -> impl Iterator<Item = &'a Channel> + 'a {
        self.channels
            .iter()
            .filter(move |channel| channel.category_id == category_id)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(stream_id: u32, category_id: &str) -> Channel {
        Channel {
            stream_id,
            name: format!("Channel {}", stream_id),
            category_id: category_id.to_string(),
            category_name: format!("Group {}", category_id),
            logo_url: String::new(),
            epg_id: String::new(),
            stream_url: format!("http://example.com/{}.m3u8", stream_id),
            duration: -1,
        }
    }

    #[test]
    fn test_channel_lookup_by_id() {
        let playlist = ParsedPlaylist {
            channels: vec![channel(1, "1"), channel(2, "1"), channel(3, "2")],
            categories: Vec::new(),
        };

        assert_eq!(playlist.channel(2).map(|c| c.stream_id), Some(2));
        assert!(playlist.channel(0).is_none());
        assert!(playlist.channel(4).is_none());
    }

    #[test]
    fn test_channels_in_category() {
        let playlist = ParsedPlaylist {
            channels: vec![channel(1, "1"), channel(2, "2"), channel(3, "1")],
            categories: Vec::new(),
        };

        let ids: Vec<u32> = playlist
            .channels_in_category("1")
            .map(|c| c.stream_id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }
}

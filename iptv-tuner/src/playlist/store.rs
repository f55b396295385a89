//! Published channel lineup.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Local};

use super::models::{CategoryInfo, Channel, ContentType};

/// An immutable channel list together with the categories it was selected from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelLineup {
    pub channels: Vec<Channel>,
    /// Every category of the playlist, selected or not.
    pub categories: BTreeMap<String, ContentType>,
    pub refreshed_at: Option<DateTime<Local>>,
}

impl ChannelLineup {
    pub fn new(channels: Vec<Channel>, categories: BTreeMap<String, ContentType>) -> Self {
        Self {
            channels,
            categories,
            refreshed_at: Some(Local::now()),
        }
    }

    pub fn find(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.iter().find(|ch| ch.id == channel_id)
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn category_details(&self) -> Vec<CategoryInfo> {
        self.categories
            .iter()
            .map(|(name, kind)| CategoryInfo::new(name, *kind))
            .collect()
    }
}

/// Holder of the current lineup. Publishing swaps the whole list.
#[derive(Debug, Default)]
pub struct ChannelStore {
    current: RwLock<Arc<ChannelLineup>>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<ChannelLineup> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn publish(&self, lineup: ChannelLineup) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(lineup);
    }

    pub fn find(&self, channel_id: &str) -> Option<Channel> {
        self.snapshot().find(channel_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::m3u::parse_m3u;

    #[test]
    fn test_publish_replaces_whole_lineup() {
        let store = ChannelStore::new();
        assert_eq!(store.len(), 0);

        let playlist = parse_m3u("#EXTINF:-1 group-title=\"News\",One\nhttp://a/1\n#EXTINF:-1,Two\nhttp://a/2\n");
        store.publish(playlist.into_lineup(&["News".to_string()]));

        let before = store.snapshot();
        assert_eq!(store.len(), 1);
        assert_eq!(store.find("ch1").unwrap().name, "One");
        assert!(store.find("ch2").is_none());
        assert_eq!(before.category_names().len(), 2);

        store.publish(ChannelLineup::default());
        assert_eq!(store.len(), 0);
        // Readers holding the old snapshot keep a consistent list.
        assert_eq!(before.channels.len(), 1);
    }
}

use std::collections::HashMap;

use reeldeck_protocol::SeriesManifest;
use serde::{Deserialize, Serialize};

/// A channel with its load-time ordering index.
///
/// The index is 1-based and assigned fresh from the manifest's channel order
/// on every series load; it is what the bitset encoding is computed against.
/// It is not persisted channel identity — encodings survive reloads only as
/// long as the server keeps the manifest order stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub index: usize,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

/// Name and index lookups over a series' channel set.
#[derive(Debug, Clone, Default)]
pub struct ChannelDirectory {
    channels: Vec<Channel>,
    by_name: HashMap<String, usize>,
}

impl ChannelDirectory {
    pub fn from_manifest(manifest: &SeriesManifest) -> Self {
        let channels: Vec<Channel> = manifest
            .channels
            .iter()
            .enumerate()
            .map(|(i, record)| Channel {
                name: record.name.clone(),
                index: i + 1,
                title: record.title.clone(),
                thumbnail: record.thumbnail.clone(),
            })
            .collect();
        let by_name = channels
            .iter()
            .enumerate()
            .map(|(i, ch)| (ch.name.clone(), i))
            .collect();
        Self { channels, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.by_name.get(name).map(|&i| &self.channels[i])
    }

    /// Lookup by 1-based bitset index.
    pub fn by_index(&self, index: usize) -> Option<&Channel> {
        index.checked_sub(1).and_then(|i| self.channels.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

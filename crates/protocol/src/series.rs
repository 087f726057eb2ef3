use serde::{Deserialize, Serialize};

/// One content source within a series, as published by the series metadata
/// endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Unique key within the series.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Series metadata. The order of `channels` is the index-assignment contract:
/// bitsets encoded against one load stay decodable only while the server
/// preserves this ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub channels: Vec<ChannelRecord>,
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One saved view state within a series: a display name, a channel-visibility
/// bitset, and a scroll position expressed as a video timestamp.
///
/// A record without a `name` is a tombstone — a deleted profile kept as an
/// `{id, ts}` marker so a merge with another device cannot resurrect it.
/// Every optional field is omitted from serialization when absent, so a
/// tombstone round-trips as exactly `{"id": ..., "ts": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Stable identifier, assigned at creation. Older data predating id
    /// assignment carries `None` and is matched structurally instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name. `None` marks a tombstone.
    #[serde(rename = "profile", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Last-touched time, epoch milliseconds.
    #[serde(default)]
    pub ts: u64,
    /// Channel-visibility bitset, base64 text. Empty string means every
    /// channel is visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ch: Option<String>,
    /// Scroll position as a video timestamp, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<i64>,
    /// Legacy payloads only: explicit list of hidden channel names, replaced
    /// by the `ch` bitset during migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
}

impl ProfileRecord {
    /// A fresh profile with everything visible and the scroll at the top.
    pub fn new(id: impl Into<String>, name: impl Into<String>, ts: u64) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ts,
            ch: Some(String::new()),
            scroll: Some(0),
            channels: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.name.is_none()
    }

    /// The channel bitset, treating an absent field as "all visible".
    pub fn ch(&self) -> &str {
        self.ch.as_deref().unwrap_or("")
    }

    pub fn scroll(&self) -> i64 {
        self.scroll.unwrap_or(0)
    }

    /// Reduce this record to its tombstone form, keeping only `id` and a
    /// fresh deletion timestamp.
    pub fn into_tombstone(self, ts: u64) -> Self {
        Self {
            id: self.id,
            name: None,
            ts,
            ch: None,
            scroll: None,
            channels: None,
        }
    }
}

/// The whole persisted user state: profiles grouped by series key.
///
/// This exact shape is stored locally and exchanged with the remote state
/// endpoint; uploads send it wholesale and the server's response replaces it
/// wholesale (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserState(pub BTreeMap<String, Vec<ProfileRecord>>);

impl UserState {
    pub fn series(&self, series: &str) -> &[ProfileRecord] {
        self.0.get(series).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn series_mut(&mut self, series: &str) -> Option<&mut Vec<ProfileRecord>> {
        self.0.get_mut(series)
    }

    pub fn contains_series(&self, series: &str) -> bool {
        self.0.contains_key(series)
    }

    /// Profiles that are not tombstones, in storage order.
    pub fn live_profiles(&self, series: &str) -> impl Iterator<Item = &ProfileRecord> {
        self.series(series).iter().filter(|p| !p.is_tombstone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_serializes_as_id_and_ts_only() {
        let record = ProfileRecord::new("abc", "main", 1_000).into_tombstone(2_000);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"id": "abc", "ts": 2_000}));
    }

    #[test]
    fn wire_name_is_profile() {
        let record = ProfileRecord::new("abc", "main", 5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["profile"], "main");
        assert!(json.get("name").is_none());
    }

    #[test]
    fn legacy_record_decodes_with_defaults() {
        let record: ProfileRecord =
            serde_json::from_str(r#"{"profile": "old", "ts": 7, "channels": ["a", "b"]}"#).unwrap();
        assert_eq!(record.name.as_deref(), Some("old"));
        assert_eq!(record.ch(), "");
        assert_eq!(record.scroll(), 0);
        assert_eq!(record.channels.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
    }

    #[test]
    fn state_is_a_transparent_map() {
        let state: UserState = serde_json::from_str(
            r#"{"s7": [{"profile": "default", "ts": 1, "ch": "", "scroll": 0}]}"#,
        )
        .unwrap();
        assert_eq!(state.series("s7").len(), 1);
        assert_eq!(state.live_profiles("s7").count(), 1);
        assert!(state.series("other").is_empty());
    }
}

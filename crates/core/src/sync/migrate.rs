//! Legacy state-shape migration.
//!
//! Persisted and server-side state blobs can predate three schema changes:
//! the `accessed` field (renamed to `ts`), a junk `null` series key, and the
//! explicit `channels` name list that the bitset `ch` encoding replaced.
//! The first two are fixed while decoding; the last needs each affected
//! series' channel ordering, which is not embedded in the old format, so it
//! runs as a batch: plan which manifests are needed, let the driver fetch
//! them all, then convert every series in one step before the state is used.

use std::collections::BTreeMap;

use reeldeck_protocol::{ProfileRecord, SeriesManifest, UserState};

use crate::bitset;
use crate::model::ChannelDirectory;

/// Decode a raw state blob, normalizing legacy shapes along the way:
/// `accessed` becomes `ts`, the invalid `null` series entry is dropped, and
/// undecodable entries are skipped rather than failing the whole blob.
pub fn decode_state(raw: serde_json::Value) -> UserState {
    let serde_json::Value::Object(map) = raw else {
        log::warn!("state blob is not an object, starting empty");
        return UserState::default();
    };
    let mut state = UserState::default();
    for (series, value) in map {
        if series == "null" {
            log::debug!("dropping legacy null series entry");
            continue;
        }
        let serde_json::Value::Array(entries) = value else {
            log::warn!("series {series:?} is not a profile list, skipping");
            continue;
        };
        let profiles: Vec<ProfileRecord> = entries
            .into_iter()
            .filter_map(|entry| decode_profile(&series, entry))
            .collect();
        state.0.insert(series, profiles);
    }
    state
}

fn decode_profile(series: &str, mut entry: serde_json::Value) -> Option<ProfileRecord> {
    if let Some(fields) = entry.as_object_mut()
        && let Some(accessed) = fields.remove("accessed")
    {
        fields.insert("ts".to_string(), accessed);
    }
    match serde_json::from_value(entry) {
        Ok(profile) => Some(profile),
        Err(err) => {
            log::warn!("skipping undecodable profile in {series:?}: {err}");
            None
        }
    }
}

/// Series still carrying the legacy `channels` field, whose manifests the
/// driver must fetch before [`apply_channel_migration`] can finish. The
/// state is not usable until a fresh plan comes back empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    pub series: Vec<String>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

pub fn plan_channel_migration(state: &UserState) -> MigrationPlan {
    let series = state
        .0
        .iter()
        .filter(|(_, profiles)| profiles.iter().any(|p| p.channels.is_some()))
        .map(|(series, _)| series.clone())
        .collect();
    MigrationPlan { series }
}

/// Convert every legacy `channels` list to its `ch` bitset using the fetched
/// manifests. Series without a manifest are left untouched (and will appear
/// in the next plan); all series that can be converted are converted in this
/// one call.
pub fn apply_channel_migration(
    state: &mut UserState,
    manifests: &BTreeMap<String, SeriesManifest>,
) {
    for (series, manifest) in manifests {
        let Some(profiles) = state.series_mut(series) else {
            continue;
        };
        let directory = ChannelDirectory::from_manifest(manifest);
        log::info!("migrating channel lists for series {series:?}");
        for profile in profiles {
            if let Some(hidden) = profile.channels.take() {
                profile.ch = Some(bitset::encode(hidden, &directory));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renames_accessed_to_ts() {
        let state = decode_state(json!({
            "s7": [{"profile": "default", "accessed": 1000, "ch": "", "scroll": 0}]
        }));
        let profile = &state.series("s7")[0];
        assert_eq!(profile.ts, 1000);
        // The legacy key does not survive re-serialization.
        let round = serde_json::to_value(profile).unwrap();
        assert!(round.get("accessed").is_none());
        assert_eq!(round["ts"], 1000);
    }

    #[test]
    fn drops_null_series() {
        let state = decode_state(json!({
            "null": [{"profile": "junk", "ts": 1}],
            "s7": []
        }));
        assert!(!state.contains_series("null"));
        assert!(state.contains_series("s7"));
    }

    #[test]
    fn skips_undecodable_entries() {
        let state = decode_state(json!({
            "s7": [42, {"profile": "ok", "ts": 5}]
        }));
        assert_eq!(state.series("s7").len(), 1);
    }

    #[test]
    fn non_object_blob_starts_empty() {
        assert_eq!(decode_state(json!([1, 2, 3])), UserState::default());
    }

    #[test]
    fn plans_only_series_with_legacy_channels() {
        let state = decode_state(json!({
            "old": [{"profile": "p", "ts": 1, "channels": ["a"]}],
            "new": [{"profile": "p", "ts": 1, "ch": ""}]
        }));
        let plan = plan_channel_migration(&state);
        assert_eq!(plan.series, ["old"]);
    }

    #[test]
    fn applies_channel_migration_atomically() {
        let mut state = decode_state(json!({
            "old": [
                {"profile": "p1", "ts": 1, "channels": ["beta"]},
                {"profile": "p2", "ts": 2, "channels": []}
            ]
        }));
        let manifest: SeriesManifest = serde_json::from_value(json!({
            "channels": [{"name": "alpha"}, {"name": "beta"}]
        }))
        .unwrap();
        let manifests = BTreeMap::from([("old".to_string(), manifest)]);
        apply_channel_migration(&mut state, &manifests);

        let profiles = state.series("old");
        assert!(profiles.iter().all(|p| p.channels.is_none()));
        // "beta" is channel index 2 → bit 1 of byte 0.
        assert_eq!(profiles[0].ch(), "Ag==");
        assert_eq!(profiles[1].ch(), "");
        assert!(plan_channel_migration(&state).is_empty());
    }

    #[test]
    fn missing_manifest_leaves_series_pending() {
        let mut state = decode_state(json!({
            "old": [{"profile": "p", "ts": 1, "channels": ["a"]}]
        }));
        apply_channel_migration(&mut state, &BTreeMap::new());
        assert!(!plan_channel_migration(&state).is_empty());
    }
}

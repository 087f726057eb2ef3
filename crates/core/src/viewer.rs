use std::collections::BTreeMap;

use reeldeck_protocol::{ProfileRecord, SeriesManifest, StateEnvelope};

use crate::bitset;
use crate::model::{ChannelDirectory, Settings, SettingsStore};
use crate::profiles::ProfileStore;
use crate::storage::{StateStorage, save_json};
use crate::sync::{
    MigrationPlan, RemoteFetch, StateSync, SyncOutcome, apply_channel_migration, decode_state,
    plan_channel_migration,
};
use crate::timeline::{TimelineIndex, VisibleItem};

/// Storage key for the whole profile state blob.
pub const STATE_KEY: &str = "state";

/// The coordinator that owns every piece of viewer state.
///
/// All UI-facing operations go through here: the host reports scroll and
/// toggle events with the current clock (epoch milliseconds), and reads
/// back scroll targets, channel visibility, and profile lists. Each mutation
/// updates the active profile, persists locally, and marks the state for
/// upload — in that order, so local durability never depends on the network.
///
/// The driver pumps uploads by calling [`Viewer::poll_upload`] after
/// mutations and on a timer tick, posting any blob it returns, and feeding
/// the response to [`Viewer::apply_upload_response`].
pub struct Viewer<S: StateStorage> {
    storage: S,
    settings: SettingsStore,
    profiles: ProfileStore,
    channels: ChannelDirectory,
    timeline: TimelineIndex,
    sync: StateSync,
}

impl<S: StateStorage> Viewer<S> {
    /// Set up against persisted settings. `default_series` is used when no
    /// series was ever selected (the host passes the page's default).
    pub fn new(mut storage: S, default_series: &str) -> Self {
        let settings = SettingsStore::load(&mut storage);
        let series = settings
            .get()
            .series
            .clone()
            .unwrap_or_else(|| default_series.to_string());
        let active_index = settings.get().profile.unwrap_or(0);
        Self {
            storage,
            settings,
            profiles: ProfileStore::new(Default::default(), series, active_index),
            channels: ChannelDirectory::default(),
            timeline: TimelineIndex::new(),
            sync: StateSync::new(),
        }
    }

    /// Override the upload cadence. Only meaningful before
    /// [`Viewer::initialize`].
    pub fn with_upload_interval(mut self, interval_ms: u64) -> Self {
        self.sync = StateSync::with_interval(interval_ms);
        self
    }

    /// Resolve the authoritative state from the host's initial fetch and
    /// run migration. A non-empty plan means the state is not usable yet:
    /// the host must fetch the named series manifests and call
    /// [`Viewer::complete_migration`].
    pub fn initialize(&mut self, fetch: RemoteFetch, now: u64) -> MigrationPlan {
        let state = self.sync.initialize(fetch, &self.storage);
        self.profiles.replace_state(state);
        self.profiles.set_use_tombstones(self.sync.is_authenticated());
        let plan = plan_channel_migration(self.profiles.state());
        if plan.is_empty() {
            self.finish_initialize(now);
        }
        plan
    }

    /// Apply fetched manifests for the migration plan. Returns the remaining
    /// plan (non-empty if some manifests are still missing).
    pub fn complete_migration(
        &mut self,
        manifests: &BTreeMap<String, SeriesManifest>,
        now: u64,
    ) -> MigrationPlan {
        let mut state = self.profiles.state().clone();
        apply_channel_migration(&mut state, manifests);
        self.profiles.replace_state(state);
        let plan = plan_channel_migration(self.profiles.state());
        if plan.is_empty() {
            self.finish_initialize(now);
        }
        plan
    }

    fn finish_initialize(&mut self, now: u64) {
        self.profiles.ensure_series(now);
        self.profiles.heal_active(now);
        self.persist();
    }

    pub fn is_authenticated(&self) -> bool {
        self.sync.is_authenticated()
    }

    pub fn series(&self) -> &str {
        self.profiles.series()
    }

    /// Load the channel directory for the current series from its manifest.
    pub fn load_channels(&mut self, manifest: &SeriesManifest) {
        self.channels = ChannelDirectory::from_manifest(manifest);
    }

    /// Switch to another series: cancel the pending upload cadence for the
    /// old one, create the series on first visit, rebuild the channel
    /// directory, and persist the selection.
    pub fn switch_series(&mut self, series: &str, manifest: &SeriesManifest, now: u64) {
        self.sync.cancel_scheduled();
        self.profiles.set_series(series, now);
        self.channels = ChannelDirectory::from_manifest(manifest);
        self.save_state(now);
    }

    // --- timeline ---

    pub fn rebuild_timeline(&mut self, items: impl IntoIterator<Item = VisibleItem>) {
        self.timeline.rebuild(items);
    }

    pub fn timeline(&self) -> &TimelineIndex {
        &self.timeline
    }

    /// Scroll handler: converts the offset to a timestamp and stores it on
    /// the active profile.
    pub fn on_scroll(&mut self, pos: f64, now: u64) {
        let ts = self.timeline.position_to_timestamp(pos);
        self.profiles.active_mut(now).scroll = Some(ts.round() as i64);
        self.save_state(now);
    }

    /// Pixel offset the host should scroll to for the active profile's saved
    /// position.
    pub fn restore_scroll(&mut self, now: u64) -> f64 {
        self.heal_and_persist(now);
        let ts = self.profiles.active(now).scroll();
        self.timeline.timestamp_to_position(ts as f64)
    }

    // --- channels ---

    /// Per-channel visibility for the active profile.
    pub fn channel_states(&mut self, now: u64) -> BTreeMap<String, bool> {
        self.heal_and_persist(now);
        bitset::decode(self.profiles.active(now).ch(), &self.channels)
    }

    /// Toggle handler: flips one channel and re-encodes the active profile's
    /// bitset.
    pub fn set_channel_active(&mut self, name: &str, active: bool, now: u64) {
        let mut states = self.channel_states(now);
        if !states.contains_key(name) {
            log::warn!("toggle for unknown channel {name:?}");
            return;
        }
        states.insert(name.to_string(), active);
        let hidden = states
            .iter()
            .filter(|&(_, &visible)| !visible)
            .map(|(name, _)| name.as_str());
        let encoded = bitset::encode(hidden, &self.channels);
        self.profiles.active_mut(now).ch = Some(encoded);
        self.save_state(now);
    }

    // --- profiles ---

    pub fn list_profiles(&self, active_first: bool) -> Vec<ProfileRecord> {
        self.profiles.list(active_first).into_iter().cloned().collect()
    }

    pub fn active_profile(&mut self, now: u64) -> ProfileRecord {
        self.heal_and_persist(now);
        self.profiles.active(now).clone()
    }

    pub fn create_profile(&mut self, name: &str, now: u64) -> ProfileRecord {
        let created = self.profiles.create(name, now).clone();
        self.save_state(now);
        created
    }

    pub fn rename_profile(&mut self, name: &str, now: u64) {
        self.profiles.rename_active(name, now);
        self.save_state(now);
    }

    /// Delete the active profile. Returns `false` when it is the last one
    /// (the minimum-profile invariant) and nothing changed.
    pub fn delete_profile(&mut self, now: u64) -> bool {
        let target = self.profiles.active(now).clone();
        if !self.profiles.delete(&target, now) {
            return false;
        }
        self.save_state(now);
        true
    }

    pub fn select_profile(&mut self, target: &ProfileRecord, now: u64) {
        self.profiles.set_active(target);
        self.save_state(now);
    }

    // --- settings ---

    pub fn settings(&self) -> &Settings {
        self.settings.get()
    }

    pub fn update_settings(&mut self, apply: impl FnOnce(&mut Settings)) {
        apply(self.settings.get_mut());
        self.settings.save(&mut self.storage);
    }

    // --- sync ---

    /// Returns the serialized whole-state blob when an upload should start.
    /// The host POSTs it and reports back through
    /// [`Viewer::apply_upload_response`] or [`Viewer::upload_failed`].
    pub fn poll_upload(&mut self, now: u64) -> Option<String> {
        if !self.sync.poll(now) {
            return None;
        }
        match serde_json::to_string(self.profiles.state()) {
            Ok(blob) => {
                log::info!("uploading state");
                Some(blob)
            }
            Err(err) => {
                log::warn!("failed to serialize state for upload: {err}");
                self.sync.upload_failed();
                None
            }
        }
    }

    /// Apply the server's response to an upload. The returned state replaces
    /// the local one wholesale (last write wins); the active profile is then
    /// re-located in it by id, or by name and bitset for pre-id data. If it
    /// cannot be found it was deleted concurrently on another device, and
    /// the only safe answer is a full reload.
    pub fn apply_upload_response(&mut self, envelope: &StateEnvelope, now: u64) -> SyncOutcome {
        let Some(raw) = envelope.state.clone() else {
            // A rejected upload stays pending so the interval retries it.
            log::warn!("upload rejected: {:?}", envelope.error);
            self.sync.upload_failed();
            return SyncOutcome::Applied;
        };
        self.sync.upload_finished();
        let pre_upload = self.profiles.active(now).clone();
        self.profiles.replace_state(decode_state(raw));
        if !self.profiles.relocate_active(&pre_upload) {
            log::warn!("active profile vanished in server merge, requesting reload");
            return SyncOutcome::ReloadRequired;
        }
        self.persist();
        SyncOutcome::Applied
    }

    pub fn upload_failed(&mut self) {
        self.sync.upload_failed();
    }

    // --- persistence ---

    /// Touch the active profile and persist locally, then mark the state for
    /// upload. Local write first: remote sync never gates durability.
    fn save_state(&mut self, now: u64) {
        self.profiles.active_mut(now).ts = now;
        self.persist();
        self.sync.note_mutation();
    }

    /// Write back a healed active index, so the correction survives reload
    /// instead of being re-derived every session.
    fn heal_and_persist(&mut self, now: u64) {
        if self.profiles.heal_active(now) {
            self.persist();
        }
    }

    /// Persist state and settings without touching `ts` or scheduling.
    fn persist(&mut self) {
        save_json(&mut self.storage, STATE_KEY, self.profiles.state());
        let series = self.profiles.series().to_string();
        let index = self.profiles.active_index();
        let settings = self.settings.get_mut();
        settings.series = Some(series);
        settings.profile = Some(index);
        self.settings.save(&mut self.storage);
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

use reeldeck_protocol::{ProfileRecord, UserState};

/// Named view states for every series, plus the active selection for the
/// current one.
///
/// Storage order of profiles within a series is insertion order and is never
/// exposed to the UI; [`ProfileStore::list`] presents them by recency. The
/// active profile is tracked as a storage index (persisted in settings), and
/// every accessor self-heals a stale index instead of raising — a corrupted
/// or out-of-date index must never surface as a user-visible error.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    state: UserState,
    series: String,
    active_index: usize,
    use_tombstones: bool,
}

pub const DEFAULT_PROFILE_NAME: &str = "default";

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Identity match for selection: ids win whenever both sides carry one,
/// full structural equality is the fallback for pre-id data.
fn same_profile(target: &ProfileRecord, candidate: &ProfileRecord) -> bool {
    match (&target.id, &candidate.id) {
        (Some(a), Some(b)) => a == b,
        _ => target == candidate,
    }
}

/// Looser match used after a server merge, where display attributes may have
/// changed in flight: id when the pre-upload profile has one, otherwise
/// display name plus channel bitset.
fn reconciles_with(pre: &ProfileRecord, candidate: &ProfileRecord) -> bool {
    if pre.id.is_some() {
        pre.id == candidate.id
    } else {
        pre.name == candidate.name && pre.ch() == candidate.ch()
    }
}

impl ProfileStore {
    pub fn new(state: UserState, series: impl Into<String>, active_index: usize) -> Self {
        Self {
            state,
            series: series.into(),
            active_index,
            use_tombstones: false,
        }
    }

    pub fn state(&self) -> &UserState {
        &self.state
    }

    /// Replace the whole state, as after a remote fetch or upload merge. The
    /// active index is healed lazily on the next access.
    pub fn replace_state(&mut self, state: UserState) {
        self.state = state;
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    /// Tombstone deleted profiles instead of removing them. Enabled while a
    /// remote copy exists, so a concurrent merge cannot resurrect a profile
    /// deleted on another device.
    pub fn set_use_tombstones(&mut self, on: bool) {
        self.use_tombstones = on;
    }

    /// Create the series with a single `default` profile if it is not known
    /// yet. Returns whether anything was created.
    pub fn ensure_series(&mut self, now: u64) -> bool {
        if self.state.contains_series(&self.series) {
            return false;
        }
        self.state
            .0
            .insert(self.series.clone(), vec![ProfileRecord::new(new_id(), DEFAULT_PROFILE_NAME, now)]);
        self.active_index = 0;
        true
    }

    /// Switch to another series, creating it on first visit, and re-target
    /// the active index to its most recent profile.
    pub fn set_series(&mut self, series: impl Into<String>, now: u64) {
        self.series = series.into();
        if !self.ensure_series(now) {
            self.active_index = self.most_recent_live_index().unwrap_or(0);
        }
    }

    /// Non-tombstone profiles ordered by `ts` descending; with `active_first`
    /// the active profile is pinned to the front regardless of its `ts`.
    pub fn list(&self, active_first: bool) -> Vec<&ProfileRecord> {
        let profiles = self.state.series(&self.series);
        let active: Option<*const ProfileRecord> = if active_first {
            profiles
                .get(self.active_index)
                .filter(|p| !p.is_tombstone())
                .map(|p| p as *const _)
        } else {
            None
        };
        let mut live: Vec<&ProfileRecord> = profiles.iter().filter(|p| !p.is_tombstone()).collect();
        live.sort_by(|a, b| {
            let a_active = active == Some(*a as *const _);
            let b_active = active == Some(*b as *const _);
            b_active.cmp(&a_active).then(b.ts.cmp(&a.ts))
        });
        live
    }

    fn most_recent_live_index(&self) -> Option<usize> {
        self.state
            .series(&self.series)
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_tombstone())
            .max_by_key(|(_, p)| p.ts)
            .map(|(i, _)| i)
    }

    /// Point the active index at a live profile, repairing it if it is out of
    /// range or refers to a tombstone, and synthesizing a `default` profile
    /// if a merge left the series with none. Returns whether a correction was
    /// made (the caller persists it).
    pub fn heal_active(&mut self, now: u64) -> bool {
        let valid = self
            .state
            .series(&self.series)
            .get(self.active_index)
            .is_some_and(|p| !p.is_tombstone());
        if valid {
            return false;
        }
        if let Some(index) = self.most_recent_live_index() {
            log::debug!("resetting stale active profile index to {index}");
            self.active_index = index;
        } else {
            log::debug!("series {:?} has no live profiles, recreating default", self.series);
            let record = ProfileRecord::new(new_id(), DEFAULT_PROFILE_NAME, now);
            let profiles = self.state.0.entry(self.series.clone()).or_default();
            profiles.push(record);
            self.active_index = profiles.len() - 1;
        }
        true
    }

    pub fn active(&mut self, now: u64) -> &ProfileRecord {
        self.heal_active(now);
        &self.state.series(&self.series)[self.active_index]
    }

    pub fn active_mut(&mut self, now: u64) -> &mut ProfileRecord {
        self.heal_active(now);
        let index = self.active_index;
        let profiles = self.state.0.entry(self.series.clone()).or_default();
        &mut profiles[index]
    }

    /// Create a profile cloned from the active one (channels and scroll
    /// carry over), give it a fresh id and timestamp, and make it active.
    pub fn create(&mut self, name: impl Into<String>, now: u64) -> &ProfileRecord {
        let source = self.active(now).clone();
        let record = ProfileRecord {
            id: Some(new_id()),
            name: Some(name.into()),
            ts: now,
            ch: Some(source.ch().to_string()),
            scroll: Some(source.scroll()),
            channels: None,
        };
        let profiles = self.state.0.entry(self.series.clone()).or_default();
        profiles.push(record);
        self.active_index = profiles.len() - 1;
        &profiles[self.active_index]
    }

    /// Rename the active profile in place. `ts` is deliberately untouched so
    /// the recency ordering of the menu does not reshuffle on rename.
    pub fn rename_active(&mut self, name: impl Into<String>, now: u64) {
        self.active_mut(now).name = Some(name.into());
    }

    /// Delete a profile. Refused when it would remove the last live profile
    /// of the series or when the target cannot be found. Under remote sync
    /// the record collapses to a tombstone; otherwise it is removed outright.
    pub fn delete(&mut self, target: &ProfileRecord, now: u64) -> bool {
        let Some(index) = self.find_index(target) else {
            log::warn!("delete: profile not found");
            return false;
        };
        let live = self.state.live_profiles(&self.series).count();
        if live <= 1 {
            return false;
        }
        let was_active = index == self.active_index;
        let Some(profiles) = self.state.series_mut(&self.series) else {
            return false;
        };
        if profiles[index].is_tombstone() {
            return false;
        }
        if self.use_tombstones {
            let record = profiles[index].clone();
            profiles[index] = record.into_tombstone(now);
        } else {
            profiles.remove(index);
            if index < self.active_index {
                self.active_index -= 1;
            }
        }
        if was_active {
            self.active_index = self.most_recent_live_index().unwrap_or(0);
        }
        true
    }

    /// Make the given profile active; falls back to index 0 when it cannot
    /// be matched, never leaving the pointer dangling.
    pub fn set_active(&mut self, target: &ProfileRecord) {
        match self.find_index(target) {
            Some(index) => self.active_index = index,
            None => {
                log::warn!("set_active: profile not found, defaulting to first");
                self.active_index = 0;
            }
        }
    }

    /// Re-locate the active profile after the server's merged state replaced
    /// the local one. Matches by recency order; returns false when the
    /// pre-upload active profile no longer exists (the caller escalates).
    pub fn relocate_active(&mut self, pre_upload: &ProfileRecord) -> bool {
        let mut candidates: Vec<(usize, &ProfileRecord)> = self
            .state
            .series(&self.series)
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_tombstone())
            .collect();
        candidates.sort_by(|a, b| b.1.ts.cmp(&a.1.ts));
        for (index, candidate) in candidates {
            if reconciles_with(pre_upload, candidate) {
                self.active_index = index;
                return true;
            }
        }
        false
    }

    fn find_index(&self, target: &ProfileRecord) -> Option<usize> {
        self.state
            .series(&self.series)
            .iter()
            .position(|candidate| same_profile(target, candidate))
    }
}

//! Reconciliation between local persisted state and the remote copy.
//!
//! The engine is sans-IO: the host performs the actual requests and hands
//! the results in. `StateSync` decides what the authoritative state is at
//! startup, tracks whether a remote copy exists at all, and owns the upload
//! cadence. Local durability always precedes remote sync — callers persist
//! locally before an upload is ever offered.

pub mod migrate;
pub mod scheduler;

pub use migrate::{MigrationPlan, apply_channel_migration, decode_state, plan_channel_migration};
pub use scheduler::{DEFAULT_UPLOAD_INTERVAL_MS, UploadScheduler};

use reeldeck_protocol::{ApiError, StateEnvelope, UserState};

use crate::storage::{StateStorage, load_json};

/// Where the viewer stands with respect to the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Uninitialized,
    /// No remote copy (logged out, or the server is unreachable); state
    /// lives only in local storage.
    LocalOnly,
    /// A remote copy exists and uploads are scheduled.
    Authenticated,
}

/// Result of the host's initial state fetch, as handed to
/// [`StateSync::initialize`]. Network failure is a value here, not an error:
/// it just means local-only operation.
#[derive(Debug, Clone)]
pub enum RemoteFetch {
    Response(StateEnvelope),
    Offline,
}

/// Outcome of applying an upload response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied,
    /// The pre-upload active profile no longer exists in the merged state
    /// (deleted concurrently elsewhere). The host must reload the page
    /// rather than guess at a replacement.
    ReloadRequired,
}

#[derive(Debug, Clone)]
pub struct StateSync {
    status: SyncStatus,
    scheduler: UploadScheduler,
}

impl StateSync {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_UPLOAD_INTERVAL_MS)
    }

    pub fn with_interval(interval_ms: u64) -> Self {
        Self {
            status: SyncStatus::Uninitialized,
            scheduler: UploadScheduler::new(interval_ms),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SyncStatus::Authenticated
    }

    /// Resolve the authoritative starting state.
    ///
    /// Remote state wins when the server returned one. An authenticated user
    /// without server-side state keeps the local copy and flags it for
    /// upload. Everything else (logged out, unrecognized response, network
    /// failure) falls back to local-only operation. Either source still
    /// needs channel migration before use; see [`migrate`].
    pub fn initialize(&mut self, fetch: RemoteFetch, storage: &dyn StateStorage) -> UserState {
        match fetch {
            RemoteFetch::Response(StateEnvelope { state: Some(raw), .. }) => {
                log::info!("received state from server");
                self.status = SyncStatus::Authenticated;
                return decode_state(raw);
            }
            RemoteFetch::Response(StateEnvelope { error: Some(ApiError::Unknown), .. }) => {
                // Logged in, but nothing saved yet: keep local, upload it.
                self.status = SyncStatus::Authenticated;
                self.scheduler.request();
            }
            RemoteFetch::Response(StateEnvelope { error: Some(ApiError::Unauthenticated), .. }) => {
                self.status = SyncStatus::LocalOnly;
            }
            RemoteFetch::Response(envelope) => {
                log::warn!("unrecognized state response: {envelope:?}");
                self.status = SyncStatus::LocalOnly;
            }
            RemoteFetch::Offline => {
                log::warn!("state fetch failed, assuming offline");
                self.status = SyncStatus::LocalOnly;
            }
        }
        let local: Option<serde_json::Value> = load_json(storage, crate::viewer::STATE_KEY);
        local.map(decode_state).unwrap_or_default()
    }

    /// Note a local mutation that should reach the server. The next
    /// [`StateSync::poll`] issues it — immediately if the interval is not
    /// armed, otherwise on the next tick.
    pub fn note_mutation(&mut self) {
        if self.is_authenticated() {
            self.scheduler.request();
        }
    }

    /// Periodic tick. Returns `true` when an upload should be issued.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        self.is_authenticated() && self.scheduler.poll(now_ms)
    }

    pub fn upload_finished(&mut self) {
        self.scheduler.upload_finished();
    }

    pub fn upload_failed(&mut self) {
        log::warn!("state upload failed, will retry on the next interval");
        self.scheduler.upload_failed();
    }

    /// Cancel the armed upload timer (series switch, page teardown). An
    /// in-flight upload still completes and its response is still applied.
    pub fn cancel_scheduled(&mut self) {
        self.scheduler.cancel();
    }
}

impl Default for StateSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn seeded_storage() -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        crate::storage::save_json(
            &mut storage,
            crate::viewer::STATE_KEY,
            &json!({"s7": [{"profile": "local", "ts": 42, "ch": "", "scroll": 0}]}),
        );
        storage
    }

    #[test]
    fn remote_state_is_authoritative() {
        let mut sync = StateSync::new();
        let envelope = StateEnvelope::with_state(
            json!({"s7": [{"profile": "remote", "ts": 99, "ch": "", "scroll": 0}]}),
        );
        let state = sync.initialize(RemoteFetch::Response(envelope), &seeded_storage());
        assert!(sync.is_authenticated());
        assert_eq!(state.series("s7")[0].name.as_deref(), Some("remote"));
    }

    #[test]
    fn unauthenticated_falls_back_to_local_without_login() {
        let mut sync = StateSync::new();
        let envelope = StateEnvelope::with_error(ApiError::Unauthenticated);
        let state = sync.initialize(RemoteFetch::Response(envelope), &seeded_storage());
        assert_eq!(sync.status(), SyncStatus::LocalOnly);
        assert_eq!(state.series("s7")[0].name.as_deref(), Some("local"));
        // Local-only mode never schedules uploads.
        sync.note_mutation();
        assert!(!sync.poll(120_000));
    }

    #[test]
    fn logged_in_without_state_keeps_local_and_flags_upload() {
        let mut sync = StateSync::new();
        let envelope = StateEnvelope::with_error(ApiError::Unknown);
        let state = sync.initialize(RemoteFetch::Response(envelope), &seeded_storage());
        assert!(sync.is_authenticated());
        assert_eq!(state.series("s7")[0].name.as_deref(), Some("local"));
        // The kept local state is due for upload without further mutations.
        assert!(sync.poll(0));
    }

    #[test]
    fn offline_fetch_is_local_only() {
        let mut sync = StateSync::new();
        let state = sync.initialize(RemoteFetch::Offline, &MemoryStorage::new());
        assert_eq!(sync.status(), SyncStatus::LocalOnly);
        assert_eq!(state, UserState::default());
    }

    #[test]
    fn unrecognized_response_is_local_only() {
        let mut sync = StateSync::new();
        let envelope = StateEnvelope::with_error(ApiError::Unrecognized);
        sync.initialize(RemoteFetch::Response(envelope), &MemoryStorage::new());
        assert_eq!(sync.status(), SyncStatus::LocalOnly);
    }

    #[test]
    fn mutations_schedule_immediate_then_interval_uploads() {
        let mut sync = StateSync::with_interval(60_000);
        let envelope = StateEnvelope::with_state(json!({}));
        sync.initialize(RemoteFetch::Response(envelope), &MemoryStorage::new());

        sync.note_mutation();
        assert!(sync.poll(0), "first mutation uploads immediately");
        sync.upload_finished();

        sync.note_mutation();
        assert!(!sync.poll(30_000));
        assert!(sync.poll(60_000));
    }
}

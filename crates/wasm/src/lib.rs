//! WASM bridge for the reel.deck viewer engine.
//!
//! The browser host owns the DOM, localStorage, fetch, and timers; this
//! crate owns a single [`Viewer`] behind a mutex and translates at the
//! boundary. JSON payloads cross as strings, clocks as epoch milliseconds
//! (`Date.now()`). After any mutating call the host should read
//! [`persisted_entries`] back into localStorage and pump [`poll_upload`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use reeldeck_core::storage::{MemoryStorage, StateStorage};
use reeldeck_core::sync::{RemoteFetch, SyncOutcome};
use reeldeck_core::{Viewer, VisibleItem};
use reeldeck_protocol::{ProfileRecord, SeriesManifest, StateEnvelope};
use wasm_bindgen::prelude::*;

static VIEWER: Mutex<Option<Viewer<MemoryStorage>>> = Mutex::new(None);

fn with_viewer<R>(
    f: impl FnOnce(&mut Viewer<MemoryStorage>) -> Result<R, JsError>,
) -> Result<R, JsError> {
    let mut guard = VIEWER.lock().unwrap();
    let viewer = guard
        .as_mut()
        .ok_or_else(|| JsError::new("viewer not booted"))?;
    f(viewer)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, JsError> {
    serde_json::from_str(raw).map_err(|e| JsError::new(&e.to_string()))
}

/// Create the viewer from a localStorage mirror (a JSON object of string
/// values) and the page's default series. Must be called before anything
/// else.
#[wasm_bindgen]
pub fn boot(local_entries: &str, default_series: &str) -> Result<(), JsError> {
    let entries: BTreeMap<String, String> = from_json(local_entries)?;
    let mut storage = MemoryStorage::new();
    for (key, value) in &entries {
        storage
            .set(key, value)
            .map_err(|e| JsError::new(&e.to_string()))?;
    }
    *VIEWER.lock().unwrap() = Some(Viewer::new(storage, default_series));
    Ok(())
}

/// Feed in the initial state fetch: the response envelope as JSON, or
/// `null`/`undefined` if the request failed. Returns the series names whose
/// manifests must be fetched and passed to [`complete_migration`] before the
/// state is usable; an empty array means ready.
#[wasm_bindgen]
pub fn initialize(fetch: Option<String>, now_ms: f64) -> Result<String, JsError> {
    with_viewer(|viewer| {
        let fetch = match fetch {
            Some(raw) => RemoteFetch::Response(from_json(&raw)?),
            None => RemoteFetch::Offline,
        };
        let plan = viewer.initialize(fetch, now_ms as u64);
        to_json(&plan.series)
    })
}

/// Apply fetched manifests (a JSON object of series name to manifest) for a
/// pending migration. Returns the series still missing a manifest.
#[wasm_bindgen]
pub fn complete_migration(manifests: &str, now_ms: f64) -> Result<String, JsError> {
    with_viewer(|viewer| {
        let manifests: BTreeMap<String, SeriesManifest> = from_json(manifests)?;
        let plan = viewer.complete_migration(&manifests, now_ms as u64);
        to_json(&plan.series)
    })
}

#[wasm_bindgen]
pub fn is_authenticated() -> Result<bool, JsError> {
    with_viewer(|viewer| Ok(viewer.is_authenticated()))
}

#[wasm_bindgen]
pub fn current_series() -> Result<String, JsError> {
    with_viewer(|viewer| Ok(viewer.series().to_string()))
}

/// Load the channel directory for the current series from its manifest.
#[wasm_bindgen]
pub fn load_channels(manifest: &str) -> Result<(), JsError> {
    with_viewer(|viewer| {
        let manifest: SeriesManifest = from_json(manifest)?;
        viewer.load_channels(&manifest);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn switch_series(series: &str, manifest: &str, now_ms: f64) -> Result<(), JsError> {
    with_viewer(|viewer| {
        let manifest: SeriesManifest = from_json(manifest)?;
        viewer.switch_series(series, &manifest, now_ms as u64);
        Ok(())
    })
}

/// Replace the timeline index from the rendered items (a JSON array of
/// `{timestamp, position, hidden}`). Call after every relayout.
#[wasm_bindgen]
pub fn rebuild_timeline(items: &str) -> Result<(), JsError> {
    with_viewer(|viewer| {
        let items: Vec<VisibleItem> = from_json(items)?;
        viewer.rebuild_timeline(items);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn on_scroll(pos: f64, now_ms: f64) -> Result<(), JsError> {
    with_viewer(|viewer| {
        viewer.on_scroll(pos, now_ms as u64);
        Ok(())
    })
}

/// Pixel offset the host should scroll to for the active profile.
#[wasm_bindgen]
pub fn restore_scroll(now_ms: f64) -> Result<f64, JsError> {
    with_viewer(|viewer| Ok(viewer.restore_scroll(now_ms as u64)))
}

/// Per-channel visibility for the active profile, as a JSON object of
/// channel name to boolean.
#[wasm_bindgen]
pub fn channel_states(now_ms: f64) -> Result<String, JsError> {
    with_viewer(|viewer| to_json(&viewer.channel_states(now_ms as u64)))
}

#[wasm_bindgen]
pub fn set_channel_active(name: &str, active: bool, now_ms: f64) -> Result<(), JsError> {
    with_viewer(|viewer| {
        viewer.set_channel_active(name, active, now_ms as u64);
        Ok(())
    })
}

/// Live profiles of the current series as a JSON array, most recent first.
/// With `active_first` the active profile is pinned to the front.
#[wasm_bindgen]
pub fn list_profiles(active_first: bool) -> Result<String, JsError> {
    with_viewer(|viewer| to_json(&viewer.list_profiles(active_first)))
}

#[wasm_bindgen]
pub fn active_profile(now_ms: f64) -> Result<String, JsError> {
    with_viewer(|viewer| to_json(&viewer.active_profile(now_ms as u64)))
}

/// Create a profile inheriting the active one's channels and scroll, and
/// switch to it. Returns the new profile as JSON.
#[wasm_bindgen]
pub fn create_profile(name: &str, now_ms: f64) -> Result<String, JsError> {
    with_viewer(|viewer| to_json(&viewer.create_profile(name, now_ms as u64)))
}

#[wasm_bindgen]
pub fn rename_profile(name: &str, now_ms: f64) -> Result<(), JsError> {
    with_viewer(|viewer| {
        viewer.rename_profile(name, now_ms as u64);
        Ok(())
    })
}

/// Delete the active profile. Returns `false` when it is the last one and
/// nothing changed.
#[wasm_bindgen]
pub fn delete_profile(now_ms: f64) -> Result<bool, JsError> {
    with_viewer(|viewer| Ok(viewer.delete_profile(now_ms as u64)))
}

/// Switch to the profile given as JSON (as returned by [`list_profiles`]).
#[wasm_bindgen]
pub fn select_profile(profile: &str, now_ms: f64) -> Result<(), JsError> {
    with_viewer(|viewer| {
        let target: ProfileRecord = from_json(profile)?;
        viewer.select_profile(&target, now_ms as u64);
        Ok(())
    })
}

#[wasm_bindgen]
pub fn settings() -> Result<String, JsError> {
    with_viewer(|viewer| to_json(viewer.settings()))
}

/// Replace the settings wholesale from JSON and persist them.
#[wasm_bindgen]
pub fn update_settings(raw: &str) -> Result<(), JsError> {
    with_viewer(|viewer| {
        let next = from_json(raw)?;
        viewer.update_settings(|settings| *settings = next);
        Ok(())
    })
}

/// Returns the serialized state blob when an upload should start, or
/// `null`. Call after mutations and on a timer tick; POST the blob and
/// report back through [`apply_upload_response`] or [`upload_failed`].
#[wasm_bindgen]
pub fn poll_upload(now_ms: f64) -> Result<Option<String>, JsError> {
    with_viewer(|viewer| Ok(viewer.poll_upload(now_ms as u64)))
}

/// Apply the server's response to an upload. Returns `true` when the host
/// must reload the page (the active profile was deleted elsewhere).
#[wasm_bindgen]
pub fn apply_upload_response(envelope: &str, now_ms: f64) -> Result<bool, JsError> {
    with_viewer(|viewer| {
        let envelope: StateEnvelope = from_json(envelope)?;
        let outcome = viewer.apply_upload_response(&envelope, now_ms as u64);
        Ok(outcome == SyncOutcome::ReloadRequired)
    })
}

#[wasm_bindgen]
pub fn upload_failed() -> Result<(), JsError> {
    with_viewer(|viewer| {
        viewer.upload_failed();
        Ok(())
    })
}

/// Everything persisted since boot, as a JSON object of string values, for
/// the host to write back to localStorage.
#[wasm_bindgen]
pub fn persisted_entries() -> Result<String, JsError> {
    with_viewer(|viewer| {
        let entries: BTreeMap<&str, &str> = viewer.storage().entries().collect();
        to_json(&entries)
    })
}

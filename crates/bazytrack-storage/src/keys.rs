//! Well-known preference keys shared by the UI layer and the tracker.

use crate::store::PreferenceStore;

/// Device identifier, generated once on first run.
pub const KEY_DEVICE: &str = "id";
/// Server endpoint the tracker reports to.
pub const KEY_URL: &str = "url";
/// Location sampling interval, seconds.
pub const KEY_INTERVAL: &str = "interval";
/// Minimum distance between reports, meters.
pub const KEY_DISTANCE: &str = "distance";
/// Minimum heading change between reports, degrees.
pub const KEY_ANGLE: &str = "angle";
/// Requested location accuracy profile.
pub const KEY_ACCURACY: &str = "accuracy";
/// Whether tracking is currently on. The single source of truth for the
/// toggle state machine.
pub const KEY_STATUS: &str = "status";
/// Whether reports are buffered while offline.
pub const KEY_BUFFER: &str = "buffer";
/// Whether the tracker holds a wakelock between samples.
pub const KEY_WAKELOCK: &str = "wakelock";

pub const DEFAULT_URL: &str = "https://track.bazytrack.com:5055";
pub const DEFAULT_INTERVAL: i64 = 600;
pub const DEFAULT_DISTANCE: i64 = 0;
pub const DEFAULT_ANGLE: i64 = 0;
pub const DEFAULT_ACCURACY: &str = "medium";
pub const DEFAULT_BUFFER: bool = true;
pub const DEFAULT_WAKELOCK: bool = false;

/// Seed the settings-screen keys that the tracker reads, leaving any
/// value the user has already written untouched. The device id and the
/// status flag are managed elsewhere and deliberately not seeded here.
pub fn ensure_defaults(store: &PreferenceStore) {
    if !store.contains(KEY_URL) {
        store.set_string(KEY_URL, DEFAULT_URL);
    }
    if !store.contains(KEY_INTERVAL) {
        store.set_int(KEY_INTERVAL, DEFAULT_INTERVAL);
    }
    if !store.contains(KEY_DISTANCE) {
        store.set_int(KEY_DISTANCE, DEFAULT_DISTANCE);
    }
    if !store.contains(KEY_ANGLE) {
        store.set_int(KEY_ANGLE, DEFAULT_ANGLE);
    }
    if !store.contains(KEY_ACCURACY) {
        store.set_string(KEY_ACCURACY, DEFAULT_ACCURACY);
    }
    if !store.contains(KEY_BUFFER) {
        store.set_bool(KEY_BUFFER, DEFAULT_BUFFER);
    }
    if !store.contains(KEY_WAKELOCK) {
        store.set_bool(KEY_WAKELOCK, DEFAULT_WAKELOCK);
    }
}

use anyhow::Result;
use bazytrack_storage::{keys, PreferenceStore};
use rand::Rng;

use crate::platform::Clipboard;

/// Displayed when no identifier has been generated yet.
pub const PLACEHOLDER_DEVICE_ID: &str = "0000";

/// Generate a device identifier: three uniformly random uppercase ASCII
/// letters followed by a six-digit number in 100000..=999999.
pub fn generate_device_id<R: Rng>(rng: &mut R) -> String {
    let letters: String = (0..3)
        .map(|_| char::from(b'A' + rng.gen_range(0u8..26)))
        .collect();
    let number: u32 = rng.gen_range(100_000..=999_999);
    format!("{letters}{number}")
}

/// Generate and persist the device identifier on first run. Subsequent
/// calls are no-ops and return the stored value.
pub fn ensure_device_id(store: &PreferenceStore) -> String {
    if !store.contains(keys::KEY_DEVICE) {
        let id = generate_device_id(&mut rand::thread_rng());
        store.set_string(keys::KEY_DEVICE, &id);
        log::info!("Generated device identifier: {id}");
    }
    store.get_string(keys::KEY_DEVICE, PLACEHOLDER_DEVICE_ID)
}

/// Copy the stored device identifier to the clipboard and return it.
///
/// # Errors
///
/// Returns an error if the clipboard is unavailable.
pub fn copy_device_id(store: &PreferenceStore, clipboard: &mut dyn Clipboard) -> Result<String> {
    let id = store.get_string(keys::KEY_DEVICE, PLACEHOLDER_DEVICE_ID);
    clipboard.set_text(&id)?;
    Ok(id)
}

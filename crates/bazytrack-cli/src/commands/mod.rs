pub mod identity;
pub mod settings;
pub mod status;
pub mod tracking;

use anyhow::Result;
use bazytrack_storage::PreferenceStore;
use std::{path::Path, sync::Arc};

/// Open the preference store that lives in the data directory.
pub fn open_store(data_dir: &Path) -> Result<Arc<PreferenceStore>> {
    Ok(Arc::new(PreferenceStore::open(&data_dir.join("prefs.db"))?))
}

use anyhow::Result;
use bazytrack_core::identifier;
use std::path::Path;

use super::open_store;
use crate::desktop::Osc52Clipboard;

pub fn handle_id(data_dir: &Path, copy: bool) -> Result<()> {
    let store = open_store(data_dir)?;
    let id = identifier::ensure_device_id(&store);
    store.flush()?;

    println!("{id}");
    if copy {
        identifier::copy_device_id(&store, &mut Osc52Clipboard)?;
        println!("Copied to clipboard.");
    }
    Ok(())
}

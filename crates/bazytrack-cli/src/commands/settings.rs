//! Settings management command handlers.

use anyhow::{Context, Result};
use bazytrack_storage::keys;
use std::path::Path;
use tabled::{Table, Tabled};

use super::open_store;

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Key")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// The keys exposed on the settings screen. The device id and the
/// status flag are shown by `status` and managed by `start`/`stop`.
const SETTING_KEYS: &[&str] = &[
    keys::KEY_URL,
    keys::KEY_INTERVAL,
    keys::KEY_DISTANCE,
    keys::KEY_ANGLE,
    keys::KEY_ACCURACY,
    keys::KEY_BUFFER,
    keys::KEY_WAKELOCK,
];

pub fn handle_list(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    keys::ensure_defaults(&store);
    store.flush()?;

    let rows: Vec<SettingRow> = SETTING_KEYS
        .iter()
        .copied()
        .map(|key| SettingRow {
            key,
            value: store
                .get_value(key)
                .map_or_else(|| "(unset)".to_string(), |v| v.to_string()),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

pub fn handle_get(data_dir: &Path, key: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    match store.get_value(key) {
        Some(value) => println!("{key} = {value}"),
        None => println!("{key} is not set"),
    }
    Ok(())
}

pub fn handle_set(data_dir: &Path, key: &str, value: &str) -> Result<()> {
    let store = open_store(data_dir)?;

    match key {
        keys::KEY_INTERVAL | keys::KEY_DISTANCE | keys::KEY_ANGLE => {
            let parsed: i64 = value
                .parse()
                .with_context(|| format!("'{key}' takes an integer"))?;
            if parsed < 0 {
                anyhow::bail!("'{key}' cannot be negative");
            }
            store.set_int(key, parsed);
        }
        keys::KEY_BUFFER | keys::KEY_WAKELOCK => {
            let parsed: bool = value
                .parse()
                .with_context(|| format!("'{key}' takes true or false"))?;
            store.set_bool(key, parsed);
        }
        keys::KEY_URL | keys::KEY_ACCURACY => store.set_string(key, value),
        keys::KEY_STATUS => {
            anyhow::bail!("The status flag is managed by 'bazytrack start' and 'bazytrack stop'")
        }
        keys::KEY_DEVICE => {
            anyhow::bail!("The device identifier is generated once and cannot be changed")
        }
        _ => anyhow::bail!("Unknown setting '{key}'"),
    }

    store.flush()?;
    println!("Set {key} = {value}");
    Ok(())
}

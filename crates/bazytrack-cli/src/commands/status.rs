use anyhow::Result;
use bazytrack_core::identifier::PLACEHOLDER_DEVICE_ID;
use bazytrack_storage::keys;
use std::path::Path;

use super::open_store;
use crate::desktop::ProcessTrackingService;

pub fn handle_status(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let tracking_on = store.get_bool(keys::KEY_STATUS, false);
    let device_id = store.get_string(keys::KEY_DEVICE, PLACEHOLDER_DEVICE_ID);
    let tracker_pid = ProcessTrackingService::new(data_dir).running_pid();

    println!("Device id: {device_id}");
    println!("Tracking:  {}", if tracking_on { "on" } else { "off" });
    match tracker_pid {
        Some(pid) => println!("Tracker:   running (PID: {pid})"),
        None => println!("Tracker:   not running"),
    }

    if tracking_on && tracker_pid.is_none() {
        println!("\nTracking is on but the tracker process is gone; run 'bazytrack start' to revive it.");
    }
    Ok(())
}

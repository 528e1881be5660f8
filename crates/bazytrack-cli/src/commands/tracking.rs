//! Tracking lifecycle commands: the CLI's toggle button.

use anyhow::Result;
use bazytrack_core::{PlatformCapabilities, ToggleController, ToggleState};
use bazytrack_storage::{keys, PreferenceStore};
use std::{path::Path, sync::Arc};

use super::open_store;
use crate::desktop::{
    EnvPermissionSource, IntervalWakeScheduler, ProcessTrackingService, StdinRationalePrompt,
};

fn build_controller(store: Arc<PreferenceStore>, data_dir: &Path) -> ToggleController {
    ToggleController::new(
        store,
        Box::new(ProcessTrackingService::new(data_dir)),
        Box::new(IntervalWakeScheduler::default()),
        Box::new(EnvPermissionSource),
        Box::new(StdinRationalePrompt),
        PlatformCapabilities::desktop(),
    )
}

pub async fn handle_start(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    keys::ensure_defaults(&store);

    let mut controller = build_controller(Arc::clone(&store), data_dir);
    // Attach re-validates the persisted state, so a tracker that died
    // while the flag was on gets restarted here.
    controller.attach().await?;

    if controller.is_tracking_on() {
        println!("Tracking is already on.");
        store.flush()?;
        return Ok(());
    }

    controller.toggle();
    controller.process_pending().await?;
    store.flush()?;

    if controller.state() == ToggleState::Running {
        println!("Tracking started.");
    } else {
        println!("Tracking not started: location permission denied.");
    }
    Ok(())
}

pub async fn handle_stop(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let mut controller = build_controller(Arc::clone(&store), data_dir);
    controller.attach().await?;

    if !controller.is_tracking_on() {
        println!("Tracking is already off.");
        return Ok(());
    }

    controller.toggle();
    controller.process_pending().await?;
    store.flush()?;

    println!("Tracking stopped.");
    Ok(())
}

//! Desktop implementations of the platform collaborators. On a desktop
//! host the tracker is a separate process, permissions come from the
//! environment, and the clipboard is the controlling terminal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bazytrack_core::{
    Capability, Clipboard, PermissionApi, PermissionOutcome, PermissionStatus, RationalePrompt,
    TrackingService, WakeScheduler,
};
use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};
use sysinfo::{Pid, System};

/// Environment variable naming the tracker executable.
pub const TRACKER_ENV: &str = "BAZYTRACK_TRACKER";
const DEFAULT_TRACKER: &str = "bazytrack-tracker";

/// Runs the tracker as a child process with a pid file for liveness
/// checks across invocations.
pub struct ProcessTrackingService {
    data_dir: PathBuf,
    tracker_cmd: String,
}

impl ProcessTrackingService {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            tracker_cmd: env::var(TRACKER_ENV).unwrap_or_else(|_| DEFAULT_TRACKER.to_string()),
        }
    }

    fn pid_path(&self) -> PathBuf {
        self.data_dir.join("tracker.pid")
    }

    /// PID of the tracker if its recorded process is still alive.
    #[must_use]
    pub fn running_pid(&self) -> Option<usize> {
        let pid_str = fs::read_to_string(self.pid_path()).ok()?;
        let pid = pid_str.trim().parse::<usize>().ok()?;
        let mut sys = System::new();
        sys.refresh_process(Pid::from(pid)).then_some(pid)
    }
}

impl TrackingService for ProcessTrackingService {
    fn start(&mut self) -> Result<()> {
        if let Some(pid) = self.running_pid() {
            log::info!("Tracker is already running (PID: {pid}).");
            return Ok(());
        }
        if self.pid_path().exists() {
            log::warn!("Removing stale tracker PID file.");
            let _ = fs::remove_file(self.pid_path());
        }

        fs::create_dir_all(&self.data_dir).context("Failed to create data directory")?;
        let child = Command::new(&self.tracker_cmd)
            .arg("--data-dir")
            .arg(&self.data_dir)
            .spawn()
            .with_context(|| format!("Failed to spawn tracker '{}'", self.tracker_cmd))?;

        fs::write(self.pid_path(), child.id().to_string())
            .context("Failed to write tracker PID file")?;
        log::info!("Tracker started (PID: {}).", child.id());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Idempotent: stopping an already-stopped tracker is fine.
        if let Some(pid) = self.running_pid() {
            let mut sys = System::new();
            if sys.refresh_process(Pid::from(pid)) {
                if let Some(process) = sys.process(Pid::from(pid)) {
                    process.kill();
                    log::info!("Tracker stopped (PID: {pid}).");
                }
            }
        }
        if self.pid_path().exists() {
            fs::remove_file(self.pid_path()).context("Failed to remove tracker PID file")?;
        }
        Ok(())
    }
}

/// Stand-in for the platform's repeating-wake facility. The desktop
/// host keeps child processes alive on its own, so this only records
/// the requested schedule.
#[derive(Default)]
pub struct IntervalWakeScheduler {
    interval: Option<Duration>,
}

impl WakeScheduler for IntervalWakeScheduler {
    fn schedule_repeating(&mut self, interval: Duration) -> Result<()> {
        log::debug!("Wake backstop scheduled every {interval:?}");
        self.interval = Some(interval);
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        if let Some(interval) = self.interval.take() {
            log::debug!("Wake backstop cancelled (was every {interval:?})");
        }
        Ok(())
    }
}

/// Permission source driven by environment toggles; everything is
/// granted unless explicitly switched off.
pub struct EnvPermissionSource;

/// `BAZYTRACK_ALLOW_LOCATION` / `BAZYTRACK_ALLOW_BACKGROUND`.
fn env_allows(var: &str) -> bool {
    !matches!(
        env::var(var).ok().as_deref(),
        Some("0" | "false" | "no" | "off")
    )
}

#[async_trait]
impl PermissionApi for EnvPermissionSource {
    fn check(&self, capability: Capability) -> PermissionStatus {
        let allowed = match capability {
            Capability::FineLocation => env_allows("BAZYTRACK_ALLOW_LOCATION"),
            Capability::BackgroundLocation => env_allows("BAZYTRACK_ALLOW_BACKGROUND"),
        };
        if allowed {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn request(&self, capabilities: &[Capability]) -> Result<PermissionOutcome> {
        // No grant UI on desktop; a request resolves against the same
        // source the check reads.
        let mut outcome = PermissionOutcome::default();
        for capability in capabilities {
            outcome.record(*capability, self.check(*capability));
        }
        Ok(outcome)
    }
}

/// y/N confirmation on the terminal.
pub struct StdinRationalePrompt;

#[async_trait]
impl RationalePrompt for StdinRationalePrompt {
    async fn confirm_background_access(&self) -> bool {
        println!("Allow background location so tracking continues while the app is hidden? [y/N]");
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Clipboard via the OSC 52 escape sequence, understood by most
/// terminal emulators. Avoids a dependency on a desktop clipboard
/// daemon.
pub struct Osc52Clipboard;

impl Clipboard for Osc52Clipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let encoded = STANDARD.encode(text);
        let mut out = std::io::stdout().lock();
        write!(out, "\x1b]52;c;{encoded}\x07")?;
        out.flush()?;
        Ok(())
    }
}

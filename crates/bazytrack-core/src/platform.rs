//! External collaborators of the toggle controller. The controller only
//! issues start/stop/schedule calls; it never inspects collaborator
//! internals.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// The always-on background tracking process. Its location-sampling and
/// upload logic lives outside this crate.
pub trait TrackingService: Send {
    /// Ask the platform to start the tracker.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the start.
    fn start(&mut self) -> Result<()>;

    /// Ask the platform to stop the tracker.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop request could not be issued.
    fn stop(&mut self) -> Result<()>;
}

/// Periodic wake-up scheduling, used as a liveness backstop on platforms
/// without exact background execution.
pub trait WakeScheduler: Send {
    /// Schedule a repeating wake-up at the given interval.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule could not be registered.
    fn schedule_repeating(&mut self, interval: Duration) -> Result<()>;

    /// Cancel the repeating wake-up. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if cancellation fails.
    fn cancel(&mut self) -> Result<()>;
}

/// Destination of the device-id copy affordance.
pub trait Clipboard {
    /// Place `text` on the clipboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard is unavailable.
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// One-time rationale dialog shown before requesting the background
/// location tier.
#[async_trait]
pub trait RationalePrompt: Send + Sync {
    /// Whether the user agreed to be asked for background access.
    async fn confirm_background_access(&self) -> bool;
}

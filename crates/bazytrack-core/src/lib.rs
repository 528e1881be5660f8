pub mod capabilities;
pub mod config;
pub mod controller;
pub mod error;
pub mod identifier;
pub mod permissions;
pub mod platform;

pub use capabilities::PlatformCapabilities;
pub use controller::{ButtonAppearance, ToggleController, ToggleState};
pub use error::TrackingError;
pub use permissions::{Capability, PermissionApi, PermissionOutcome, PermissionStatus};
pub use platform::{Clipboard, RationalePrompt, TrackingService, WakeScheduler};

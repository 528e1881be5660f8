use std::time::Duration;

/// Interval of the periodic wake backstop used where the platform may
/// suspend background execution.
pub const WAKE_BACKSTOP_INTERVAL: Duration = Duration::from_millis(15_000);

/// Capability flags of the host platform, decided once at startup.
///
/// The controller branches on these instead of on scattered platform
/// version checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Whether the platform keeps a started service alive on its own.
    /// When false, a repeating wake-up is scheduled as a liveness
    /// backstop while tracking is on.
    pub supports_exact_background_execution: bool,
    /// Whether background location is a distinct permission tier that
    /// must be requested separately from fine location.
    pub background_location_tier: bool,
}

impl PlatformCapabilities {
    /// A current mobile platform: no wake backstop needed, background
    /// location gated behind its own permission.
    #[must_use]
    pub const fn modern() -> Self {
        Self {
            supports_exact_background_execution: true,
            background_location_tier: true,
        }
    }

    /// An older mobile platform: needs the wake backstop, single
    /// location permission.
    #[must_use]
    pub const fn legacy() -> Self {
        Self {
            supports_exact_background_execution: false,
            background_location_tier: false,
        }
    }

    /// A desktop host: no backstop, no permission tiers.
    #[must_use]
    pub const fn desktop() -> Self {
        Self {
            supports_exact_background_execution: true,
            background_location_tier: false,
        }
    }
}

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// A runtime capability the tracker needs from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FineLocation,
    BackgroundLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Result of an asynchronous permission request, one status per
/// requested capability.
#[derive(Debug, Clone, Default)]
pub struct PermissionOutcome {
    results: HashMap<Capability, PermissionStatus>,
}

impl PermissionOutcome {
    /// Build an outcome where every capability shares one status.
    #[must_use]
    pub fn uniform(capabilities: &[Capability], status: PermissionStatus) -> Self {
        let mut outcome = Self::default();
        for capability in capabilities {
            outcome.record(*capability, status);
        }
        outcome
    }

    pub fn record(&mut self, capability: Capability, status: PermissionStatus) {
        self.results.insert(capability, status);
    }

    /// Status of one capability. Absent entries count as denied.
    #[must_use]
    pub fn status(&self, capability: Capability) -> PermissionStatus {
        self.results
            .get(&capability)
            .copied()
            .unwrap_or(PermissionStatus::Denied)
    }

    /// All-or-nothing policy: the grant holds only if every requested
    /// capability came back granted.
    #[must_use]
    pub fn all_granted(&self) -> bool {
        !self.results.is_empty()
            && self
                .results
                .values()
                .all(|status| *status == PermissionStatus::Granted)
    }
}

/// The platform's permission surface.
#[async_trait]
pub trait PermissionApi: Send + Sync {
    /// Synchronous check against the live permission state.
    fn check(&self, capability: Capability) -> PermissionStatus;

    /// Ask the user to grant the given capabilities. Resolves when the
    /// platform delivers a result; no timeout is applied, the platform
    /// guarantees an eventual answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be presented at all.
    async fn request(&self, capabilities: &[Capability]) -> Result<PermissionOutcome>;
}

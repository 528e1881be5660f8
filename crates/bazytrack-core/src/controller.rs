use anyhow::Result;
use bazytrack_storage::{keys, PrefSubscription, PrefValue, PreferenceStore};
use std::sync::Arc;

use crate::capabilities::{PlatformCapabilities, WAKE_BACKSTOP_INTERVAL};
use crate::error::TrackingError;
use crate::identifier;
use crate::permissions::{Capability, PermissionApi, PermissionStatus};
use crate::platform::{RationalePrompt, TrackingService, WakeScheduler};

/// Settled states of the toggle state machine. `RequestingPermission` is
/// held while an asynchronous permission request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Stopped,
    RequestingPermission,
    Running,
}

/// What the toggle control shows. At any settled moment this must equal
/// the persisted status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAppearance {
    StartTracking,
    StopTracking,
}

impl ButtonAppearance {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::StartTracking => "Start tracking",
            Self::StopTracking => "Stop tracking",
        }
    }

    /// The pulse animation runs only while tracking is on.
    #[must_use]
    pub const fn animating(self) -> bool {
        matches!(self, Self::StopTracking)
    }
}

enum Acquisition {
    Granted,
    Denied,
    Busy,
}

/// Owns the tracking toggle: reflects the persisted status flag, drives
/// the background tracking service, and gates the running state behind
/// permission acquisition.
///
/// All mutations of the status flag go through the preference store; the
/// controller reacts to the resulting change notifications, so external
/// writers (a settings screen, the tracker itself) drive it the same way
/// the toggle button does.
pub struct ToggleController {
    prefs: Arc<PreferenceStore>,
    service: Box<dyn TrackingService>,
    wake: Box<dyn WakeScheduler>,
    permissions: Box<dyn PermissionApi>,
    rationale: Box<dyn RationalePrompt>,
    capabilities: PlatformCapabilities,
    state: ToggleState,
    button: ButtonAppearance,
    subscription: Option<PrefSubscription>,
    request_in_flight: bool,
    background_prompted: bool,
}

impl ToggleController {
    #[must_use]
    pub fn new(
        prefs: Arc<PreferenceStore>,
        service: Box<dyn TrackingService>,
        wake: Box<dyn WakeScheduler>,
        permissions: Box<dyn PermissionApi>,
        rationale: Box<dyn RationalePrompt>,
        capabilities: PlatformCapabilities,
    ) -> Self {
        Self {
            prefs,
            service,
            wake,
            permissions,
            rationale,
            capabilities,
            state: ToggleState::Stopped,
            button: ButtonAppearance::StartTracking,
            subscription: None,
            request_in_flight: false,
            background_prompted: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ToggleState {
        self.state
    }

    #[must_use]
    pub const fn button(&self) -> ButtonAppearance {
        self.button
    }

    /// The persisted status flag.
    #[must_use]
    pub fn is_tracking_on(&self) -> bool {
        self.prefs.get_bool(keys::KEY_STATUS, false)
    }

    /// Bind to the store and restore the persisted state: subscribe to
    /// change notifications, make sure the device identifier exists, and
    /// re-enter the running state (re-validating the location
    /// permission) if tracking was left on.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracking service fails to start.
    pub async fn attach(&mut self) -> Result<()> {
        self.subscription = Some(self.prefs.subscribe());
        identifier::ensure_device_id(&self.prefs);

        if self.prefs.get_bool(keys::KEY_STATUS, false) {
            self.start_tracking().await
        } else {
            self.enter_stopped();
            Ok(())
        }
    }

    /// Unbind from the store. Dropping the subscription deregisters the
    /// observer; the stored status flag is left untouched.
    pub fn detach(&mut self) {
        self.subscription = None;
    }

    /// Flip the persisted status flag. All side effects run when the
    /// resulting change notification is processed.
    pub fn toggle(&self) {
        let on = self.prefs.get_bool(keys::KEY_STATUS, false);
        log::info!(
            "{}",
            if on {
                "Tracking toggled off"
            } else {
                "Tracking toggled on"
            }
        );
        self.prefs.set_bool(keys::KEY_STATUS, !on);
    }

    /// Drain queued change notifications, including any produced while
    /// draining (such as the revert write after a permission denial).
    ///
    /// # Errors
    ///
    /// Returns an error if a service start or stop fails; unprocessed
    /// notifications stay queued for the next call.
    pub async fn process_pending(&mut self) -> Result<()> {
        loop {
            let Some((key, value)) = self
                .subscription
                .as_mut()
                .and_then(PrefSubscription::try_next)
            else {
                break;
            };
            self.on_preference_changed(&key, &value).await?;
        }
        Ok(())
    }

    /// Dispatch one change notification. The written value travels with
    /// the notification so that a toggled-on-then-off pair drained in
    /// one batch still yields one start followed by one stop.
    async fn on_preference_changed(&mut self, key: &str, value: &PrefValue) -> Result<()> {
        log::debug!("Preference changed: {key}");
        if key != keys::KEY_STATUS {
            return Ok(());
        }
        match value {
            PrefValue::Bool(true) => self.start_tracking().await,
            _ => self.stop_tracking(),
        }
    }

    async fn start_tracking(&mut self) -> Result<()> {
        match self.acquire_fine_location().await {
            Acquisition::Granted => self.enter_running().await,
            Acquisition::Denied => {
                // Revert the flag so the stored state and the visible
                // state cannot drift apart; the revert notification
                // settles the machine in Stopped.
                self.prefs.set_bool(keys::KEY_STATUS, false);
                Ok(())
            }
            Acquisition::Busy => Ok(()),
        }
    }

    /// Check the fine-location set, requesting it from the user when it
    /// is not yet granted. All-or-nothing: one denial fails the set.
    async fn acquire_fine_location(&mut self) -> Acquisition {
        if self.permissions.check(Capability::FineLocation) == PermissionStatus::Granted {
            return Acquisition::Granted;
        }
        if self.request_in_flight {
            log::warn!("A permission request is already in flight; rejecting another");
            return Acquisition::Busy;
        }

        self.state = ToggleState::RequestingPermission;
        self.request_in_flight = true;
        let result = self.permissions.request(&[Capability::FineLocation]).await;
        self.request_in_flight = false;

        match result {
            Ok(outcome) if outcome.all_granted() => Acquisition::Granted,
            Ok(_) => Acquisition::Denied,
            Err(e) => {
                log::error!("Permission request failed: {e}");
                Acquisition::Denied
            }
        }
    }

    async fn enter_running(&mut self) -> Result<()> {
        if let Err(e) = self.service.start() {
            // The platform refused the start (e.g. background-start
            // restrictions). Revert the flag and surface the failure.
            log::error!("Tracking service failed to start: {e}");
            self.prefs.set_bool(keys::KEY_STATUS, false);
            return Err(TrackingError::ServiceStart(e.to_string()).into());
        }

        if !self.capabilities.supports_exact_background_execution {
            // Best-effort: a missing backstop degrades liveness, it does
            // not invalidate the running state.
            if let Err(e) = self.wake.schedule_repeating(WAKE_BACKSTOP_INTERVAL) {
                log::warn!("Failed to schedule wake backstop: {e}");
            }
        }

        self.state = ToggleState::Running;
        self.button = ButtonAppearance::StopTracking;
        log::info!("Tracking service started");

        self.request_background_location().await;
        Ok(())
    }

    /// Best-effort acquisition of the background tier: prompt once, and
    /// request only if the user agrees. The outcome never gates the
    /// running state; a denial only degrades accuracy inside the
    /// tracker.
    async fn request_background_location(&mut self) {
        if !self.capabilities.background_location_tier || self.background_prompted {
            return;
        }
        if self.permissions.check(Capability::BackgroundLocation) == PermissionStatus::Granted {
            return;
        }

        self.background_prompted = true;
        if self.rationale.confirm_background_access().await {
            if let Err(e) = self
                .permissions
                .request(&[Capability::BackgroundLocation])
                .await
            {
                log::warn!("Background location request failed: {e}");
            }
        }
    }

    fn stop_tracking(&mut self) -> Result<()> {
        if !self.capabilities.supports_exact_background_execution {
            if let Err(e) = self.wake.cancel() {
                log::warn!("Failed to cancel wake backstop: {e}");
            }
        }

        // Settle the visible state first: the stored flag is already
        // off, and the display must agree with it even if the stop
        // request fails.
        self.enter_stopped();
        self.service
            .stop()
            .map_err(|e| TrackingError::ServiceStop(e.to_string()))?;

        log::info!("Tracking service stopped");
        Ok(())
    }

    fn enter_stopped(&mut self) {
        self.state = ToggleState::Stopped;
        self.button = ButtonAppearance::StartTracking;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        starts: AtomicUsize,
        stops: AtomicUsize,
        schedules: AtomicUsize,
        cancels: AtomicUsize,
        requests: AtomicUsize,
    }

    impl Counters {
        fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }
        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
        fn schedules(&self) -> usize {
            self.schedules.load(Ordering::SeqCst)
        }
        fn cancels(&self) -> usize {
            self.cancels.load(Ordering::SeqCst)
        }
        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    struct FakeService {
        counters: Arc<Counters>,
        fail_start: bool,
    }

    impl TrackingService for FakeService {
        fn start(&mut self) -> Result<()> {
            if self.fail_start {
                anyhow::bail!("foreground start rejected");
            }
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeScheduler {
        counters: Arc<Counters>,
    }

    impl WakeScheduler for FakeScheduler {
        fn schedule_repeating(&mut self, interval: std::time::Duration) -> Result<()> {
            assert_eq!(interval, WAKE_BACKSTOP_INTERVAL);
            self.counters.schedules.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn cancel(&mut self) -> Result<()> {
            self.counters.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakePermissions {
        counters: Arc<Counters>,
        fine: PermissionStatus,
        background: PermissionStatus,
        grant_requests: bool,
    }

    #[async_trait]
    impl PermissionApi for FakePermissions {
        fn check(&self, capability: Capability) -> PermissionStatus {
            match capability {
                Capability::FineLocation => self.fine,
                Capability::BackgroundLocation => self.background,
            }
        }

        async fn request(&self, capabilities: &[Capability]) -> Result<PermissionOutcome> {
            self.counters.requests.fetch_add(1, Ordering::SeqCst);
            let status = if self.grant_requests {
                PermissionStatus::Granted
            } else {
                PermissionStatus::Denied
            };
            Ok(PermissionOutcome::uniform(capabilities, status))
        }
    }

    struct FixedPrompt(bool);

    #[async_trait]
    impl RationalePrompt for FixedPrompt {
        async fn confirm_background_access(&self) -> bool {
            self.0
        }
    }

    struct Fixture {
        prefs: Arc<PreferenceStore>,
        counters: Arc<Counters>,
        controller: ToggleController,
    }

    fn fixture(
        fine: PermissionStatus,
        grant_requests: bool,
        capabilities: PlatformCapabilities,
    ) -> Fixture {
        fixture_with(fine, grant_requests, capabilities, false, true)
    }

    fn fixture_with(
        fine: PermissionStatus,
        grant_requests: bool,
        capabilities: PlatformCapabilities,
        fail_start: bool,
        confirm_rationale: bool,
    ) -> Fixture {
        let prefs = Arc::new(PreferenceStore::open_in_memory().unwrap());
        let counters = Arc::new(Counters::default());
        let controller = ToggleController::new(
            Arc::clone(&prefs),
            Box::new(FakeService {
                counters: Arc::clone(&counters),
                fail_start,
            }),
            Box::new(FakeScheduler {
                counters: Arc::clone(&counters),
            }),
            Box::new(FakePermissions {
                counters: Arc::clone(&counters),
                fine,
                background: PermissionStatus::Denied,
                grant_requests,
            }),
            Box::new(FixedPrompt(confirm_rationale)),
            capabilities,
        );
        Fixture {
            prefs,
            counters,
            controller,
        }
    }

    /// The §3-style drift check: displayed state equals stored state at
    /// every settled moment.
    fn assert_settled(f: &Fixture) {
        let on = f.prefs.get_bool(keys::KEY_STATUS, false);
        let showing_stop = f.controller.button() == ButtonAppearance::StopTracking;
        assert_eq!(on, showing_stop, "button drifted from stored status");
    }

    #[tokio::test]
    async fn test_fresh_attach_shows_start_and_starts_nothing() {
        let mut f = fixture(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        assert_eq!(f.controller.state(), ToggleState::Stopped);
        assert_eq!(f.controller.button(), ButtonAppearance::StartTracking);
        assert_eq!(f.counters.starts(), 0);
        assert_settled(&f);
    }

    #[tokio::test]
    async fn test_attach_generates_device_id_once() {
        let mut f = fixture(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        let id = f.prefs.get_string(keys::KEY_DEVICE, "");
        assert_eq!(id.len(), 9);

        f.controller.detach();
        f.controller.attach().await.unwrap();
        assert_eq!(f.prefs.get_string(keys::KEY_DEVICE, ""), id);
    }

    #[tokio::test]
    async fn test_toggle_on_with_permission_granted() {
        let mut f = fixture(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        assert!(f.prefs.get_bool(keys::KEY_STATUS, false));
        assert_eq!(f.controller.state(), ToggleState::Running);
        assert_eq!(f.controller.button(), ButtonAppearance::StopTracking);
        assert!(f.controller.button().animating());
        assert_eq!(f.counters.starts(), 1);
        assert_settled(&f);
    }

    #[tokio::test]
    async fn test_toggle_on_with_permission_denied_reverts() {
        let mut f = fixture(
            PermissionStatus::Denied,
            false,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        assert!(!f.prefs.get_bool(keys::KEY_STATUS, false));
        assert_eq!(f.controller.state(), ToggleState::Stopped);
        assert_eq!(f.controller.button(), ButtonAppearance::StartTracking);
        assert_eq!(f.counters.starts(), 0);
        assert_settled(&f);
    }

    #[tokio::test]
    async fn test_toggle_on_with_denied_check_but_granted_request() {
        let mut f = fixture(
            PermissionStatus::Denied,
            true,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        assert_eq!(f.controller.state(), ToggleState::Running);
        assert_eq!(f.counters.starts(), 1);
        assert_settled(&f);
    }

    #[tokio::test]
    async fn test_toggle_on_then_off() {
        let mut f = fixture(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();
        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        assert!(!f.prefs.get_bool(keys::KEY_STATUS, false));
        assert_eq!(f.counters.starts(), 1);
        assert_eq!(f.counters.stops(), 1);
        assert_eq!(f.controller.button(), ButtonAppearance::StartTracking);
        assert_settled(&f);
    }

    #[tokio::test]
    async fn test_toggle_on_then_off_before_processing() {
        // Both writes are queued before any side effect runs; draining
        // them yields one start followed by one stop, final state off.
        let mut f = fixture(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        assert!(!f.prefs.get_bool(keys::KEY_STATUS, false));
        assert_eq!(f.counters.starts(), 1);
        assert_eq!(f.counters.stops(), 1);
        assert_settled(&f);
    }

    #[tokio::test]
    async fn test_attach_with_persisted_on_revalidates_and_starts() {
        let prefs = Arc::new(PreferenceStore::open_in_memory().unwrap());
        prefs.set_bool(keys::KEY_STATUS, true);

        let counters = Arc::new(Counters::default());
        let mut controller = ToggleController::new(
            Arc::clone(&prefs),
            Box::new(FakeService {
                counters: Arc::clone(&counters),
                fail_start: false,
            }),
            Box::new(FakeScheduler {
                counters: Arc::clone(&counters),
            }),
            Box::new(FakePermissions {
                counters: Arc::clone(&counters),
                fine: PermissionStatus::Granted,
                background: PermissionStatus::Granted,
                grant_requests: true,
            }),
            Box::new(FixedPrompt(true)),
            PlatformCapabilities::modern(),
        );

        controller.attach().await.unwrap();
        assert_eq!(controller.state(), ToggleState::Running);
        assert_eq!(counters.starts(), 1);
    }

    #[tokio::test]
    async fn test_attach_with_persisted_on_and_denial_settles_off() {
        let prefs = Arc::new(PreferenceStore::open_in_memory().unwrap());
        prefs.set_bool(keys::KEY_STATUS, true);

        let counters = Arc::new(Counters::default());
        let mut controller = ToggleController::new(
            Arc::clone(&prefs),
            Box::new(FakeService {
                counters: Arc::clone(&counters),
                fail_start: false,
            }),
            Box::new(FakeScheduler {
                counters: Arc::clone(&counters),
            }),
            Box::new(FakePermissions {
                counters: Arc::clone(&counters),
                fine: PermissionStatus::Denied,
                background: PermissionStatus::Denied,
                grant_requests: false,
            }),
            Box::new(FixedPrompt(true)),
            PlatformCapabilities::modern(),
        );

        controller.attach().await.unwrap();
        controller.process_pending().await.unwrap();

        assert!(!prefs.get_bool(keys::KEY_STATUS, false));
        assert_eq!(controller.state(), ToggleState::Stopped);
        assert_eq!(counters.starts(), 0);
    }

    #[tokio::test]
    async fn test_wake_backstop_scheduled_only_on_legacy_platforms() {
        let mut f = fixture(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::legacy(),
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();
        assert_eq!(f.counters.schedules(), 1);

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();
        assert_eq!(f.counters.cancels(), 1);
    }

    #[tokio::test]
    async fn test_no_wake_backstop_on_modern_platforms() {
        let mut f = fixture(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();
        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        assert_eq!(f.counters.schedules(), 0);
        assert_eq!(f.counters.cancels(), 0);
    }

    #[tokio::test]
    async fn test_background_denial_does_not_gate_running() {
        // Fine location granted up front; the background tier request is
        // issued (prompt accepted) and denied, yet the machine runs.
        let mut f = fixture(
            PermissionStatus::Granted,
            false,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        assert_eq!(f.controller.state(), ToggleState::Running);
        assert_eq!(f.counters.requests(), 1);
        assert_settled(&f);
    }

    #[tokio::test]
    async fn test_declined_rationale_skips_background_request() {
        let mut f = fixture_with(
            PermissionStatus::Granted,
            false,
            PlatformCapabilities::modern(),
            false,
            false,
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        assert_eq!(f.controller.state(), ToggleState::Running);
        assert_eq!(f.counters.requests(), 0);
    }

    #[tokio::test]
    async fn test_background_prompt_shown_at_most_once() {
        let mut f = fixture(
            PermissionStatus::Granted,
            false,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();

        for _ in 0..3 {
            f.controller.toggle();
            f.controller.process_pending().await.unwrap();
            f.controller.toggle();
            f.controller.process_pending().await.unwrap();
        }

        assert_eq!(f.counters.requests(), 1);
    }

    #[tokio::test]
    async fn test_service_start_failure_reverts_flag_and_surfaces_error() {
        let mut f = fixture_with(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::modern(),
            true,
            true,
        );
        f.controller.attach().await.unwrap();

        f.controller.toggle();
        let err = f.controller.process_pending().await.unwrap_err();
        assert!(err.to_string().contains("failed to start tracking service"));
        assert!(!f.prefs.get_bool(keys::KEY_STATUS, false));

        // The revert notification is still queued; draining it settles
        // the machine in Stopped.
        f.controller.process_pending().await.unwrap();
        assert_eq!(f.controller.state(), ToggleState::Stopped);
        assert_eq!(f.controller.button(), ButtonAppearance::StartTracking);
        assert_settled(&f);
    }

    #[tokio::test]
    async fn test_detach_preserves_stored_state() {
        let mut f = fixture(
            PermissionStatus::Granted,
            true,
            PlatformCapabilities::modern(),
        );
        f.controller.attach().await.unwrap();
        f.controller.toggle();
        f.controller.process_pending().await.unwrap();

        f.controller.detach();
        assert!(f.prefs.get_bool(keys::KEY_STATUS, false));

        // Writes while detached reach no observer and change nothing in
        // the controller.
        f.prefs.set_bool(keys::KEY_STATUS, false);
        f.controller.process_pending().await.unwrap();
        assert_eq!(f.controller.state(), ToggleState::Running);
    }

    #[tokio::test]
    async fn test_status_matches_button_across_interleavings() {
        for grant in [true, false] {
            let mut f = fixture(
                PermissionStatus::Denied,
                grant,
                PlatformCapabilities::modern(),
            );
            f.controller.attach().await.unwrap();
            assert_settled(&f);

            for _ in 0..4 {
                f.controller.toggle();
                f.controller.process_pending().await.unwrap();
                assert_settled(&f);
            }
        }
    }
}

//! The trace coordinator.
//!
//! Decides when advertising and scanning run. Lifecycle triggers (foreground
//! and background transitions, scheduled wake-ups, settings changes) call into
//! one shared [`TraceCoordinator`]; every transition runs under a single lock,
//! so transitions never interleave and status snapshots are never torn.
//!
//! ```text
//!            start(fg)                      start(bg)
//!   Stopped ─────────► ActiveForeground   Stopped ─────────► ActiveBackground
//!      ▲                     │                ▲                     │
//!      └──── stop / pause ───┘                └──── stop / pause ───┘
//! ```
//!
//! Starting is gated: the identity secret must be set, the radio present and
//! powered, the radio session initialised, and the paused flag clear. A gate
//! that does not hold leaves the coordinator stopped without an error.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TimingConfig;
use crate::distance::DistanceEstimator;
use crate::error::{Result, TraceError};
use crate::identity::Identity;
use crate::radio::{BroadcastService, DeviceStore, ObservationService, RadioAdapter, TraceContext};
use crate::settings::SettingsStore;
use crate::types::{TraceMode, TracePhase, TraceStatus};

/// The external collaborators a coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Capability checks and session resources.
    pub radio: Arc<dyn RadioAdapter>,
    /// Advertising.
    pub broadcast: Arc<dyn BroadcastService>,
    /// Scanning.
    pub observation: Arc<dyn ObservationService>,
    /// Storage for observed peers.
    pub devices: Arc<dyn DeviceStore>,
    /// Persisted paused flag and secret.
    pub settings: Arc<dyn SettingsStore>,
}

impl Collaborators {
    /// Use one radio value for capability checks, advertising and scanning.
    pub fn single_radio<R>(
        radio: Arc<R>,
        devices: Arc<dyn DeviceStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self
    where
        R: RadioAdapter + BroadcastService + ObservationService + 'static,
    {
        Self {
            radio: radio.clone(),
            broadcast: radio.clone(),
            observation: radio,
            devices,
            settings,
        }
    }
}

/// Parameters a running trace was enabled with. Disabling reuses them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveTrace {
    mode: TraceMode,
    rebroadcast_period: Duration,
    scan_interval: Duration,
    ctx: TraceContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Initialized(TraceContext),
}

#[derive(Debug)]
struct TraceState {
    // Mode of the running trace, or of the last one; resume uses it.
    mode: TraceMode,
    active: Option<ActiveTrace>,
    session: SessionState,
    identity: Option<Identity>,
    changed_at: DateTime<Utc>,
}

/// Lifecycle state machine for advertising and scanning.
///
/// Construct one per process and share it with `Arc`.
pub struct TraceCoordinator {
    timing: TimingConfig,
    estimator: DistanceEstimator,
    collaborators: Collaborators,
    state: Mutex<TraceState>,
    started_tx: watch::Sender<bool>,
}

impl TraceCoordinator {
    /// Create a stopped, uninitialised coordinator.
    ///
    /// The identity is loaded from the settings store. No radio resources are
    /// acquired until [`Self::try_initialize`] or a start.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store cannot be read.
    pub fn new(timing: TimingConfig, collaborators: Collaborators) -> Result<Self> {
        let identity = collaborators.settings.secret()?.map(Identity::derive);
        let (started_tx, _) = watch::channel(false);

        Ok(Self {
            timing,
            estimator: DistanceEstimator::new(timing.environmental_factor),
            collaborators,
            state: Mutex::new(TraceState {
                mode: TraceMode::default(),
                active: None,
                session: SessionState::Uninitialized,
                identity,
                changed_at: Utc::now(),
            }),
            started_tx,
        })
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Start tracing in `mode`, stopping a running trace first.
    ///
    /// Stays stopped when a gate does not hold.
    ///
    /// # Errors
    ///
    /// Returns an error only if the paused flag cannot be read.
    pub fn start(&self, mode: TraceMode) -> Result<()> {
        let mut state = self.lock();
        self.start_locked(&mut state, mode)
    }

    /// Stop tracing.
    ///
    /// Advertising and scanning are disabled with the exact parameters they
    /// were enabled with.
    pub fn stop(&self) {
        let mut state = self.lock();
        self.stop_locked(&mut state);
    }

    /// Acquire radio resources if possible. Returns whether the session is
    /// initialised afterwards.
    ///
    /// Idempotent. Does nothing without an identity; leaves the session
    /// uninitialised when the radio is absent, powered off, or fails to open.
    pub fn try_initialize(&self) -> bool {
        let mut state = self.lock();
        self.try_initialize_locked(&mut state)
    }

    /// Run [`Self::try_initialize`], then report [`Self::is_enabled`].
    pub fn ensure_initialized(&self) -> bool {
        let mut state = self.lock();
        self.try_initialize_locked(&mut state);
        self.is_enabled_locked(&state)
    }

    /// Whether every gate except the paused flag holds. Has no side effects.
    pub fn is_enabled(&self) -> bool {
        let state = self.lock();
        self.is_enabled_locked(&state)
    }

    /// Whether advertising and scanning are active.
    pub fn is_started(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Subscribe to the started flag. Receivers are notified when it changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.started_tx.subscribe()
    }

    // =========================================================================
    // SETTINGS
    // =========================================================================

    /// The persisted paused flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store cannot be read.
    pub fn paused(&self) -> Result<bool> {
        Ok(self.collaborators.settings.paused()?)
    }

    /// Persist the paused flag, then stop (pausing) or restart in the last
    /// mode (resuming).
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store cannot be accessed.
    pub fn set_paused(&self, paused: bool) -> Result<()> {
        let mut state = self.lock();
        self.collaborators.settings.set_paused(paused)?;
        info!(paused, "Paused flag changed");

        if paused {
            self.stop_locked(&mut state);
            Ok(())
        } else {
            let mode = state.mode;
            self.start_locked(&mut state, mode)
        }
    }

    /// The persisted identity secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store cannot be read.
    pub fn secret(&self) -> Result<Option<String>> {
        Ok(self.collaborators.settings.secret()?)
    }

    /// Replace or clear the identity secret.
    ///
    /// Clearing stops tracing and releases the radio session. Setting a new
    /// value stops any running trace, releases the session scoped to the old
    /// identity, then initialises a session for the new one. Setting the
    /// current value again only retries initialisation.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store cannot be written.
    pub fn set_secret(&self, secret: Option<&str>) -> Result<()> {
        let mut state = self.lock();

        match secret {
            None => {
                self.collaborators.settings.clear_secret()?;
                self.stop_locked(&mut state);
                self.release_session(&mut state);
                state.identity = None;
                info!("Identity cleared");
            }
            Some(secret) => {
                self.collaborators.settings.set_secret(secret)?;
                let changed = state
                    .identity
                    .as_ref()
                    .map_or(true, |identity| identity.secret() != secret);

                if changed {
                    if state.active.is_some() {
                        self.stop_locked(&mut state);
                    }
                    self.release_session(&mut state);
                    let identity = Identity::derive(secret);
                    info!(device_id = %identity.device_id(), "Identity replaced");
                    state.identity = Some(identity);
                }
                self.try_initialize_locked(&mut state);
            }
        }
        Ok(())
    }

    // =========================================================================
    // IDENTITY & DISTANCE
    // =========================================================================

    /// Identifier derived from the secret, `None` without one.
    pub fn device_id(&self) -> Option<Uuid> {
        self.lock().identity.as_ref().map(Identity::device_id)
    }

    /// Radio service identifier derived from the secret.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::NotInitialized`] when no secret is configured.
    pub fn service_id(&self) -> Result<Uuid> {
        self.lock()
            .identity
            .as_ref()
            .map(Identity::service_id)
            .ok_or(TraceError::NotInitialized)
    }

    /// Estimate the distance to a transmitter in centimetres.
    ///
    /// Returns `None` for the unknown reference power `-1`.
    pub fn estimate_distance(&self, rssi: i16, reference_power: i16) -> Option<f64> {
        self.estimator.estimate(rssi, reference_power)
    }

    /// The estimator used by this coordinator.
    pub const fn estimator(&self) -> DistanceEstimator {
        self.estimator
    }

    /// The timing profile in use.
    pub const fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Consistent snapshot of the coordinator.
    ///
    /// # Errors
    ///
    /// Returns an error if the paused flag cannot be read.
    pub fn status(&self) -> Result<TraceStatus> {
        let state = self.lock();
        let paused = self.collaborators.settings.paused()?;
        let phase = state
            .active
            .map_or(TracePhase::Stopped, |active| TracePhase::active(active.mode));

        Ok(TraceStatus {
            phase,
            started: phase.is_started(),
            mode: state.mode,
            background: state.mode.is_background(),
            paused,
            initialized: matches!(state.session, SessionState::Initialized(_)),
            enabled: self.is_enabled_locked(&state),
            device_id: state.identity.as_ref().map(Identity::device_id),
            changed_at_utc: state.changed_at,
        })
    }

    // =========================================================================
    // TRANSITIONS (lock held)
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, TraceState> {
        // Transitions leave the state consistent before any call that could panic
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_locked(&self, state: &mut TraceState, mode: TraceMode) -> Result<()> {
        if state.active.is_some() {
            self.stop_locked(state);
        }

        self.try_initialize_locked(state);
        let paused = self.collaborators.settings.paused()?;

        let enabled = self.is_enabled_locked(state);
        let ctx = match state.session {
            SessionState::Initialized(ctx) if enabled && !paused => ctx,
            _ => {
                if state.identity.is_none() {
                    warn!(%mode, "Trace start requested without an identity");
                } else {
                    debug!(%mode, paused, "Trace start gated, staying stopped");
                }
                self.publish(state, false);
                return Ok(());
            }
        };

        let active = ActiveTrace {
            mode,
            rebroadcast_period: self.timing.rebroadcast_period(),
            scan_interval: self.timing.scan_interval(mode),
            ctx,
        };
        self.collaborators
            .broadcast
            .enable(active.rebroadcast_period, &ctx);
        self.collaborators
            .observation
            .enable(active.scan_interval, &ctx);

        state.mode = mode;
        state.active = Some(active);
        self.publish(state, true);
        info!(
            %mode,
            rebroadcast_period = ?active.rebroadcast_period,
            scan_interval = ?active.scan_interval,
            "Trace started"
        );
        Ok(())
    }

    fn stop_locked(&self, state: &mut TraceState) {
        let recorded = state.active.take();
        let teardown = match recorded {
            Some(active) => Some(active),
            None => self.stale_trace(state),
        };

        if let Some(active) = teardown {
            self.collaborators
                .broadcast
                .disable(active.rebroadcast_period, &active.ctx);
            self.collaborators
                .observation
                .disable(active.scan_interval, &active.ctx);
        }

        self.publish(state, false);
        if recorded.is_some() {
            info!(mode = %state.mode, "Trace stopped");
        }
    }

    /// Sessions enabled by an earlier process are not recorded here. When the
    /// radio is usable, a stop still disables the parameters of the last mode.
    fn stale_trace(&self, state: &TraceState) -> Option<ActiveTrace> {
        if !self.is_enabled_locked(state) {
            return None;
        }
        let SessionState::Initialized(ctx) = state.session else {
            return None;
        };
        debug!(mode = %state.mode, "Tearing down unrecorded radio session");
        Some(ActiveTrace {
            mode: state.mode,
            rebroadcast_period: self.timing.rebroadcast_period(),
            scan_interval: self.timing.scan_interval(state.mode),
            ctx,
        })
    }

    fn try_initialize_locked(&self, state: &mut TraceState) -> bool {
        if let Err(e) = self.collaborators.devices.init() {
            warn!(error = %e, "Device store initialisation failed");
            return matches!(state.session, SessionState::Initialized(_));
        }

        if matches!(state.session, SessionState::Initialized(_)) {
            return true;
        }
        let Some(identity) = state.identity.as_ref() else {
            debug!("No identity configured, skipping radio initialisation");
            return false;
        };

        let radio = &self.collaborators.radio;
        if !radio.is_present() {
            debug!("No radio hardware, skipping initialisation");
            return false;
        }
        if !radio.is_powered() {
            debug!("Radio powered off, initialisation deferred");
            return false;
        }
        // Location is not required for tracing
        debug!(
            location_enabled = radio.is_location_enabled(),
            "Radio available"
        );

        let ctx = TraceContext {
            service_id: identity.service_id(),
            device_id: identity.device_id(),
        };
        match radio.open_session(&ctx) {
            Ok(()) => {
                info!(service_id = %ctx.service_id, "Radio session initialised");
                state.session = SessionState::Initialized(ctx);
                true
            }
            Err(e) => {
                warn!(error = %e, "Radio session failed to open");
                false
            }
        }
    }

    fn is_enabled_locked(&self, state: &TraceState) -> bool {
        let radio = &self.collaborators.radio;
        state.identity.is_some()
            && radio.is_present()
            && radio.is_powered()
            && matches!(state.session, SessionState::Initialized(_))
    }

    fn release_session(&self, state: &mut TraceState) {
        if let SessionState::Initialized(ctx) = state.session {
            self.collaborators.radio.close_session();
            state.session = SessionState::Uninitialized;
            debug!(service_id = %ctx.service_id, "Radio session released");
        }
    }

    fn publish(&self, state: &mut TraceState, started: bool) {
        state.changed_at = Utc::now();
        self.started_tx.send_if_modified(|current| {
            let modified = *current != started;
            *current = started;
            modified
        });
    }
}

impl std::fmt::Debug for TraceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceCoordinator")
            .field("timing", &self.timing)
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{derive_device_id, derive_service_id};
    use crate::radio::mock::{MockRadio, RadioCall};
    use crate::radio::{MemoryDeviceStore, RadioError};
    use crate::settings::MemorySettingsStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Harness {
        radio: Arc<MockRadio>,
        settings: Arc<MemorySettingsStore>,
        coordinator: Arc<TraceCoordinator>,
    }

    fn harness_with(radio: MockRadio, settings: MemorySettingsStore) -> Harness {
        let radio = Arc::new(radio);
        let settings = Arc::new(settings);
        let collaborators = Collaborators::single_radio(
            radio.clone(),
            Arc::new(MemoryDeviceStore::new(16)),
            settings.clone(),
        );
        let coordinator =
            Arc::new(TraceCoordinator::new(TimingConfig::default(), collaborators).unwrap());
        Harness {
            radio,
            settings,
            coordinator,
        }
    }

    fn harness() -> Harness {
        harness_with(MockRadio::new(), MemorySettingsStore::with_secret("device-42"))
    }

    fn timing() -> TimingConfig {
        TimingConfig::default()
    }

    fn bg() -> Duration {
        timing().scan_interval(TraceMode::Background)
    }

    fn fg() -> Duration {
        timing().scan_interval(TraceMode::Foreground)
    }

    fn period() -> Duration {
        timing().rebroadcast_period()
    }

    fn count(calls: &[RadioCall], call: RadioCall) -> usize {
        calls.iter().filter(|c| **c == call).count()
    }

    #[test]
    fn test_start_background_enables_both_services() {
        let h = harness();
        h.coordinator.start(TraceMode::Background).unwrap();

        assert!(h.coordinator.is_started());
        assert_eq!(
            h.radio.calls(),
            vec![
                RadioCall::OpenSession,
                RadioCall::BroadcastEnable(period()),
                RadioCall::ObservationEnable(bg()),
            ]
        );
        let status = h.coordinator.status().unwrap();
        assert_eq!(status.phase, TracePhase::ActiveBackground);
        assert!(status.initialized);
        assert!(status.enabled);
    }

    #[test]
    fn test_restart_switches_mode_without_overlap() {
        let h = harness();
        h.coordinator.start(TraceMode::Background).unwrap();
        h.coordinator.start(TraceMode::Foreground).unwrap();

        let calls = h.radio.calls();
        assert_eq!(
            calls[1..],
            [
                RadioCall::BroadcastEnable(period()),
                RadioCall::ObservationEnable(bg()),
                RadioCall::BroadcastDisable(period()),
                RadioCall::ObservationDisable(bg()),
                RadioCall::BroadcastEnable(period()),
                RadioCall::ObservationEnable(fg()),
            ]
        );

        // Net exactly one enable per service, with the foreground parameters
        let net_broadcast = count(&calls, RadioCall::BroadcastEnable(period()))
            - count(&calls, RadioCall::BroadcastDisable(period()));
        assert_eq!(net_broadcast, 1);
        assert_eq!(h.radio.broadcasting().len(), 1);
        assert_eq!(
            h.radio.observing().into_iter().collect::<Vec<_>>(),
            vec![fg()]
        );
        assert_eq!(
            h.coordinator.status().unwrap().phase,
            TracePhase::ActiveForeground
        );
    }

    #[test]
    fn test_stop_disables_with_recorded_mode() {
        let h = harness();
        h.coordinator.start(TraceMode::Foreground).unwrap();
        h.radio.clear_calls();

        h.coordinator.stop();

        assert_eq!(
            h.radio.calls(),
            vec![
                RadioCall::BroadcastDisable(period()),
                RadioCall::ObservationDisable(fg()),
            ]
        );
        assert!(h.radio.observing().is_empty());
        assert!(h.radio.broadcasting().is_empty());
        assert!(!h.coordinator.is_started());
    }

    #[test]
    fn test_stop_tears_down_unrecorded_session() {
        let h = harness();
        assert!(h.coordinator.ensure_initialized());
        h.radio.clear_calls();

        h.coordinator.stop();

        // Default mode is background
        assert_eq!(
            h.radio.calls(),
            vec![
                RadioCall::BroadcastDisable(period()),
                RadioCall::ObservationDisable(bg()),
            ]
        );
    }

    #[test]
    fn test_pause_and_resume_restore_mode() {
        let h = harness();
        h.coordinator.start(TraceMode::Foreground).unwrap();

        h.coordinator.set_paused(true).unwrap();
        assert!(!h.coordinator.is_started());
        assert!(h.coordinator.paused().unwrap());
        assert!(h.settings.paused().unwrap());
        assert!(h.radio.observing().is_empty());

        // Starting while paused stays stopped
        h.coordinator.start(TraceMode::Background).unwrap();
        assert!(!h.coordinator.is_started());

        h.coordinator.set_paused(false).unwrap();
        let status = h.coordinator.status().unwrap();
        assert_eq!(status.phase, TracePhase::ActiveForeground);
        assert!(!status.paused);
        assert_eq!(
            h.radio.observing().into_iter().collect::<Vec<_>>(),
            vec![fg()]
        );
    }

    #[test]
    fn test_start_without_identity_stays_stopped() {
        let h = harness_with(MockRadio::new(), MemorySettingsStore::new());
        h.coordinator.start(TraceMode::Foreground).unwrap();

        assert!(!h.coordinator.is_started());
        assert!(!h.coordinator.is_enabled());
        assert!(h.radio.calls().is_empty());
        assert_eq!(h.coordinator.device_id(), None);
        assert!(matches!(
            h.coordinator.service_id(),
            Err(TraceError::NotInitialized)
        ));
    }

    #[test]
    fn test_clearing_secret_disables_and_stops() {
        let h = harness();
        h.coordinator.start(TraceMode::Background).unwrap();

        h.coordinator.set_secret(None).unwrap();

        assert!(!h.coordinator.is_enabled());
        assert!(!h.coordinator.is_started());
        assert!(!h.coordinator.ensure_initialized());
        assert_eq!(h.coordinator.secret().unwrap(), None);
        assert_eq!(h.radio.session(), None);
        assert!(h.radio.broadcasting().is_empty());
        assert!(h.radio.observing().is_empty());
    }

    #[test]
    fn test_setting_same_secret_twice_is_stable() {
        let h = harness_with(MockRadio::new(), MemorySettingsStore::new());

        h.coordinator.set_secret(Some("device-42")).unwrap();
        let device_id = h.coordinator.device_id();
        let service_id = h.coordinator.service_id().unwrap();

        h.coordinator.set_secret(Some("device-42")).unwrap();
        assert_eq!(h.coordinator.device_id(), device_id);
        assert_eq!(h.coordinator.service_id().unwrap(), service_id);

        assert_eq!(device_id, Some(derive_device_id("device-42")));
        assert_eq!(service_id, derive_service_id("device-42"));
        assert_ne!(device_id, Some(service_id));
        assert_eq!(count(&h.radio.calls(), RadioCall::OpenSession), 1);
    }

    #[test]
    fn test_changing_secret_stops_and_rescopes_session() {
        let h = harness();
        h.coordinator.start(TraceMode::Foreground).unwrap();
        let old_service = h.coordinator.service_id().unwrap();

        h.coordinator.set_secret(Some("device-43")).unwrap();

        assert!(!h.coordinator.is_started());
        assert!(h.radio.observing().is_empty());
        let session = h.radio.session().unwrap();
        assert_eq!(session.service_id, derive_service_id("device-43"));
        assert_ne!(session.service_id, old_service);
        assert_eq!(h.settings.secret().unwrap().as_deref(), Some("device-43"));

        let calls = h.radio.calls();
        let close = calls.iter().position(|c| *c == RadioCall::CloseSession).unwrap();
        let disable = calls
            .iter()
            .position(|c| *c == RadioCall::ObservationDisable(fg()))
            .unwrap();
        assert!(disable < close);
        assert_eq!(calls.last(), Some(&RadioCall::OpenSession));
    }

    #[test]
    fn test_is_enabled_has_no_side_effects() {
        let h = harness();
        assert!(!h.coordinator.is_enabled());
        assert!(h.radio.calls().is_empty());

        assert!(h.coordinator.ensure_initialized());
        assert!(h.coordinator.is_enabled());
    }

    #[test]
    fn test_powered_off_radio_initialises_lazily() {
        let radio = MockRadio::new();
        radio.set_powered(false);
        let h = harness_with(radio, MemorySettingsStore::with_secret("device-42"));

        h.coordinator.start(TraceMode::Background).unwrap();
        assert!(!h.coordinator.is_started());
        assert!(!h.coordinator.status().unwrap().initialized);

        h.radio.set_powered(true);
        assert!(h.coordinator.ensure_initialized());
        h.coordinator.start(TraceMode::Background).unwrap();
        assert!(h.coordinator.is_started());
    }

    #[test]
    fn test_absent_radio_stays_stopped() {
        let h = harness_with(MockRadio::absent(), MemorySettingsStore::with_secret("x"));
        assert!(!h.coordinator.try_initialize());
        h.coordinator.start(TraceMode::Foreground).unwrap();
        assert!(!h.coordinator.is_started());
        assert!(h.radio.calls().is_empty());
    }

    #[test]
    fn test_session_failure_is_retried() {
        let radio = MockRadio::new();
        radio.set_fail_session(true);
        let h = harness_with(radio, MemorySettingsStore::with_secret("device-42"));

        assert!(!h.coordinator.try_initialize());
        h.radio.set_fail_session(false);
        assert!(h.coordinator.try_initialize());
        // Idempotent once initialised
        assert!(h.coordinator.try_initialize());
        assert_eq!(count(&h.radio.calls(), RadioCall::OpenSession), 1);
    }

    #[test]
    fn test_radio_removed_after_initialisation_disables_gate() {
        let h = harness();
        assert!(h.coordinator.ensure_initialized());

        h.radio.set_present(false);
        assert!(!h.coordinator.is_enabled());
        h.coordinator.start(TraceMode::Background).unwrap();
        assert!(!h.coordinator.is_started());
        assert!(h.radio.broadcasting().is_empty());

        h.radio.set_present(true);
        h.coordinator.start(TraceMode::Background).unwrap();
        assert!(h.coordinator.is_started());
    }

    struct FlakyDeviceStore {
        fail: AtomicBool,
    }

    impl DeviceStore for FlakyDeviceStore {
        fn init(&self) -> std::result::Result<(), RadioError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(RadioError::StoreFailed {
                    message: "database locked".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn record(&self, _sighting: crate::radio::Sighting) {}
    }

    #[test]
    fn test_device_store_failure_defers_initialisation() {
        let radio = Arc::new(MockRadio::new());
        let devices = Arc::new(FlakyDeviceStore {
            fail: AtomicBool::new(true),
        });
        let collaborators = Collaborators::single_radio(
            radio.clone(),
            devices.clone(),
            Arc::new(MemorySettingsStore::with_secret("device-42")),
        );
        let coordinator = TraceCoordinator::new(timing(), collaborators).unwrap();

        assert!(!coordinator.try_initialize());
        coordinator.start(TraceMode::Foreground).unwrap();
        assert!(!coordinator.is_started());
        assert!(radio.session().is_none());

        devices.fail.store(false, Ordering::SeqCst);
        assert!(coordinator.try_initialize());
        coordinator.start(TraceMode::Foreground).unwrap();
        assert!(coordinator.is_started());
    }

    #[test]
    fn test_radio_powered_off_disables_gate() {
        let h = harness();
        assert!(h.coordinator.ensure_initialized());
        h.radio.set_powered(false);
        assert!(!h.coordinator.is_enabled());
        h.coordinator.start(TraceMode::Foreground).unwrap();
        assert!(!h.coordinator.is_started());
    }

    #[test]
    fn test_started_signal_is_published() {
        let h = harness();
        let mut rx = h.coordinator.subscribe();
        assert!(!*rx.borrow_and_update());

        h.coordinator.start(TraceMode::Background).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        h.coordinator.set_paused(true).unwrap();
        tokio_test::block_on(rx.changed()).unwrap();
        assert!(!*rx.borrow());
    }

    #[test]
    fn test_estimate_distance_uses_configured_factor() {
        let h = harness();
        assert_eq!(h.coordinator.estimate_distance(-60, -1), None);
        let d = h.coordinator.estimate_distance(40, -60).unwrap();
        assert!((d - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_concurrent_transitions_never_overlap() {
        let h = harness();
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let coordinator = h.coordinator.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        match (i + j) % 4 {
                            0 => coordinator.start(TraceMode::Background).unwrap(),
                            1 => coordinator.start(TraceMode::Foreground).unwrap(),
                            2 => coordinator.stop(),
                            _ => {
                                let status = coordinator.status().unwrap();
                                assert_eq!(status.started, status.phase.is_started());
                            }
                        }
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        h.coordinator.stop();

        // Advertising is never enabled twice without a disable in between
        let mut running = false;
        for call in h.radio.calls() {
            match call {
                RadioCall::BroadcastEnable(_) => {
                    assert!(!running, "overlapping broadcast sessions");
                    running = true;
                }
                RadioCall::BroadcastDisable(_) => running = false,
                _ => {}
            }
        }
        assert!(h.radio.broadcasting().is_empty());
        assert!(h.radio.observing().is_empty());
    }
}

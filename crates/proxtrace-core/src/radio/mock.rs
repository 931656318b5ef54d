//! Simulated radio that records every call.
//!
//! One [`MockRadio`] implements all three radio traits. Sessions are tracked
//! by their timing key exactly like a real radio: a disable with a different
//! period or interval than the matching enable leaves the session running.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{BroadcastService, ObservationService, RadioAdapter, RadioError, TraceContext};

/// A recorded radio call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioCall {
    /// [`RadioAdapter::open_session`]
    OpenSession,
    /// [`RadioAdapter::close_session`]
    CloseSession,
    /// [`BroadcastService::enable`]
    BroadcastEnable(Duration),
    /// [`BroadcastService::disable`]
    BroadcastDisable(Duration),
    /// [`ObservationService::enable`]
    ObservationEnable(Duration),
    /// [`ObservationService::disable`]
    ObservationDisable(Duration),
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RadioCall>,
    broadcasting: HashSet<Duration>,
    observing: HashSet<Duration>,
    session: Option<TraceContext>,
}

/// Call-recording radio.
#[derive(Debug)]
pub struct MockRadio {
    present: AtomicBool,
    powered: AtomicBool,
    location: AtomicBool,
    fail_session: AtomicBool,
    state: Mutex<MockState>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    /// A present, powered radio.
    #[must_use]
    pub fn new() -> Self {
        Self {
            present: AtomicBool::new(true),
            powered: AtomicBool::new(true),
            location: AtomicBool::new(false),
            fail_session: AtomicBool::new(false),
            state: Mutex::new(MockState::default()),
        }
    }

    /// A radio with no hardware.
    #[must_use]
    pub fn absent() -> Self {
        let radio = Self::new();
        radio.present.store(false, Ordering::SeqCst);
        radio.powered.store(false, Ordering::SeqCst);
        radio
    }

    /// Simulate hardware appearing or disappearing.
    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    /// Simulate the user toggling the radio.
    pub fn set_powered(&self, powered: bool) {
        self.powered.store(powered, Ordering::SeqCst);
    }

    /// Make subsequent `open_session` calls fail.
    pub fn set_fail_session(&self, fail: bool) {
        self.fail_session.store(fail, Ordering::SeqCst);
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RadioCall> {
        self.with(|s| s.calls.clone())
    }

    /// Forget recorded calls, keeping session state.
    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    /// Periods of running advertising sessions.
    #[must_use]
    pub fn broadcasting(&self) -> HashSet<Duration> {
        self.with(|s| s.broadcasting.clone())
    }

    /// Intervals of running scanning sessions.
    #[must_use]
    pub fn observing(&self) -> HashSet<Duration> {
        self.with(|s| s.observing.clone())
    }

    /// Context of the open session, if any.
    #[must_use]
    pub fn session(&self) -> Option<TraceContext> {
        self.with(|s| s.session)
    }

    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl RadioAdapter for MockRadio {
    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn is_location_enabled(&self) -> bool {
        self.location.load(Ordering::SeqCst)
    }

    fn open_session(&self, ctx: &TraceContext) -> Result<(), RadioError> {
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(RadioError::SessionFailed {
                message: "simulated failure".to_string(),
            });
        }
        self.with(|s| {
            s.calls.push(RadioCall::OpenSession);
            s.session = Some(*ctx);
        });
        Ok(())
    }

    fn close_session(&self) {
        self.with(|s| {
            s.calls.push(RadioCall::CloseSession);
            s.session = None;
        });
    }
}

impl BroadcastService for MockRadio {
    fn enable(&self, period: Duration, _ctx: &TraceContext) {
        debug!(?period, "simulated broadcast enable");
        self.with(|s| {
            s.calls.push(RadioCall::BroadcastEnable(period));
            s.broadcasting.insert(period);
        });
    }

    fn disable(&self, period: Duration, _ctx: &TraceContext) {
        debug!(?period, "simulated broadcast disable");
        self.with(|s| {
            s.calls.push(RadioCall::BroadcastDisable(period));
            s.broadcasting.remove(&period);
        });
    }
}

impl ObservationService for MockRadio {
    fn enable(&self, interval: Duration, _ctx: &TraceContext) {
        debug!(?interval, "simulated observation enable");
        self.with(|s| {
            s.calls.push(RadioCall::ObservationEnable(interval));
            s.observing.insert(interval);
        });
    }

    fn disable(&self, interval: Duration, _ctx: &TraceContext) {
        debug!(?interval, "simulated observation disable");
        self.with(|s| {
            s.calls.push(RadioCall::ObservationDisable(interval));
            s.observing.remove(&interval);
        });
    }
}

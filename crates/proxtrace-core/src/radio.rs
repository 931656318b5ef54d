//! Contracts for the platform radio collaborators.
//!
//! The coordinator drives advertising and scanning only through the traits in
//! this module. Calls are fire-and-forget: implementations may start
//! background work, but must return promptly and never block on I/O.
//!
//! Enable and disable are keyed by their timing parameter. A disable whose
//! period or interval differs from the one used to enable does not tear the
//! session down, so callers must disable with exactly the parameters they
//! enabled with.
//!
//! Implementations:
//! - [`bluez`] - Linux BLE via BlueZ (`bluetooth` feature)
//! - [`mock`] - Call-recording radio for tests and simulation (`mock-bluetooth` feature)

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[cfg(feature = "bluetooth")]
pub mod bluez;
#[cfg(any(test, feature = "mock-bluetooth"))]
pub mod mock;

/// Errors raised by radio collaborators.
///
/// The coordinator absorbs these into its state; they are logged, not
/// returned to callers.
#[derive(Debug, Clone, Error)]
pub enum RadioError {
    /// No adapter is present.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// The adapter is powered off.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// Opening the advertiser, scanner or local server failed.
    #[error("Failed to open radio session: {message}")]
    SessionFailed {
        /// Error details.
        message: String,
    },

    /// The device store could not be prepared.
    #[error("Device store failed: {message}")]
    StoreFailed {
        /// Error details.
        message: String,
    },
}

/// Identity scope handed to every radio call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceContext {
    /// Identifier of the advertised service.
    pub service_id: Uuid,
    /// Our own device identifier, served to peers that connect.
    pub device_id: Uuid,
}

/// Owns radio advertising.
pub trait BroadcastService: Send + Sync {
    /// Start advertising, refreshing the advertisement every `period`.
    fn enable(&self, period: Duration, ctx: &TraceContext);

    /// Stop the advertising session started with `period`.
    fn disable(&self, period: Duration, ctx: &TraceContext);
}

/// Owns radio scanning.
pub trait ObservationService: Send + Sync {
    /// Start scanning for peers every `interval`.
    fn enable(&self, interval: Duration, ctx: &TraceContext);

    /// Stop the scanning session started with `interval`.
    fn disable(&self, interval: Duration, ctx: &TraceContext);
}

/// Platform radio capabilities and session resources.
pub trait RadioAdapter: Send + Sync {
    /// Whether radio hardware exists.
    fn is_present(&self) -> bool;

    /// Whether the radio is powered on.
    fn is_powered(&self) -> bool;

    /// Whether location services are on. Queried for diagnostics only.
    fn is_location_enabled(&self) -> bool;

    /// Acquire the advertiser, scanner and local server for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource cannot be acquired.
    fn open_session(&self, ctx: &TraceContext) -> Result<(), RadioError>;

    /// Release whatever [`RadioAdapter::open_session`] acquired.
    fn close_session(&self);
}

/// A peer seen while scanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "AA:BB:CC:DD:EE:FF",
    "rssi_dbm": -62,
    "reference_power_dbm": -59,
    "distance_cm": 141.2,
    "seen_at_utc": "2026-03-01T12:00:00Z"
}))]
pub struct Sighting {
    /// Radio address of the peer.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// Received signal strength in dBm.
    #[schema(example = -62)]
    pub rssi_dbm: i16,

    /// Advertised reference power in dBm, `-1` when unknown.
    #[schema(example = -59)]
    pub reference_power_dbm: i16,

    /// Estimated distance in centimetres, if the reference power was known.
    pub distance_cm: Option<f64>,

    /// When the peer was seen.
    pub seen_at_utc: DateTime<Utc>,
}

/// Storage for peers observed while scanning.
pub trait DeviceStore: Send + Sync {
    /// Prepare the store. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be prepared.
    fn init(&self) -> Result<(), RadioError>;

    /// Record a sighting.
    fn record(&self, sighting: Sighting);
}

/// Bounded in-memory [`DeviceStore`] keeping the most recent sightings.
#[derive(Debug)]
pub struct MemoryDeviceStore {
    capacity: usize,
    sightings: Mutex<VecDeque<Sighting>>,
}

impl MemoryDeviceStore {
    /// Create a store holding at most `capacity` sightings.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sightings: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Recent sightings, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<Sighting> {
        let sightings = self.sightings.lock().unwrap_or_else(PoisonError::into_inner);
        sightings.iter().rev().take(limit).cloned().collect()
    }

    /// Number of stored sightings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sightings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no sightings are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn init(&self) -> Result<(), RadioError> {
        Ok(())
    }

    fn record(&self, sighting: Sighting) {
        let mut sightings = self.sightings.lock().unwrap_or_else(PoisonError::into_inner);
        if sightings.len() == self.capacity {
            sightings.pop_front();
        }
        sightings.push_back(sighting);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(rssi_dbm: i16) -> Sighting {
        Sighting {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            rssi_dbm,
            reference_power_dbm: -59,
            distance_cm: None,
            seen_at_utc: Utc::now(),
        }
    }

    #[test]
    fn test_memory_store_is_bounded() {
        let store = MemoryDeviceStore::new(2);
        assert!(store.init().is_ok());
        assert!(store.is_empty());

        store.record(sighting(-40));
        store.record(sighting(-50));
        store.record(sighting(-60));

        assert_eq!(store.len(), 2);
        let recent = store.recent(10);
        assert_eq!(recent[0].rssi_dbm, -60);
        assert_eq!(recent[1].rssi_dbm, -50);
    }

    #[test]
    fn test_recent_respects_limit() {
        let store = MemoryDeviceStore::new(8);
        for rssi in -70..-60 {
            store.record(sighting(rssi));
        }
        assert_eq!(store.recent(3).len(), 3);
    }

    #[test]
    fn test_sighting_serialization() {
        let json = serde_json::to_string(&sighting(-62)).unwrap();
        assert!(json.contains("\"rssi_dbm\":-62"));
        assert!(json.contains("\"distance_cm\":null"));
    }
}

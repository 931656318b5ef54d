//! # proxtrace-core
//!
//! Core logic for proxtrace, a Bluetooth Low Energy proximity-exposure tracer.
//!
//! A tracing device periodically advertises a pseudonymous service identifier
//! and scans for peers advertising the same identifier, turning each received
//! signal strength into a rough distance estimate.
//!
//! This crate provides:
//! - Deterministic identity derivation from an opaque secret
//! - RSSI-based distance estimation
//! - The trace coordinator that decides when advertising and scanning run
//! - Configuration and persisted settings
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`identity`] - Secret to device/service identifier derivation
//! - [`distance`] - Signal strength to distance estimation
//! - [`coordinator`] - The trace lifecycle state machine
//! - [`radio`] - Contracts for the platform radio collaborators, plus reference implementations
//! - [`settings`] - Persisted paused flag and identity secret
//! - [`config`] - Layered configuration loading and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared status types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod distance;
pub mod error;
pub mod identity;
pub mod radio;
pub mod settings;
pub mod types;

// Re-export primary types for convenience
pub use config::{
    default_config_path, default_log_dir, ConfigError, ConfigResult, RadioConfig, ServerConfig,
    StorageConfig, TimingConfig, TraceConfig,
};
pub use coordinator::{Collaborators, TraceCoordinator};
pub use distance::{estimate_distance, DistanceEstimator, UNKNOWN_REFERENCE_POWER};
pub use error::{Result, TraceError};
pub use identity::{derive_device_id, derive_service_id, Identity};
#[cfg(feature = "bluetooth")]
pub use radio::bluez::BluezRadio;
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use radio::mock::{MockRadio, RadioCall};
pub use radio::{
    BroadcastService, DeviceStore, MemoryDeviceStore, ObservationService, RadioAdapter,
    RadioError, Sighting, TraceContext,
};
pub use settings::{
    default_data_dir, FileSettingsStore, MemorySettingsStore, SettingsError, SettingsStore,
};
pub use types::{TraceMode, TracePhase, TraceStatus};

//! Application state shared across handlers.
//!
//! This is the composition root: it picks the radio, opens the settings store
//! and builds the single [`TraceCoordinator`] for the process.

use std::sync::Arc;
use std::time::Instant;

use proxtrace_core::{
    Collaborators, DeviceStore, FileSettingsStore, MemoryDeviceStore, MockRadio, SettingsStore,
    TraceConfig, TraceCoordinator,
};
use tracing::info;

/// Handle passed to every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
pub struct AppState {
    /// The process-wide trace coordinator.
    pub coordinator: Arc<TraceCoordinator>,

    /// Peers recorded by the observation service.
    pub sightings: Arc<MemoryDeviceStore>,

    /// When the server started.
    pub started_at: Instant,
}

impl AppState {
    /// Build state from configuration, using BlueZ when it is compiled in and
    /// not disabled by `radio.simulate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store cannot be read.
    pub async fn new(config: &TraceConfig) -> anyhow::Result<SharedState> {
        let sightings = Arc::new(MemoryDeviceStore::new(config.radio.max_sightings));
        let data_dir = config.storage.data_dir();
        info!(data_dir = %data_dir.display(), "Opening settings store");
        let settings: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::new(&data_dir));

        let collaborators = radio_collaborators(config, sightings.clone(), settings).await;
        Self::assemble(config, collaborators, sightings)
    }

    /// Build state around a simulated radio. The radio is returned so callers
    /// can toggle it and inspect its calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store cannot be read.
    pub fn simulated(
        config: &TraceConfig,
        settings: Arc<dyn SettingsStore>,
    ) -> anyhow::Result<(SharedState, Arc<MockRadio>)> {
        let sightings = Arc::new(MemoryDeviceStore::new(config.radio.max_sightings));
        let radio = Arc::new(MockRadio::new());
        let collaborators = Collaborators::single_radio(radio.clone(), sightings.clone(), settings);
        Ok((Self::assemble(config, collaborators, sightings)?, radio))
    }

    fn assemble(
        config: &TraceConfig,
        collaborators: Collaborators,
        sightings: Arc<MemoryDeviceStore>,
    ) -> anyhow::Result<SharedState> {
        let coordinator = TraceCoordinator::new(config.timing, collaborators)?;
        Ok(Arc::new(Self {
            coordinator: Arc::new(coordinator),
            sightings,
            started_at: Instant::now(),
        }))
    }

    /// Seconds since the server started.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(feature = "bluetooth")]
async fn radio_collaborators(
    config: &TraceConfig,
    sightings: Arc<MemoryDeviceStore>,
    settings: Arc<dyn SettingsStore>,
) -> Collaborators {
    let devices: Arc<dyn DeviceStore> = sightings;
    if config.radio.simulate {
        info!("Using the simulated radio");
        return Collaborators::single_radio(Arc::new(MockRadio::new()), devices, settings);
    }

    let radio = proxtrace_core::BluezRadio::connect(
        devices.clone(),
        proxtrace_core::DistanceEstimator::new(config.timing.environmental_factor),
        config.radio.scan_window(),
    )
    .await;
    Collaborators::single_radio(Arc::new(radio), devices, settings)
}

#[cfg(not(feature = "bluetooth"))]
#[allow(clippy::unused_async)]
async fn radio_collaborators(
    config: &TraceConfig,
    sightings: Arc<MemoryDeviceStore>,
    settings: Arc<dyn SettingsStore>,
) -> Collaborators {
    if !config.radio.simulate {
        tracing::warn!("Built without Bluetooth support, using the simulated radio");
    }
    let devices: Arc<dyn DeviceStore> = sightings;
    Collaborators::single_radio(Arc::new(MockRadio::new()), devices, settings)
}

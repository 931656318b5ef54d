//! Linux BLE radio backed by BlueZ.
//!
//! - The session serves our device id from a local GATT service scoped to the
//!   service id.
//! - Advertising re-registers an advertisement for the service id once per
//!   rebroadcast period.
//! - Scanning runs a discovery burst once per interval and records every peer
//!   that advertises the same service id.
//!
//! Each advertising and scanning session is a tokio task keyed by its period
//! or interval; disabling aborts the task with the matching key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bluer::adv::Advertisement;
use bluer::gatt::local::{Application, Characteristic, CharacteristicRead, Service};
use bluer::{Adapter, AdapterEvent, AdapterProperty, Address, Session};
use chrono::Utc;
use futures::{pin_mut, StreamExt};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    BroadcastService, DeviceStore, ObservationService, RadioAdapter, RadioError, Sighting,
    TraceContext,
};
use crate::distance::{DistanceEstimator, UNKNOWN_REFERENCE_POWER};

/// Characteristic serving the device id inside our GATT service.
pub const DEVICE_ID_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x4a1f_08d2_6e53_4c77_b0a9_93e1_5d2c_7f18);

/// Local name carried in advertisements.
const LOCAL_NAME: &str = "proxtrace";

type TaskMap = Mutex<HashMap<Duration, JoinHandle<()>>>;

/// BlueZ-backed radio.
pub struct BluezRadio {
    runtime: Handle,
    _session: Option<Session>,
    adapter: Option<Adapter>,
    powered: Arc<AtomicBool>,
    devices: Arc<dyn DeviceStore>,
    estimator: DistanceEstimator,
    scan_window: Duration,
    gatt: Mutex<Option<JoinHandle<()>>>,
    advertisers: TaskMap,
    scanners: TaskMap,
}

impl BluezRadio {
    /// Connect to BlueZ and pick the default adapter.
    ///
    /// Never fails: without a reachable adapter the radio reports itself as
    /// absent and the coordinator stays stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(
        devices: Arc<dyn DeviceStore>,
        estimator: DistanceEstimator,
        scan_window: Duration,
    ) -> Self {
        let powered = Arc::new(AtomicBool::new(false));
        let runtime = Handle::current();

        let (session, adapter) = match open_adapter().await {
            Ok((session, adapter)) => (Some(session), Some(adapter)),
            Err(e) => {
                warn!(error = %e, "Bluetooth adapter unavailable");
                (None, None)
            }
        };

        if let Some(adapter) = &adapter {
            powered.store(adapter.is_powered().await.unwrap_or(false), Ordering::SeqCst);
            spawn_power_watch(&runtime, adapter.clone(), powered.clone());
            info!(
                adapter = adapter.name(),
                powered = powered.load(Ordering::SeqCst),
                "Using Bluetooth adapter"
            );
        }

        Self {
            runtime,
            _session: session,
            adapter,
            powered,
            devices,
            estimator,
            scan_window,
            gatt: Mutex::new(None),
            advertisers: Mutex::new(HashMap::new()),
            scanners: Mutex::new(HashMap::new()),
        }
    }

    fn spawn_keyed(&self, tasks: &TaskMap, key: Duration, task: JoinHandle<()>) {
        let mut tasks = tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = tasks.insert(key, task) {
            previous.abort();
        }
    }

    fn abort_keyed(tasks: &TaskMap, key: Duration) -> bool {
        let mut tasks = tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.remove(&key).map(|task| task.abort()).is_some()
    }
}

impl Drop for BluezRadio {
    fn drop(&mut self) {
        for tasks in [&self.advertisers, &self.scanners] {
            let mut tasks = tasks.lock().unwrap_or_else(PoisonError::into_inner);
            for (_, task) in tasks.drain() {
                task.abort();
            }
        }
        if let Some(task) = self
            .gatt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

impl RadioAdapter for BluezRadio {
    fn is_present(&self) -> bool {
        self.adapter.is_some()
    }

    fn is_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn is_location_enabled(&self) -> bool {
        // BlueZ scanning does not depend on location services
        true
    }

    fn open_session(&self, ctx: &TraceContext) -> Result<(), RadioError> {
        let adapter = self.adapter.clone().ok_or(RadioError::AdapterNotFound)?;
        if !self.is_powered() {
            return Err(RadioError::AdapterPoweredOff);
        }

        let app = device_id_application(ctx);
        let service_id = ctx.service_id;
        let task = self.runtime.spawn(async move {
            match adapter.serve_gatt_application(app).await {
                Ok(handle) => {
                    debug!(%service_id, "GATT service registered");
                    let _handle = handle;
                    std::future::pending::<()>().await;
                }
                Err(e) => warn!(error = %e, %service_id, "GATT service registration failed"),
            }
        });

        let mut gatt = self.gatt.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = gatt.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn close_session(&self) {
        if let Some(task) = self
            .gatt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
            debug!("GATT service unregistered");
        }
    }
}

impl BroadcastService for BluezRadio {
    fn enable(&self, period: Duration, ctx: &TraceContext) {
        let Some(adapter) = self.adapter.clone() else {
            warn!("Broadcast requested without an adapter");
            return;
        };
        let ctx = *ctx;
        let task = self.runtime.spawn(async move {
            loop {
                let registration = match adapter.advertise(advertisement(&ctx)).await {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!(error = %e, "Advertisement registration failed");
                        None
                    }
                };
                tokio::time::sleep(period).await;
                drop(registration);
            }
        });
        self.spawn_keyed(&self.advertisers, period, task);
        debug!(?period, "Broadcast enabled");
    }

    fn disable(&self, period: Duration, _ctx: &TraceContext) {
        if Self::abort_keyed(&self.advertisers, period) {
            debug!(?period, "Broadcast disabled");
        } else {
            debug!(?period, "No broadcast session with this period");
        }
    }
}

impl ObservationService for BluezRadio {
    fn enable(&self, interval: Duration, ctx: &TraceContext) {
        let Some(adapter) = self.adapter.clone() else {
            warn!("Observation requested without an adapter");
            return;
        };
        let ctx = *ctx;
        let devices = self.devices.clone();
        let estimator = self.estimator;
        let window = self.scan_window;
        let task = self.runtime.spawn(async move {
            loop {
                match scan_once(&adapter, &ctx, window, estimator, devices.as_ref()).await {
                    Ok(found) => debug!(found, "Scan burst complete"),
                    Err(e) => warn!(error = %e, "Scan burst failed"),
                }
                tokio::time::sleep(interval).await;
            }
        });
        self.spawn_keyed(&self.scanners, interval, task);
        debug!(?interval, "Observation enabled");
    }

    fn disable(&self, interval: Duration, _ctx: &TraceContext) {
        if Self::abort_keyed(&self.scanners, interval) {
            debug!(?interval, "Observation disabled");
        } else {
            debug!(?interval, "No observation session with this interval");
        }
    }
}

async fn open_adapter() -> bluer::Result<(Session, Adapter)> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    Ok((session, adapter))
}

fn spawn_power_watch(runtime: &Handle, adapter: Adapter, powered: Arc<AtomicBool>) {
    runtime.spawn(async move {
        let events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Cannot watch adapter power state");
                return;
            }
        };
        pin_mut!(events);
        while let Some(event) = events.next().await {
            if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(on)) = event {
                powered.store(on, Ordering::SeqCst);
                info!(powered = on, "Bluetooth adapter power changed");
            }
        }
    });
}

fn advertisement(ctx: &TraceContext) -> Advertisement {
    Advertisement {
        advertisement_type: bluer::adv::Type::Peripheral,
        service_uuids: std::iter::once(ctx.service_id).collect(),
        discoverable: Some(true),
        local_name: Some(LOCAL_NAME.to_string()),
        ..Default::default()
    }
}

fn device_id_application(ctx: &TraceContext) -> Application {
    let value = ctx.device_id.as_bytes().to_vec();
    Application {
        services: vec![Service {
            uuid: ctx.service_id,
            primary: true,
            characteristics: vec![Characteristic {
                uuid: DEVICE_ID_CHARACTERISTIC,
                read: Some(CharacteristicRead {
                    read: true,
                    fun: Box::new(move |_request| {
                        let value = value.clone();
                        Box::pin(async move { Ok(value) })
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

async fn scan_once(
    adapter: &Adapter,
    ctx: &TraceContext,
    window: Duration,
    estimator: DistanceEstimator,
    devices: &dyn DeviceStore,
) -> bluer::Result<usize> {
    let events = adapter.discover_devices().await?;
    pin_mut!(events);
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);

    let mut recorded = 0;
    loop {
        tokio::select! {
            () = &mut deadline => break,
            event = events.next() => {
                let Some(event) = event else { break };
                if let AdapterEvent::DeviceAdded(address) = event {
                    let result = read_sighting(adapter, address, ctx, estimator).await;
                    if record_peer(result, address, devices) {
                        recorded += 1;
                    }
                }
            }
        }
    }
    Ok(recorded)
}

/// Record one peer's sighting. A peer whose properties cannot be read, for
/// example because it vanished after being reported, is skipped.
fn record_peer<E: std::fmt::Display>(
    result: Result<Option<Sighting>, E>,
    address: impl std::fmt::Display,
    devices: &dyn DeviceStore,
) -> bool {
    match result {
        Ok(Some(sighting)) => {
            devices.record(sighting);
            true
        }
        Ok(None) => false,
        Err(e) => {
            debug!(error = %e, %address, "Skipping peer");
            false
        }
    }
}

async fn read_sighting(
    adapter: &Adapter,
    address: Address,
    ctx: &TraceContext,
    estimator: DistanceEstimator,
) -> bluer::Result<Option<Sighting>> {
    let device = adapter.device(address)?;
    let uuids = device.uuids().await?.unwrap_or_default();
    if !uuids.contains(&ctx.service_id) {
        return Ok(None);
    }
    let Some(rssi) = device.rssi().await? else {
        return Ok(None);
    };
    let reference_power = device.tx_power().await?.unwrap_or(UNKNOWN_REFERENCE_POWER);

    Ok(Some(Sighting {
        address: address.to_string(),
        rssi_dbm: rssi,
        reference_power_dbm: reference_power,
        distance_cm: estimator.estimate(rssi, reference_power),
        seen_at_utc: Utc::now(),
    }))
}

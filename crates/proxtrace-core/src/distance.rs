//! Signal strength to distance estimation.
//!
//! Uses a log-distance path loss model scaled to centimetres:
//!
//! ```text
//! distance = 100 * 10 ^ ((-reference_power - rssi) / (10 * environmental_factor))
//! ```
//!
//! A single reading is noisy. Callers should smooth several samples before
//! deciding that two devices were in contact.

/// Reference power reported when the transmitter did not advertise one.
pub const UNKNOWN_REFERENCE_POWER: i16 = -1;

/// Estimate the distance to a transmitter.
///
/// Returns `None` when `reference_power` is [`UNKNOWN_REFERENCE_POWER`]. The
/// result is not clamped.
///
/// # Arguments
///
/// * `rssi` - Received signal strength in dBm
/// * `reference_power` - Expected signal strength at the reference distance, in dBm
/// * `environmental_factor` - Attenuation exponent of the medium
#[must_use]
pub fn estimate_distance(rssi: i16, reference_power: i16, environmental_factor: f64) -> Option<f64> {
    if reference_power == UNKNOWN_REFERENCE_POWER {
        return None;
    }
    let exponent = (-f64::from(reference_power) - f64::from(rssi)) / (10.0 * environmental_factor);
    Some(100.0 * 10f64.powf(exponent))
}

/// Distance estimator bound to a configured environmental factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimator {
    environmental_factor: f64,
}

impl DistanceEstimator {
    /// Create an estimator for the given attenuation exponent.
    #[must_use]
    pub const fn new(environmental_factor: f64) -> Self {
        Self {
            environmental_factor,
        }
    }

    /// The attenuation exponent in use.
    #[must_use]
    pub const fn environmental_factor(&self) -> f64 {
        self.environmental_factor
    }

    /// See [`estimate_distance`].
    #[must_use]
    pub fn estimate(&self, rssi: i16, reference_power: i16) -> Option<f64> {
        estimate_distance(rssi, reference_power, self.environmental_factor)
    }
}

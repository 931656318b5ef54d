//! Pseudonymous identity derivation.
//!
//! A device is configured with an opaque secret. Two identifiers are derived
//! from the secret's bytes with name-based (version 5) UUIDs:
//!
//! - the **device id**, the pseudonym other devices learn about us by
//! - the **service id**, which scopes the advertised radio service
//!
//! Each identifier lives in its own namespace, so the same secret never yields
//! the same UUID for both.

use uuid::Uuid;

/// Namespace for device identifiers.
const DEVICE_NAMESPACE: Uuid = Uuid::from_u128(0x6d2c_1f0e_43a8_4b1c_9e35_0b7d_52a1_c9f4);

/// Namespace for radio service identifiers.
const SERVICE_NAMESPACE: Uuid = Uuid::from_u128(0x1b94_e7c2_5f60_4d3a_a8e1_7c43_0e9d_26b5);

/// Derive the device identifier for a secret.
#[must_use]
pub fn derive_device_id(secret: &str) -> Uuid {
    Uuid::new_v5(&DEVICE_NAMESPACE, secret.as_bytes())
}

/// Derive the radio service identifier for a secret.
#[must_use]
pub fn derive_service_id(secret: &str) -> Uuid {
    Uuid::new_v5(&SERVICE_NAMESPACE, secret.as_bytes())
}

/// A secret together with the identifiers derived from it.
///
/// Never mutated in place; a new secret produces a new `Identity`.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    secret: String,
    device_id: Uuid,
    service_id: Uuid,
}

impl Identity {
    /// Derive an identity from a secret.
    #[must_use]
    pub fn derive(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let device_id = derive_device_id(&secret);
        let service_id = derive_service_id(&secret);
        Self {
            secret,
            device_id,
            service_id,
        }
    }

    /// The secret this identity was derived from.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// The device identifier.
    #[must_use]
    pub const fn device_id(&self) -> Uuid {
        self.device_id
    }

    /// The radio service identifier.
    #[must_use]
    pub const fn service_id(&self) -> Uuid {
        self.service_id
    }
}

// The secret is never written to logs.
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("device_id", &self.device_id)
            .field("service_id", &self.service_id)
            .finish_non_exhaustive()
    }
}

//! Shared types and OpenAPI schemas.
//!
//! These types describe the coordinator's externally visible state. They are
//! shared between the core and the HTTP server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Timing profile used while tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    /// Short scan interval, used while the app is in front of the user.
    Foreground,
    /// Long scan interval, used to save power.
    #[default]
    Background,
}

impl TraceMode {
    /// Maps the `background` flag used by lifecycle callers to a mode.
    #[must_use]
    pub const fn from_background(background: bool) -> Self {
        if background {
            Self::Background
        } else {
            Self::Foreground
        }
    }

    /// Returns `true` for [`TraceMode::Background`].
    #[must_use]
    pub const fn is_background(self) -> bool {
        matches!(self, Self::Background)
    }
}

impl std::fmt::Display for TraceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Foreground => f.write_str("foreground"),
            Self::Background => f.write_str("background"),
        }
    }
}

/// Lifecycle phase of the trace coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TracePhase {
    /// Neither advertising nor scanning.
    Stopped,
    /// Tracing with the foreground timing profile.
    ActiveForeground,
    /// Tracing with the background timing profile.
    ActiveBackground,
}

impl TracePhase {
    /// The active phase for a mode.
    #[must_use]
    pub const fn active(mode: TraceMode) -> Self {
        match mode {
            TraceMode::Foreground => Self::ActiveForeground,
            TraceMode::Background => Self::ActiveBackground,
        }
    }

    /// Returns `true` unless the phase is [`TracePhase::Stopped`].
    #[must_use]
    pub const fn is_started(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Consistent snapshot of the coordinator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "phase": "active_background",
    "started": true,
    "mode": "background",
    "background": true,
    "paused": false,
    "initialized": true,
    "enabled": true,
    "device_id": "8f0b6a5e-7b0e-5b8c-9a51-1c8e2f4d6a70",
    "changed_at_utc": "2026-03-01T12:00:00Z"
}))]
pub struct TraceStatus {
    /// Current lifecycle phase.
    pub phase: TracePhase,

    /// Whether advertising and scanning are active.
    pub started: bool,

    /// Mode of the running trace, or the mode the next resume will use.
    pub mode: TraceMode,

    /// `true` when `mode` is background; mirrors the flag taken by start.
    pub background: bool,

    /// Persisted paused flag.
    pub paused: bool,

    /// Whether the radio session has been acquired.
    pub initialized: bool,

    /// Whether all gating conditions currently hold.
    pub enabled: bool,

    /// Identifier derived from the configured secret.
    pub device_id: Option<Uuid>,

    /// When the last transition happened.
    pub changed_at_utc: DateTime<Utc>,
}

//! # Activity Logger
//!
//! State manager for a map-based running and cycling logger.
//!
//! This library provides:
//! - An activity model with validated input and derived pace/speed
//! - An ordered activity store kept index-aligned with map markers
//! - Snapshot persistence to a plain key-value store, with reconciliation
//!   of the stored records back into typed activities
//! - A session controller that keeps list, map, totals and storage in sync
//!
//! ## Features
//!
//! - **`persistence`** - Enable the SQLite-backed key-value store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use activity_logger::{create_activity, ActivityInput, ActivityStore, GpsPoint};
//!
//! let run = create_activity(
//!     ActivityInput::running(5.0, 25.0, 178.0),
//!     GpsPoint::new(10.0, 20.0),
//! )
//! .unwrap();
//! assert_eq!(run.metric().value(), 5.0);
//!
//! let mut store: ActivityStore<()> = ActivityStore::new();
//! store.append(run, ());
//! assert_eq!(store.total_distance(), 5.0);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{ActivityLogError, OptionExt, Result};

// Activity entities and derived metrics
pub mod activity;
pub use activity::{
    create_activity, format_label, Activity, ActivityId, ActivityInput, ActivityKind,
    DerivedMetric,
};

// Ordered activities with index-aligned markers
pub mod store;
pub use store::{ActivityStore, SortKey, StoreEntry};

// Key-value persistence and reconciliation
pub mod persistence;
pub use persistence::{
    ActivityRecord, KeyValueStore, MemoryStore, PersistenceBridge, ReconcileWarning,
    WarningKind, SCHEMA_VERSION,
};
#[cfg(feature = "persistence")]
pub use persistence::SqliteStore;

// Collaborator interfaces (position, map, list)
pub mod view;
pub use view::{ListView, MapSurface, PositionProvider, RowAnchor};

// Session state machine
pub mod session;
pub use session::{SessionController, SessionState, UiEvent};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use activity_logger::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Return the point unchanged if it is valid.
    pub fn validated(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(ActivityLogError::InvalidPosition {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

impl From<[f64; 2]> for GpsPoint {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self::new(latitude, longitude)
    }
}

impl From<GpsPoint> for [f64; 2] {
    fn from(point: GpsPoint) -> Self {
        [point.latitude, point.longitude]
    }
}

/// Configuration for a logging session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Map zoom used when centering on the user or an activity.
    /// Default: 15
    pub zoom_level: u8,

    /// Key under which the activity history is stored.
    /// Default: "workouts"
    pub storage_key: String,

    /// Fit the map to all markers once they are drawn at startup.
    /// Default: true
    pub fit_markers_on_load: bool,
}

/// Highest zoom level offered by the tile layer.
pub const MAX_ZOOM_LEVEL: u8 = 19;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            zoom_level: 15,
            storage_key: "workouts".to_string(),
            fit_markers_on_load: true,
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from JSON, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| ActivityLogError::Config {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_key.is_empty() {
            return Err(ActivityLogError::Config {
                message: "storage key must not be empty".to_string(),
            });
        }
        if self.zoom_level > MAX_ZOOM_LEVEL {
            return Err(ActivityLogError::Config {
                message: format!(
                    "zoom level {} exceeds maximum {}",
                    self.zoom_level, MAX_ZOOM_LEVEL
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

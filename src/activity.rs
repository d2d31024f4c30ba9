//! # Activity Model
//!
//! Running and cycling activities with their derived metric and label.
//!
//! An [`Activity`] is only ever produced through a validating constructor
//! ([`create_activity`], [`Activity::create_at`], [`Activity::replacement`])
//! or through reconciliation of persisted records. Fields are private so the
//! derived metric can never drift from distance and duration.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ActivityLogError, Result};
use crate::GpsPoint;

// ============================================================================
// Identifiers and Kinds
// ============================================================================

/// Opaque activity identifier, stable across edits and reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
    /// Generate a fresh, time-ordered identifier.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ActivityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ActivityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two supported activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Running,
    Cycling,
}

impl ActivityKind {
    /// Capitalized name used in labels.
    pub fn title(&self) -> &'static str {
        match self {
            ActivityKind::Running => "Running",
            ActivityKind::Cycling => "Cycling",
        }
    }

    /// Name of the kind-specific form field.
    pub fn extra_field(&self) -> &'static str {
        match self {
            ActivityKind::Running => "cadence",
            ActivityKind::Cycling => "elevation gain",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ActivityKind::Running => "🏃‍♀️",
            ActivityKind::Cycling => "🚴‍♀️",
        }
    }

    /// CSS class for the marker popup.
    pub fn style_class(&self) -> &'static str {
        match self {
            ActivityKind::Running => "running-popup",
            ActivityKind::Cycling => "cycling-popup",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::Running => f.write_str("running"),
            ActivityKind::Cycling => f.write_str("cycling"),
        }
    }
}

impl FromStr for ActivityKind {
    type Err = ActivityLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(ActivityKind::Running),
            "cycling" => Ok(ActivityKind::Cycling),
            other => Err(ActivityLogError::Config {
                message: format!("unknown activity kind '{}'", other),
            }),
        }
    }
}

// ============================================================================
// Form Input
// ============================================================================

/// Values submitted from the create or edit form.
///
/// Position is not part of the input: it is fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityInput {
    pub kind: ActivityKind,
    pub distance_km: f64,
    pub duration_min: f64,
    /// Cadence (steps/min) for running, elevation gain (m) for cycling
    pub extra: f64,
}

impl ActivityInput {
    pub fn running(distance_km: f64, duration_min: f64, cadence_spm: f64) -> Self {
        Self {
            kind: ActivityKind::Running,
            distance_km,
            duration_min,
            extra: cadence_spm,
        }
    }

    pub fn cycling(distance_km: f64, duration_min: f64, elevation_gain_m: f64) -> Self {
        Self {
            kind: ActivityKind::Cycling,
            distance_km,
            duration_min,
            extra: elevation_gain_m,
        }
    }

    /// Check that every numeric field is finite and strictly positive.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("distance", self.distance_km),
            ("duration", self.duration_min),
            (self.kind.extra_field(), self.extra),
        ];
        for (field, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ActivityLogError::Validation { field, value });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Derived Metric
// ============================================================================

/// The single derived metric of an activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DerivedMetric {
    /// `duration_min / distance_km` (running)
    PaceMinPerKm(f64),
    /// `distance_km / duration_min` (cycling)
    SpeedKmPerH(f64),
}

impl DerivedMetric {
    fn compute(kind: ActivityKind, distance_km: f64, duration_min: f64) -> Self {
        match kind {
            ActivityKind::Running => DerivedMetric::PaceMinPerKm(duration_min / distance_km),
            ActivityKind::Cycling => DerivedMetric::SpeedKmPerH(distance_km / duration_min),
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            DerivedMetric::PaceMinPerKm(v) | DerivedMetric::SpeedKmPerH(v) => v,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            DerivedMetric::PaceMinPerKm(_) => "min/km",
            DerivedMetric::SpeedKmPerH(_) => "km/h",
        }
    }

    /// Value rounded to one decimal followed by its unit.
    pub fn display(&self) -> String {
        format!("{:.1} {}", self.value(), self.unit())
    }
}

/// Build the `"<Kind> on <Month> <Day>"` label in local time.
pub fn format_label(kind: ActivityKind, created_at: &DateTime<Utc>) -> String {
    let local = created_at.with_timezone(&Local);
    format!("{} on {}", kind.title(), local.format("%B %-d"))
}

// ============================================================================
// Activity
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Details {
    Running { cadence_spm: f64, pace_min_per_km: f64 },
    Cycling { elevation_gain_m: f64, speed_km_per_h: f64 },
}

impl Details {
    fn derive(kind: ActivityKind, distance_km: f64, duration_min: f64, extra: f64) -> Self {
        match DerivedMetric::compute(kind, distance_km, duration_min) {
            DerivedMetric::PaceMinPerKm(pace_min_per_km) => Details::Running {
                cadence_spm: extra,
                pace_min_per_km,
            },
            DerivedMetric::SpeedKmPerH(speed_km_per_h) => Details::Cycling {
                elevation_gain_m: extra,
                speed_km_per_h,
            },
        }
    }
}

/// A logged running or cycling session.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    id: ActivityId,
    created_at: DateTime<Utc>,
    position: GpsPoint,
    distance_km: f64,
    duration_min: f64,
    details: Details,
    label: String,
}

/// Create a new activity at `position`, timestamped now.
pub fn create_activity(input: ActivityInput, position: GpsPoint) -> Result<Activity> {
    Activity::create_at(input, position, Utc::now())
}

impl Activity {
    /// Create a new activity with an explicit creation time.
    pub fn create_at(
        input: ActivityInput,
        position: GpsPoint,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        input.validate()?;
        Ok(Self::from_parts(
            ActivityId::generate(),
            created_at,
            position,
            input,
        ))
    }

    /// Assemble an activity without validation, deriving metric and label.
    ///
    /// Used for reconciliation of persisted records, which were validated
    /// when first created.
    pub(crate) fn from_parts(
        id: ActivityId,
        created_at: DateTime<Utc>,
        position: GpsPoint,
        input: ActivityInput,
    ) -> Self {
        let mut activity = Self {
            id,
            created_at,
            position,
            distance_km: input.distance_km,
            duration_min: input.duration_min,
            details: Details::derive(
                input.kind,
                input.distance_km,
                input.duration_min,
                input.extra,
            ),
            label: String::new(),
        };
        activity.relabel();
        activity
    }

    /// Build the edited version of this activity.
    ///
    /// The result keeps this activity's id, position and creation time.
    pub fn replacement(&self, input: ActivityInput) -> Result<Self> {
        input.validate()?;
        Ok(Self::from_parts(
            self.id.clone(),
            self.created_at,
            self.position,
            input,
        ))
    }

    /// Recompute the label from kind and creation time.
    pub fn relabel(&mut self) {
        self.label = format_label(self.kind(), &self.created_at);
    }

    pub fn id(&self) -> &ActivityId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn position(&self) -> GpsPoint {
        self.position
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn duration_min(&self) -> f64 {
        self.duration_min
    }

    pub fn kind(&self) -> ActivityKind {
        match self.details {
            Details::Running { .. } => ActivityKind::Running,
            Details::Cycling { .. } => ActivityKind::Cycling,
        }
    }

    /// Cadence for running, elevation gain for cycling.
    pub fn extra(&self) -> f64 {
        match self.details {
            Details::Running { cadence_spm, .. } => cadence_spm,
            Details::Cycling {
                elevation_gain_m, ..
            } => elevation_gain_m,
        }
    }

    pub fn cadence_spm(&self) -> Option<f64> {
        match self.details {
            Details::Running { cadence_spm, .. } => Some(cadence_spm),
            Details::Cycling { .. } => None,
        }
    }

    pub fn elevation_gain_m(&self) -> Option<f64> {
        match self.details {
            Details::Cycling {
                elevation_gain_m, ..
            } => Some(elevation_gain_m),
            Details::Running { .. } => None,
        }
    }

    pub fn metric(&self) -> DerivedMetric {
        match self.details {
            Details::Running {
                pace_min_per_km, ..
            } => DerivedMetric::PaceMinPerKm(pace_min_per_km),
            Details::Cycling { speed_km_per_h, .. } => DerivedMetric::SpeedKmPerH(speed_km_per_h),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Form values that would recreate this activity, used to prefill the edit form.
    pub fn input(&self) -> ActivityInput {
        ActivityInput {
            kind: self.kind(),
            distance_km: self.distance_km,
            duration_min: self.duration_min,
            extra: self.extra(),
        }
    }

    /// Marker popup text: kind icon followed by the label.
    pub fn popup_text(&self) -> String {
        format!("{} {}", self.kind().icon(), self.label)
    }

    pub fn style_class(&self) -> &'static str {
        self.kind().style_class()
    }
}

// ============================================================================
// Tests
// ============================================================================

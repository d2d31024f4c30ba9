//! # Persistence Bridge
//!
//! Snapshot persistence of the activity list to a plain key-value store.
//!
//! ## Storage Layout
//!
//! One textual blob under a single key, holding a versioned envelope:
//!
//! ```json
//! {"version": 1, "activities": [{"id": "...", "createdAt": "...", ...}]}
//! ```
//!
//! Markers are never persisted. Records loaded back are plain data and go
//! through [`PersistenceBridge::reconcile`] to become typed activities again.
//! A bare array of records (the un-versioned format) is still accepted.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "persistence")]
use rusqlite::{params, Connection, OptionalExtension};

use crate::activity::{Activity, ActivityId, ActivityInput, ActivityKind};
use crate::error::{ActivityLogError, Result};
use crate::store::ActivityStore;
use crate::GpsPoint;

/// Version written into every saved envelope.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Key-Value Backends
// ============================================================================

/// Synchronous text key-value store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn delete(&mut self, key: &str) -> Result<()>;
}

/// In-memory key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding one entry.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Key-value store backed by a single SQLite table.
#[cfg(feature = "persistence")]
pub struct SqliteStore {
    db: Connection,
}

#[cfg(feature = "persistence")]
impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub fn open(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
        "#,
        )
    }
}

#[cfg(feature = "persistence")]
impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
             VALUES (?, ?, strftime('%s', 'now'))",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.db
            .execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
        Ok(())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Plain persisted form of an activity.
///
/// Field aliases accept the un-versioned format's names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    #[serde(default)]
    pub id: Option<ActivityId>,
    #[serde(alias = "date")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "coords")]
    pub position: GpsPoint,
    #[serde(alias = "distance")]
    pub distance_km: f64,
    #[serde(alias = "duration")]
    pub duration_min: f64,
    #[serde(alias = "type")]
    pub kind: ActivityKind,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "cadence")]
    pub cadence_spm: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "elevationGain"
    )]
    pub elevation_gain_m: Option<f64>,
    #[serde(default, alias = "pace", alias = "speed")]
    pub derived_metric: Option<f64>,
    #[serde(default, alias = "description")]
    pub label: Option<String>,
}

impl From<&Activity> for ActivityRecord {
    fn from(activity: &Activity) -> Self {
        Self {
            id: Some(activity.id().clone()),
            created_at: activity.created_at(),
            position: activity.position(),
            distance_km: activity.distance_km(),
            duration_min: activity.duration_min(),
            kind: activity.kind(),
            cadence_spm: activity.cadence_spm(),
            elevation_gain_m: activity.elevation_gain_m(),
            derived_metric: Some(activity.metric().value()),
            label: Some(activity.label().to_string()),
        }
    }
}

impl ActivityRecord {
    fn extra(&self) -> Option<f64> {
        match self.kind {
            ActivityKind::Running => self.cadence_spm,
            ActivityKind::Cycling => self.elevation_gain_m,
        }
    }
}

#[derive(Debug, Serialize)]
struct Envelope {
    version: u32,
    activities: Vec<ActivityRecord>,
}

/// Stored blob with its records still undecoded, so one bad record cannot
/// void the rest of the history.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredBlob {
    Versioned {
        version: u32,
        activities: Vec<serde_json::Value>,
    },
    Unversioned(Vec<serde_json::Value>),
}

/// Parse a stored blob into records, skipping records that do not decode.
fn parse_blob(blob: &str) -> Result<Vec<ActivityRecord>> {
    let values = match serde_json::from_str::<StoredBlob>(blob)? {
        StoredBlob::Versioned {
            version,
            activities,
        } if version == SCHEMA_VERSION => activities,
        StoredBlob::Versioned { version, .. } => {
            return Err(ActivityLogError::PersistenceCorrupt {
                message: format!("unsupported schema version {}", version),
            })
        }
        StoredBlob::Unversioned(values) => values,
    };

    let records = values
        .into_iter()
        .enumerate()
        .filter_map(
            |(index, value)| match serde_json::from_value::<ActivityRecord>(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("[Persistence] Skipping unreadable record {}: {}", index, e);
                    None
                }
            },
        )
        .collect();
    Ok(records)
}

// ============================================================================
// Reconciliation Warnings
// ============================================================================

/// What reconciliation noticed about one record.
#[derive(Debug, Clone, PartialEq)]
pub enum WarningKind {
    /// The kind-specific field was absent; the record was dropped
    MissingExtraField { kind: ActivityKind },
    /// The stored position was out of range; the record was dropped
    InvalidPosition { position: GpsPoint },
    /// The record had no id; a fresh one was assigned
    MissingId,
    /// The id was already used by an earlier record; a fresh one was assigned
    DuplicateId { original: ActivityId },
    /// The stored derived metric differed from the recomputed one
    MetricMismatch { stored: f64, recomputed: f64 },
}

/// A reconciliation finding for the record at `index` of the loaded list.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileWarning {
    pub index: usize,
    pub id: Option<ActivityId>,
    pub kind: WarningKind,
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}", self.index)?;
        if let Some(id) = &self.id {
            write!(f, " ('{}')", id)?;
        }
        match &self.kind {
            WarningKind::MissingExtraField { kind } => {
                write!(f, ": {} record has no {}, dropped", kind, kind.extra_field())
            }
            WarningKind::InvalidPosition { position } => write!(
                f,
                ": position ({}, {}) out of range, dropped",
                position.latitude, position.longitude
            ),
            WarningKind::MissingId => write!(f, ": no id, assigned a new one"),
            WarningKind::DuplicateId { original } => {
                write!(f, ": duplicate id '{}', assigned a new one", original)
            }
            WarningKind::MetricMismatch { stored, recomputed } => {
                write!(f, ": stored metric {} recomputed as {}", stored, recomputed)
            }
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Saves and restores the activity list through a [`KeyValueStore`].
pub struct PersistenceBridge<K> {
    backend: K,
    key: String,
}

impl<K: KeyValueStore> PersistenceBridge<K> {
    pub fn new(backend: K, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }

    /// Overwrite the stored blob with a snapshot of `store`'s activities.
    pub fn save<H>(&mut self, store: &ActivityStore<H>) -> Result<()> {
        let envelope = Envelope {
            version: SCHEMA_VERSION,
            activities: store.activities().map(ActivityRecord::from).collect(),
        };
        let blob = serde_json::to_string(&envelope).map_err(|e| ActivityLogError::Storage {
            message: e.to_string(),
        })?;
        self.backend.set(&self.key, &blob)?;
        debug!(
            "[Persistence] Saved {} activities under '{}'",
            envelope.activities.len(),
            self.key
        );
        Ok(())
    }

    /// Read the stored records. Missing or unreadable history is empty.
    pub fn load(&self) -> Vec<ActivityRecord> {
        let blob = match self.backend.get(&self.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!("[Persistence] No history under '{}'", self.key);
                return Vec::new();
            }
            Err(e) => {
                warn!("[Persistence] Failed to read '{}': {}", self.key, e);
                return Vec::new();
            }
        };

        match parse_blob(&blob) {
            Ok(records) => {
                info!("[Persistence] Loaded {} records", records.len());
                records
            }
            Err(e) => {
                warn!("[Persistence] Ignoring stored history: {}", e);
                Vec::new()
            }
        }
    }

    /// Rebuild typed activities from plain records.
    pub fn reconcile(&self, records: Vec<ActivityRecord>) -> (Vec<Activity>, Vec<ReconcileWarning>) {
        reconcile(records)
    }

    /// Delete the stored blob.
    pub fn reset(&mut self) -> Result<()> {
        self.backend.delete(&self.key)?;
        info!("[Persistence] Cleared '{}'", self.key);
        Ok(())
    }
}

/// Rebuild typed activities from plain records.
///
/// Records are trusted to have been validated when first created; the
/// derived metric and label are recomputed from the stored fields.
pub fn reconcile(records: Vec<ActivityRecord>) -> (Vec<Activity>, Vec<ReconcileWarning>) {
    let mut activities = Vec::with_capacity(records.len());
    let mut warnings = Vec::new();
    let mut seen: HashSet<ActivityId> = HashSet::new();

    for (index, record) in records.into_iter().enumerate() {
        let Some(extra) = record.extra() else {
            warnings.push(ReconcileWarning {
                index,
                id: record.id.clone(),
                kind: WarningKind::MissingExtraField { kind: record.kind },
            });
            continue;
        };
        if !record.position.is_valid() {
            warnings.push(ReconcileWarning {
                index,
                id: record.id.clone(),
                kind: WarningKind::InvalidPosition {
                    position: record.position,
                },
            });
            continue;
        }

        let id = match record.id.clone() {
            Some(id) if seen.contains(&id) => {
                warnings.push(ReconcileWarning {
                    index,
                    id: Some(id.clone()),
                    kind: WarningKind::DuplicateId { original: id },
                });
                ActivityId::generate()
            }
            Some(id) => id,
            None => {
                warnings.push(ReconcileWarning {
                    index,
                    id: None,
                    kind: WarningKind::MissingId,
                });
                ActivityId::generate()
            }
        };
        seen.insert(id.clone());

        let input = ActivityInput {
            kind: record.kind,
            distance_km: record.distance_km,
            duration_min: record.duration_min,
            extra,
        };
        let activity = Activity::from_parts(id, record.created_at, record.position, input);

        if let Some(stored) = record.derived_metric {
            let recomputed = activity.metric().value();
            if stored.to_bits() != recomputed.to_bits() {
                warnings.push(ReconcileWarning {
                    index,
                    id: Some(activity.id().clone()),
                    kind: WarningKind::MetricMismatch { stored, recomputed },
                });
            }
        }

        activities.push(activity);
    }

    for warning in &warnings {
        warn!("[Persistence] Reconcile: {}", warning);
    }

    (activities, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{create_activity, DerivedMetric};

    fn bridge() -> PersistenceBridge<MemoryStore> {
        PersistenceBridge::new(MemoryStore::new(), "workouts")
    }

    fn sample_store() -> ActivityStore<()> {
        let mut store = ActivityStore::new();
        store.append(
            create_activity(
                ActivityInput::running(5.0, 25.0, 178.0),
                GpsPoint::new(10.0, 20.0),
            )
            .unwrap(),
            (),
        );
        store.append(
            create_activity(
                ActivityInput::cycling(21.3, 47.0, 410.0),
                GpsPoint::new(10.1, 20.2),
            )
            .unwrap(),
            (),
        );
        store
    }

    #[test]
    fn test_round_trip_preserves_activities() {
        let store = sample_store();
        let mut bridge = bridge();
        bridge.save(&store).unwrap();

        let (activities, warnings) = bridge.reconcile(bridge.load());
        assert!(warnings.is_empty(), "{:?}", warnings);
        let original: Vec<&Activity> = store.activities().collect();
        assert_eq!(activities.len(), original.len());
        for (loaded, original) in activities.iter().zip(original) {
            assert_eq!(loaded, original);
            assert_eq!(
                loaded.metric().value().to_bits(),
                original.metric().value().to_bits()
            );
        }
    }

    #[test]
    fn test_saved_blob_is_versioned() {
        let mut bridge = bridge();
        bridge.save(&sample_store()).unwrap();

        let blob = bridge.backend().get("workouts").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value["version"], SCHEMA_VERSION);
        let first = &value["activities"][0];
        assert_eq!(first["kind"], "running");
        assert_eq!(first["position"], serde_json::json!([10.0, 20.0]));
        assert_eq!(first["cadenceSpm"], 178.0);
        assert_eq!(first["derivedMetric"], 5.0);
        assert!(first.get("elevationGainM").is_none());
    }

    #[test]
    fn test_missing_blob_is_empty() {
        assert!(bridge().load().is_empty());
    }

    #[test]
    fn test_corrupt_blob_is_empty() {
        for blob in ["{not json", "42", r#"{"version": 99, "activities": []}"#] {
            let bridge =
                PersistenceBridge::new(MemoryStore::with_entry("workouts", blob), "workouts");
            assert!(bridge.load().is_empty(), "{}", blob);
        }
    }

    #[test]
    fn test_loads_unversioned_format() {
        let blob = r#"[
            {"date":"2024-05-01T07:30:00.000Z","id":"4930218457","coords":[51.5,-0.12],
             "distance":5,"duration":25,"type":"running","cadence":178,"pace":5,
             "description":"Running on May 1"},
            {"date":"2024-05-02T07:30:00.000Z","id":"4930218999","coords":[51.6,-0.13],
             "distance":20,"duration":60,"type":"cycling","elevationGain":400,
             "speed":0.3333333333333333,"description":"Cycling on May 2"}
        ]"#;
        let bridge = PersistenceBridge::new(MemoryStore::with_entry("workouts", blob), "workouts");

        let (activities, warnings) = bridge.reconcile(bridge.load());
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].id().as_str(), "4930218457");
        assert_eq!(activities[0].metric(), DerivedMetric::PaceMinPerKm(5.0));
        assert_eq!(activities[1].kind(), ActivityKind::Cycling);
        assert_eq!(activities[1].elevation_gain_m(), Some(400.0));
    }

    #[test]
    fn test_reconcile_warnings() {
        let blob = r#"[
            {"createdAt":"2024-05-01T07:30:00Z","id":"a","position":[1,2],
             "distanceKm":5,"durationMin":25,"kind":"running","derivedMetric":4.0},
            {"createdAt":"2024-05-01T07:30:00Z","id":"b","position":[1,2],
             "distanceKm":5,"durationMin":25,"kind":"running","cadenceSpm":170,"derivedMetric":4.0},
            {"createdAt":"2024-05-01T07:30:00Z","id":"b","position":[1,2],
             "distanceKm":8,"durationMin":30,"kind":"cycling","elevationGainM":50},
            {"createdAt":"2024-05-01T07:30:00Z","position":[1,2],
             "distanceKm":8,"durationMin":30,"kind":"cycling","elevationGainM":50}
        ]"#;
        let records = parse_blob(blob).unwrap();
        let (activities, warnings) = reconcile(records);

        assert_eq!(activities.len(), 3);
        assert_eq!(activities[0].id().as_str(), "b");
        assert_eq!(activities[0].metric(), DerivedMetric::PaceMinPerKm(5.0));
        assert_ne!(activities[1].id(), activities[0].id());

        let kinds: Vec<&WarningKind> = warnings.iter().map(|w| &w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &WarningKind::MissingExtraField {
                    kind: ActivityKind::Running
                },
                &WarningKind::MetricMismatch {
                    stored: 4.0,
                    recomputed: 5.0
                },
                &WarningKind::DuplicateId {
                    original: ActivityId::from("b")
                },
                &WarningKind::MissingId,
            ]
        );
        assert_eq!(warnings[0].index, 0);
        assert_eq!(warnings[3].index, 3);
    }

    #[test]
    fn test_unreadable_record_keeps_the_rest() {
        let blob = r#"{"version":1,"activities":[
            {"createdAt":"2024-05-01T07:30:00Z","id":"a","position":[10.0,20.0],
             "distanceKm":5,"durationMin":25,"kind":"running","cadenceSpm":178},
            {"createdAt":"2024-05-01T08:30:00Z","id":"b","position":[null,20.0],
             "distanceKm":7,"durationMin":35,"kind":"running","cadenceSpm":170},
            {"createdAt":"2024-05-01T09:30:00Z","id":"c","position":[10.0,20.0],
             "distanceKm":20,"durationMin":60,"kind":"cycling","elevationGainM":400}
        ]}"#;
        let bridge = PersistenceBridge::new(MemoryStore::with_entry("workouts", blob), "workouts");

        let (activities, warnings) = bridge.reconcile(bridge.load());
        assert!(warnings.is_empty(), "{:?}", warnings);
        let ids: Vec<&str> = activities.iter().map(|a| a.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_reconcile_drops_out_of_range_position() {
        let blob = r#"[
            {"createdAt":"2024-05-01T07:30:00Z","id":"a","position":[95.0,20.0],
             "distanceKm":5,"durationMin":25,"kind":"running","cadenceSpm":178},
            {"createdAt":"2024-05-01T08:30:00Z","id":"b","position":[10.0,20.0],
             "distanceKm":7,"durationMin":35,"kind":"running","cadenceSpm":170}
        ]"#;
        let (activities, warnings) = reconcile(parse_blob(blob).unwrap());

        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].id().as_str(), "b");
        assert_eq!(
            warnings,
            vec![ReconcileWarning {
                index: 0,
                id: Some(ActivityId::from("a")),
                kind: WarningKind::InvalidPosition {
                    position: GpsPoint::new(95.0, 20.0)
                },
            }]
        );
        assert!(warnings[0].to_string().contains("out of range"));
    }

    #[test]
    fn test_reset_deletes_blob() {
        let mut bridge = bridge();
        bridge.save(&sample_store()).unwrap();
        assert!(bridge.backend().contains_key("workouts"));

        bridge.reset().unwrap();
        assert!(!bridge.backend().contains_key("workouts"));
        assert!(bridge.load().is_empty());
    }

    #[test]
    fn test_markers_are_not_persisted() {
        let mut store: ActivityStore<String> = ActivityStore::new();
        store.append(
            create_activity(ActivityInput::running(5.0, 25.0, 178.0), GpsPoint::new(1.0, 2.0))
                .unwrap(),
            "marker-handle-7".to_string(),
        );
        let mut bridge = bridge();
        bridge.save(&store).unwrap();

        let blob = bridge.backend().get("workouts").unwrap().unwrap();
        assert!(!blob.contains("marker-handle-7"));
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_sqlite_store_round_trip() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.get("workouts").unwrap(), None);

        store.set("workouts", "[]").unwrap();
        store.set("workouts", "[1]").unwrap();
        assert_eq!(store.get("workouts").unwrap().as_deref(), Some("[1]"));

        store.delete("workouts").unwrap();
        assert_eq!(store.get("workouts").unwrap(), None);
    }
}

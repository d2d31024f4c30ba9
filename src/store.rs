//! # Activity Store
//!
//! Ordered collection of activities, each paired with its map marker handle.
//!
//! Activities and markers live together in one composite [`StoreEntry`], so
//! the marker at index `i` always belongs to the activity at index `i`.
//! Every mutation takes an index and touches the whole entry at once.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::activity::{Activity, ActivityId};
use crate::error::{ActivityLogError, OptionExt, Result};

/// Field to sort the rendered list by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Duration,
    Distance,
}

impl SortKey {
    /// Parse a sort control value. The empty string means natural order.
    pub fn parse_option(value: &str) -> Result<Option<SortKey>> {
        if value.is_empty() {
            Ok(None)
        } else {
            value.parse().map(Some)
        }
    }

    fn compare(&self, a: &Activity, b: &Activity) -> Ordering {
        match self {
            SortKey::Duration => a.duration_min().total_cmp(&b.duration_min()),
            SortKey::Distance => a.distance_km().total_cmp(&b.distance_km()),
        }
    }
}

impl FromStr for SortKey {
    type Err = ActivityLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "duration" => Ok(SortKey::Duration),
            "distance" => Ok(SortKey::Distance),
            other => Err(ActivityLogError::Config {
                message: format!("unknown sort key '{}'", other),
            }),
        }
    }
}

/// One activity together with its marker handle.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry<H> {
    pub activity: Activity,
    pub marker: H,
}

/// Ordered activities with index-aligned marker handles and a cached total.
#[derive(Debug, Clone)]
pub struct ActivityStore<H> {
    entries: Vec<StoreEntry<H>>,
    total_distance: f64,
}

impl<H> ActivityStore<H> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            total_distance: 0.0,
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add an activity and its marker to the end.
    pub fn append(&mut self, activity: Activity, marker: H) {
        self.entries.push(StoreEntry { activity, marker });
        self.recompute_total();
    }

    /// Remove the entry at `index`, returning it so the marker can be released.
    pub fn remove_at(&mut self, index: usize) -> Result<StoreEntry<H>> {
        self.check_index("remove_at", index)?;
        let entry = self.entries.remove(index);
        self.recompute_total();
        Ok(entry)
    }

    /// Replace the entry at `index`, returning the old one.
    pub fn replace_at(
        &mut self,
        index: usize,
        activity: Activity,
        marker: H,
    ) -> Result<StoreEntry<H>> {
        self.check_index("replace_at", index)?;
        let old = std::mem::replace(&mut self.entries[index], StoreEntry { activity, marker });
        self.recompute_total();
        Ok(old)
    }

    /// Remove every entry, returning them so markers can be released.
    pub fn clear(&mut self) -> Vec<StoreEntry<H>> {
        let drained = std::mem::take(&mut self.entries);
        self.total_distance = 0.0;
        drained
    }

    /// Mutable access to a marker slot. The activity itself is only
    /// changed through [`replace_at`](Self::replace_at).
    pub fn marker_mut(&mut self, index: usize) -> Result<&mut H> {
        let len = self.entries.len();
        self.entries
            .get_mut(index)
            .map(|entry| &mut entry.marker)
            .ok_or_precondition("marker_mut", index, len)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Activities in the requested order. Natural (insertion) order for `None`.
    ///
    /// The sort is stable and never touches the store itself.
    pub fn sorted_view(&self, key: Option<SortKey>) -> Vec<&Activity> {
        let mut view: Vec<&Activity> = self.entries.iter().map(|e| &e.activity).collect();
        if let Some(key) = key {
            view.sort_by(|a, b| key.compare(a, b));
        }
        view
    }

    /// Current index of the activity with this id.
    pub fn find_index_by_id(&self, id: &ActivityId) -> Option<usize> {
        self.entries.iter().position(|e| e.activity.id() == id)
    }

    /// Sum of `distance_km` over all activities.
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StoreEntry<H>> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoreEntry<H>> {
        self.entries.iter()
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.entries.iter().map(|e| &e.activity)
    }

    pub fn markers(&self) -> impl Iterator<Item = &H> {
        self.entries.iter().map(|e| &e.marker)
    }

    fn check_index(&self, operation: &'static str, index: usize) -> Result<()> {
        let len = self.entries.len();
        (index < len)
            .then_some(())
            .ok_or_precondition(operation, index, len)
    }

    fn recompute_total(&mut self) {
        self.total_distance = self.entries.iter().map(|e| e.activity.distance_km()).sum();
    }
}

impl<H> Default for ActivityStore<H> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

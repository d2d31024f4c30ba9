//! # Session Controller
//!
//! Stateful controller that turns user intents into store mutations and keeps
//! the list, the map markers, the total and the persisted snapshot in sync.
//!
//! ## Architecture
//!
//! The controller owns:
//! - The activity store, whose entries carry an optional marker handle
//!   (`None` until the map is available)
//! - The persistence bridge over the injected key-value backend
//! - The injected position provider, map surface and list view
//! - The form state machine: `Idle`, `Creating`, `Editing`
//!
//! Each public method is one event-handling turn. Rows are always resolved
//! from their activity id at the moment of the event; indices are never
//! cached across events.

use log::{debug, info, warn};

use crate::activity::{create_activity, Activity, ActivityId, ActivityInput};
use crate::error::{ActivityLogError, OptionExt, Result, POSITION_UNAVAILABLE_MESSAGE};
use crate::persistence::{KeyValueStore, PersistenceBridge};
use crate::store::{ActivityStore, SortKey};
use crate::view::{ListView, MapSurface, PositionProvider, RowAnchor};
use crate::{GpsPoint, SessionConfig};

// ============================================================================
// Core Types
// ============================================================================

/// Which form, if any, is open.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No form open
    Idle,
    /// New-activity form open for a clicked map position
    Creating { position: GpsPoint },
    /// Inline edit form open for this activity
    Editing { id: ActivityId },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Creating { .. } => "creating",
            SessionState::Editing { .. } => "editing",
        }
    }
}

/// A discrete user interaction delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    MapClick(GpsPoint),
    SubmitNew(ActivityInput),
    CancelForm,
    BeginEdit(ActivityId),
    SubmitEdit(ActivityInput),
    CancelEdit,
    Delete(ActivityId),
    Sort(Option<SortKey>),
    Reset,
    Focus(ActivityId),
    ShowAll,
    DismissNotification,
}

fn draw_marker<M: MapSurface>(map: &mut M, activity: &Activity) -> M::Marker {
    map.place_marker(
        activity.position(),
        &activity.popup_text(),
        activity.style_class(),
    )
}

// ============================================================================
// Session Controller
// ============================================================================

/// Orchestrates one logging session over its injected collaborators.
pub struct SessionController<P, M, K, V>
where
    P: PositionProvider,
    M: MapSurface,
    K: KeyValueStore,
    V: ListView,
{
    position_provider: P,
    map: M,
    view: V,
    persistence: PersistenceBridge<K>,
    store: ActivityStore<Option<M::Marker>>,
    state: SessionState,
    sort_key: Option<SortKey>,
    map_ready: bool,
    config: SessionConfig,
}

impl<P, M, K, V> SessionController<P, M, K, V>
where
    P: PositionProvider,
    M: MapSurface,
    K: KeyValueStore,
    V: ListView,
{
    /// Create a controller. Nothing is loaded or drawn until [`start`](Self::start).
    pub fn new(
        position_provider: P,
        map: M,
        backend: K,
        view: V,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            position_provider,
            map,
            view,
            persistence: PersistenceBridge::new(backend, config.storage_key.clone()),
            store: ActivityStore::new(),
            state: SessionState::Idle,
            sort_key: None,
            map_ready: false,
            config,
        })
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Restore stored history, render it, then request the user's position.
    pub fn start(&mut self) {
        let records = self.persistence.load();
        let (activities, warnings) = self.persistence.reconcile(records);
        if !warnings.is_empty() {
            warn!(
                "[Session] {} stored records needed repair on load",
                warnings.len()
            );
        }

        for activity in activities {
            self.store.append(activity, None);
        }
        info!(
            "[Session] Started with {} activities ({} km)",
            self.store.len(),
            self.store.total_distance()
        );

        self.render_full_list();
        self.refresh_summary();

        let position = self.position_provider.current_position();
        self.on_position(position);
    }

    /// Deliver the result of the position request.
    ///
    /// On success the map is centered and markers are drawn for every stored
    /// activity. On failure the session continues without a map.
    pub fn on_position(&mut self, result: Result<GpsPoint>) {
        let result = result.and_then(|position| {
            position
                .validated()
                .map_err(|e| ActivityLogError::PositionUnavailable {
                    message: e.to_string(),
                })
        });
        match result {
            Ok(position) => {
                self.map_ready = true;
                self.map.center_on(position, self.config.zoom_level);
                let drawn = self.draw_missing_markers();
                debug!("[Session] Map ready, drew {} markers", drawn);
                if self.config.fit_markers_on_load {
                    self.show_all();
                }
            }
            Err(e) => {
                warn!("[Session] Position unavailable: {}", e);
                self.view
                    .notify(e.user_message().unwrap_or(POSITION_UNAVAILABLE_MESSAGE));
            }
        }
    }

    fn draw_missing_markers(&mut self) -> usize {
        let mut drawn = 0;
        for index in 0..self.store.len() {
            let marker = match self.store.get(index) {
                Some(entry) if entry.marker.is_none() => draw_marker(&mut self.map, &entry.activity),
                _ => continue,
            };
            if let Ok(slot) = self.store.marker_mut(index) {
                *slot = Some(marker);
                drawn += 1;
            }
        }
        drawn
    }

    /// Dispatch a UI event to its handler.
    pub fn handle(&mut self, event: UiEvent) -> Result<()> {
        match event {
            UiEvent::MapClick(position) => self.map_click(position),
            UiEvent::SubmitNew(input) => self.submit_new(input).map(|_| ()),
            UiEvent::CancelForm => self.cancel_form(),
            UiEvent::BeginEdit(id) => self.begin_edit(&id),
            UiEvent::SubmitEdit(input) => self.submit_edit(input),
            UiEvent::CancelEdit => self.cancel_edit(),
            UiEvent::Delete(id) => self.delete(&id),
            UiEvent::Sort(key) => self.sort(key),
            UiEvent::Reset => self.reset(),
            UiEvent::Focus(id) => self.focus(&id),
            UiEvent::ShowAll => {
                self.show_all();
                Ok(())
            }
            UiEvent::DismissNotification => {
                self.view.dismiss_notification();
                Ok(())
            }
        }
    }

    // ========================================================================
    // Creating
    // ========================================================================

    /// Open the new-activity form for a clicked map position.
    ///
    /// A position with non-finite or out-of-range coordinates is reported and
    /// leaves the state unchanged.
    pub fn map_click(&mut self, position: GpsPoint) -> Result<()> {
        if !self.map_ready {
            return Err(ActivityLogError::InvalidTransition {
                event: "map_click",
                state: "without a map",
            });
        }
        if matches!(self.state, SessionState::Editing { .. }) {
            return Err(self.invalid("map_click"));
        }
        let position = position.validated().map_err(|e| self.report(e))?;
        match self.state {
            SessionState::Idle | SessionState::Creating { .. } => {
                self.state = SessionState::Creating { position };
                self.view.set_empty_message_visible(false);
                self.view.show_form();
                debug!(
                    "[Session] Creating at ({}, {})",
                    position.latitude, position.longitude
                );
                Ok(())
            }
            SessionState::Editing { .. } => Err(self.invalid("map_click")),
        }
    }

    /// Submit the new-activity form.
    ///
    /// Invalid input is reported and the form stays open with nothing changed.
    pub fn submit_new(&mut self, input: ActivityInput) -> Result<ActivityId> {
        let SessionState::Creating { position } = self.state else {
            return Err(self.invalid("submit_new"));
        };

        let activity = create_activity(input, position).map_err(|e| self.report(e))?;
        let id = activity.id().clone();
        let marker = self
            .map_ready
            .then(|| draw_marker(&mut self.map, &activity));
        self.store.append(activity, marker);

        if self.sort_key.is_some() {
            self.render_full_list();
        } else if let Some(entry) = self.store.get(self.store.len() - 1) {
            self.view.render_row(&entry.activity, RowAnchor::End);
        }
        self.refresh_summary();
        self.persist();
        self.view.hide_form();
        self.state = SessionState::Idle;

        info!(
            "[Session] Added {} {} ({} activities, {} km)",
            input.kind,
            id,
            self.store.len(),
            self.store.total_distance()
        );
        Ok(id)
    }

    /// Close the new-activity form without saving.
    pub fn cancel_form(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Creating { .. }) {
            return Err(self.invalid("cancel_form"));
        }
        self.view.hide_form();
        self.view.set_empty_message_visible(self.store.is_empty());
        self.state = SessionState::Idle;
        Ok(())
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Open the inline edit form for an activity, closing any open form.
    pub fn begin_edit(&mut self, id: &ActivityId) -> Result<()> {
        let index = self
            .store
            .find_index_by_id(id)
            .ok_or_not_found(id.as_str())?;

        match self.state {
            SessionState::Editing { .. } => self.view.remove_edit_form(),
            SessionState::Creating { .. } => self.view.hide_form(),
            SessionState::Idle => {}
        }

        if let Some(entry) = self.store.get(index) {
            self.view.render_edit_form(&entry.activity);
        }
        self.state = SessionState::Editing { id: id.clone() };
        debug!("[Session] Editing {} at index {}", id, index);
        Ok(())
    }

    /// Submit the edit form, replacing the activity at its current index.
    ///
    /// The replacement keeps the original id, position and creation time.
    pub fn submit_edit(&mut self, input: ActivityInput) -> Result<()> {
        let SessionState::Editing { id } = &self.state else {
            return Err(self.invalid("submit_edit"));
        };
        let id = id.clone();

        let Some(index) = self.store.find_index_by_id(&id) else {
            self.view.remove_edit_form();
            self.state = SessionState::Idle;
            return Err(ActivityLogError::NotFound {
                id: id.to_string(),
            });
        };

        let len = self.store.len();
        let replacement = self
            .store
            .get(index)
            .ok_or_precondition("submit_edit", index, len)?
            .activity
            .replacement(input)
            .map_err(|e| self.report(e))?;

        let marker = self
            .map_ready
            .then(|| draw_marker(&mut self.map, &replacement));
        let old = self.store.replace_at(index, replacement, marker)?;
        if let Some(old_marker) = old.marker {
            self.map.remove_marker(old_marker);
        }

        self.view.remove_edit_form();
        if self.sort_key.is_some() {
            self.render_full_list();
        } else if let Some(entry) = self.store.get(index) {
            self.view
                .render_row(&entry.activity, RowAnchor::Replace(id.clone()));
        }
        self.refresh_summary();
        self.persist();
        self.state = SessionState::Idle;

        info!("[Session] Edited {} at index {}", id, index);
        Ok(())
    }

    /// Close the edit form without saving.
    pub fn cancel_edit(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Editing { .. }) {
            return Err(self.invalid("cancel_edit"));
        }
        self.view.remove_edit_form();
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Index of the activity being edited, resolved now.
    pub fn editing_index(&self) -> Option<usize> {
        match &self.state {
            SessionState::Editing { id } => self.store.find_index_by_id(id),
            _ => None,
        }
    }

    // ========================================================================
    // Deleting, Sorting, Reset
    // ========================================================================

    /// Delete an activity. Valid in any state.
    pub fn delete(&mut self, id: &ActivityId) -> Result<()> {
        let index = self
            .store
            .find_index_by_id(id)
            .ok_or_not_found(id.as_str())?;

        let entry = self.store.remove_at(index)?;
        if let Some(marker) = entry.marker {
            self.map.remove_marker(marker);
        }
        self.view.remove_row(id);

        if matches!(&self.state, SessionState::Editing { id: editing } if editing == id) {
            self.view.remove_edit_form();
            self.state = SessionState::Idle;
        }

        self.refresh_summary();
        self.persist();

        info!(
            "[Session] Deleted {} ({} activities left)",
            id,
            self.store.len()
        );
        Ok(())
    }

    /// Re-render the list ordered by `key`. The store order is untouched.
    pub fn sort(&mut self, key: Option<SortKey>) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("sort"));
        }
        self.sort_key = key;
        self.render_full_list();
        debug!("[Session] Sorted by {:?}", key);
        Ok(())
    }

    /// Discard every activity, marker and the stored history. Valid in any state.
    pub fn reset(&mut self) -> Result<()> {
        for entry in self.store.clear() {
            if let Some(marker) = entry.marker {
                self.map.remove_marker(marker);
            }
        }

        match self.state {
            SessionState::Editing { .. } => self.view.remove_edit_form(),
            SessionState::Creating { .. } => self.view.hide_form(),
            SessionState::Idle => {}
        }
        self.state = SessionState::Idle;
        self.sort_key = None;

        self.view.clear_rows();
        self.refresh_summary();

        info!("[Session] Reset");
        self.persistence.reset()
    }

    // ========================================================================
    // Map Navigation
    // ========================================================================

    /// Pan the map to an activity's position.
    pub fn focus(&mut self, id: &ActivityId) -> Result<()> {
        let index = self
            .store
            .find_index_by_id(id)
            .ok_or_not_found(id.as_str())?;
        if !self.map_ready {
            return Err(ActivityLogError::InvalidTransition {
                event: "focus",
                state: "without a map",
            });
        }
        if let Some(entry) = self.store.get(index) {
            self.map
                .center_on(entry.activity.position(), self.config.zoom_level);
        }
        Ok(())
    }

    /// Fit the map to every drawn marker. Does nothing without markers.
    pub fn show_all(&mut self) {
        let markers: Vec<&M::Marker> = self.store.markers().flatten().collect();
        if markers.is_empty() {
            return;
        }
        self.map.fit_to_markers(&markers);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn store(&self) -> &ActivityStore<Option<M::Marker>> {
        &self.store
    }

    pub fn sort_key(&self) -> Option<SortKey> {
        self.sort_key
    }

    pub fn is_map_ready(&self) -> bool {
        self.map_ready
    }

    pub fn total_distance(&self) -> f64 {
        self.store.total_distance()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn persistence(&self) -> &PersistenceBridge<K> {
        &self.persistence
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn render_full_list(&mut self) {
        let rows = self.store.sorted_view(self.sort_key);
        self.view.render_list(&rows);
    }

    /// Render the total and toggle the toolbar and empty-state message.
    fn refresh_summary(&mut self) {
        let has_activities = !self.store.is_empty();
        self.view.render_total(self.store.total_distance());
        self.view.set_toolbar_visible(has_activities);
        self.view.set_empty_message_visible(!has_activities);
    }

    fn persist(&mut self) {
        if let Err(e) = self.persistence.save(&self.store) {
            warn!("[Session] Failed to persist activities: {}", e);
        }
    }

    /// Show a user-facing error on the notification surface and pass it on.
    fn report(&mut self, err: ActivityLogError) -> ActivityLogError {
        if let Some(message) = err.user_message() {
            self.view.notify(message);
        }
        debug!("[Session] Rejected in {}: {}", self.state.name(), err);
        err
    }

    fn invalid(&self, event: &'static str) -> ActivityLogError {
        ActivityLogError::InvalidTransition {
            event,
            state: self.state.name(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Recording fakes for the session's collaborators.

#![allow(dead_code)]

use std::collections::HashSet;

use activity_logger::{
    Activity, ActivityId, ActivityLogError, GpsPoint, KeyValueStore, ListView, MapSurface,
    PositionProvider, Result, RowAnchor, SessionConfig, SessionController,
};

/// Install a test logger once; repeated calls are ignored.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct FakePosition(pub Option<GpsPoint>);

impl PositionProvider for FakePosition {
    fn current_position(&mut self) -> Result<GpsPoint> {
        self.0.ok_or(ActivityLogError::PositionUnavailable {
            message: "permission denied".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerHandle(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedMarker {
    pub handle: MarkerHandle,
    pub position: GpsPoint,
    pub popup_text: String,
    pub style_class: String,
}

#[derive(Debug, Default)]
pub struct RecordingMap {
    next_handle: u32,
    pub placed: Vec<PlacedMarker>,
    pub live: HashSet<MarkerHandle>,
    pub centered: Vec<(GpsPoint, u8)>,
    pub fits: Vec<Vec<MarkerHandle>>,
}

impl MapSurface for RecordingMap {
    type Marker = MarkerHandle;

    fn place_marker(&mut self, position: GpsPoint, popup_text: &str, style_class: &str) -> MarkerHandle {
        self.next_handle += 1;
        let handle = MarkerHandle(self.next_handle);
        self.placed.push(PlacedMarker {
            handle,
            position,
            popup_text: popup_text.to_string(),
            style_class: style_class.to_string(),
        });
        self.live.insert(handle);
        handle
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        assert!(self.live.remove(&marker), "marker {:?} removed twice", marker);
    }

    fn center_on(&mut self, position: GpsPoint, zoom: u8) {
        self.centered.push((position, zoom));
    }

    fn fit_to_markers(&mut self, markers: &[&MarkerHandle]) {
        self.fits.push(markers.iter().map(|m| **m).collect());
    }
}

#[derive(Debug, Default)]
pub struct RecordingView {
    pub rows: Vec<ActivityId>,
    pub edit_form: Option<ActivityId>,
    pub form_open: bool,
    pub total_km: f64,
    pub toolbar_visible: bool,
    pub empty_message_visible: bool,
    pub notifications: Vec<String>,
    pub modal_open: bool,
    pub full_renders: usize,
}

impl ListView for RecordingView {
    fn render_row(&mut self, activity: &Activity, anchor: RowAnchor) {
        match anchor {
            RowAnchor::End => self.rows.push(activity.id().clone()),
            RowAnchor::Replace(id) => {
                let slot = self
                    .rows
                    .iter_mut()
                    .find(|row| **row == id)
                    .expect("replaced row must exist");
                *slot = activity.id().clone();
            }
        }
    }

    fn remove_row(&mut self, id: &ActivityId) {
        self.rows.retain(|row| row != id);
    }

    fn render_list(&mut self, activities: &[&Activity]) {
        self.rows = activities.iter().map(|a| a.id().clone()).collect();
        self.full_renders += 1;
    }

    fn clear_rows(&mut self) {
        self.rows.clear();
    }

    fn render_edit_form(&mut self, activity: &Activity) {
        assert!(self.edit_form.is_none(), "edit form already open");
        self.edit_form = Some(activity.id().clone());
    }

    fn remove_edit_form(&mut self) {
        self.edit_form = None;
    }

    fn show_form(&mut self) {
        self.form_open = true;
    }

    fn hide_form(&mut self) {
        self.form_open = false;
    }

    fn render_total(&mut self, total_km: f64) {
        self.total_km = total_km;
    }

    fn set_toolbar_visible(&mut self, visible: bool) {
        self.toolbar_visible = visible;
    }

    fn set_empty_message_visible(&mut self, visible: bool) {
        self.empty_message_visible = visible;
    }

    fn notify(&mut self, message: &str) {
        self.notifications.push(message.to_string());
        self.modal_open = true;
    }

    fn dismiss_notification(&mut self) {
        self.modal_open = false;
    }
}

pub type TestSession<K> = SessionController<FakePosition, RecordingMap, K, RecordingView>;

pub const HOME: GpsPoint = GpsPoint {
    latitude: 46.5197,
    longitude: 6.6323,
};

/// Build and start a session over `backend`.
pub fn start_session<K: KeyValueStore>(backend: K, position: Option<GpsPoint>) -> TestSession<K> {
    init_logging();
    let mut session = SessionController::new(
        FakePosition(position),
        RecordingMap::default(),
        backend,
        RecordingView::default(),
        SessionConfig::default(),
    )
    .expect("default config is valid");
    session.start();
    session
}

/// Assert that list rows, store entries and live markers describe the same activities.
pub fn assert_consistent<K: KeyValueStore>(session: &TestSession<K>) {
    let store = session.store();
    let markers: Vec<MarkerHandle> = store.markers().flatten().copied().collect();
    if session.is_map_ready() {
        assert_eq!(markers.len(), store.len(), "every activity has a marker");
    }
    let live = &session.map().live;
    assert_eq!(live.len(), markers.len(), "no stray markers on the map");
    for marker in &markers {
        assert!(live.contains(marker));
    }

    let mut row_ids = session.view().rows.clone();
    let mut store_ids: Vec<ActivityId> = store.activities().map(|a| a.id().clone()).collect();
    row_ids.sort();
    store_ids.sort();
    assert_eq!(row_ids, store_ids, "list rows match store");

    let sum: f64 = store.activities().map(|a| a.distance_km()).sum();
    assert_eq!(session.total_distance(), sum);
    assert_eq!(session.view().total_km, sum);
}

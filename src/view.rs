//! Interfaces for the collaborators a session drives.
//!
//! The host application implements these over its geolocation API, map
//! widget and page. The session only consumes them.

use crate::activity::{Activity, ActivityId};
use crate::error::Result;
use crate::GpsPoint;

/// One-shot source of the user's current position.
pub trait PositionProvider {
    /// Return the current position, or `PositionUnavailable` on failure.
    fn current_position(&mut self) -> Result<GpsPoint>;
}

/// The interactive map the markers are drawn on.
pub trait MapSurface {
    /// Opaque handle to a drawn marker.
    type Marker;

    fn place_marker(&mut self, position: GpsPoint, popup_text: &str, style_class: &str)
        -> Self::Marker;

    fn remove_marker(&mut self, marker: Self::Marker);

    fn center_on(&mut self, position: GpsPoint, zoom: u8);

    fn fit_to_markers(&mut self, markers: &[&Self::Marker]);
}

/// Where to put a rendered row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAnchor {
    /// At the end of the list
    End,
    /// In place of the existing row with this id
    Replace(ActivityId),
}

/// The activity list, its forms, the totals toolbar and the notification modal.
pub trait ListView {
    fn render_row(&mut self, activity: &Activity, anchor: RowAnchor);

    fn remove_row(&mut self, id: &ActivityId);

    /// Replace all rows with `activities`, top to bottom.
    fn render_list(&mut self, activities: &[&Activity]);

    fn clear_rows(&mut self);

    /// Open the inline edit form for `activity`, hiding its row.
    fn render_edit_form(&mut self, activity: &Activity);

    fn remove_edit_form(&mut self);

    /// Open the new-activity form.
    fn show_form(&mut self);

    /// Close the new-activity form and clear its fields.
    fn hide_form(&mut self);

    fn render_total(&mut self, total_km: f64);

    fn set_toolbar_visible(&mut self, visible: bool);

    fn set_empty_message_visible(&mut self, visible: bool);

    /// Show a message on the shared notification surface.
    fn notify(&mut self, message: &str);

    fn dismiss_notification(&mut self);
}

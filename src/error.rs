//! Unified error handling for the activity logger.
//!
//! User-facing failures (validation, position) carry a message for the
//! notification surface. Persistence corruption is recovered internally and
//! precondition violations indicate a bug in the caller.

use thiserror::Error;

/// Message shown when a form field is not a positive finite number.
pub const INVALID_INPUT_MESSAGE: &str = "Input must be a positive number!";

/// Message shown when the position provider fails.
pub const POSITION_UNAVAILABLE_MESSAGE: &str =
    "Could not get your location! Please check your internet connection.";

/// Message shown when a clicked map position has no usable coordinates.
pub const INVALID_POSITION_MESSAGE: &str = "That map position is not valid!";

/// Unified error type for activity logger operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActivityLogError {
    /// A form field is zero, negative, NaN or infinite
    #[error("Invalid {field}: {value} is not a positive finite number")]
    Validation { field: &'static str, value: f64 },

    /// Coordinates are non-finite or outside latitude/longitude range
    #[error("Invalid position ({latitude}, {longitude})")]
    InvalidPosition { latitude: f64, longitude: f64 },

    /// The position provider could not deliver coordinates
    #[error("Position unavailable: {message}")]
    PositionUnavailable { message: String },

    /// Stored history could not be parsed
    #[error("Persisted history is corrupt: {message}")]
    PersistenceCorrupt { message: String },

    /// The key-value backend failed
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Store accessed with an index that does not exist
    #[error("{operation} at index {index} out of range (len {len})")]
    Precondition {
        operation: &'static str,
        index: usize,
        len: usize,
    },

    /// No activity with this id is in the store
    #[error("Activity '{id}' not found")]
    NotFound { id: String },

    /// Event is not accepted in the current session state
    #[error("Event '{event}' is not valid while {state}")]
    InvalidTransition {
        event: &'static str,
        state: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ActivityLogError {
    /// Text for the notification surface, or `None` for errors that are
    /// never shown to the user.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            ActivityLogError::Validation { .. } => Some(INVALID_INPUT_MESSAGE),
            ActivityLogError::InvalidPosition { .. } => Some(INVALID_POSITION_MESSAGE),
            ActivityLogError::PositionUnavailable { .. } => Some(POSITION_UNAVAILABLE_MESSAGE),
            _ => None,
        }
    }

    /// Whether this error is a programmer error rather than a runtime condition.
    pub fn is_precondition(&self) -> bool {
        matches!(self, ActivityLogError::Precondition { .. })
    }
}

impl From<serde_json::Error> for ActivityLogError {
    fn from(err: serde_json::Error) -> Self {
        ActivityLogError::PersistenceCorrupt {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for ActivityLogError {
    fn from(err: rusqlite::Error) -> Self {
        ActivityLogError::Storage {
            message: err.to_string(),
        }
    }
}

/// Result type alias for activity logger operations.
pub type Result<T> = std::result::Result<T, ActivityLogError>;

/// Extension trait for converting Option to ActivityLogError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a precondition error for an index lookup.
    fn ok_or_precondition(self, operation: &'static str, index: usize, len: usize) -> Result<T>;

    /// Convert Option to Result with a not-found error for an activity id.
    fn ok_or_not_found(self, id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_precondition(self, operation: &'static str, index: usize, len: usize) -> Result<T> {
        self.ok_or(ActivityLogError::Precondition {
            operation,
            index,
            len,
        })
    }

    fn ok_or_not_found(self, id: &str) -> Result<T> {
        self.ok_or_else(|| ActivityLogError::NotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ActivityLogError::Precondition {
            operation: "remove_at",
            index: 3,
            len: 2,
        };
        assert!(err.to_string().contains("remove_at"));
        assert!(err.to_string().contains("len 2"));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_user_messages() {
        let validation = ActivityLogError::Validation {
            field: "distance",
            value: -1.0,
        };
        assert_eq!(validation.user_message(), Some(INVALID_INPUT_MESSAGE));

        let corrupt = ActivityLogError::PersistenceCorrupt {
            message: "eof".to_string(),
        };
        assert_eq!(corrupt.user_message(), None);

        let position = ActivityLogError::InvalidPosition {
            latitude: f64::NAN,
            longitude: 20.0,
        };
        assert_eq!(position.user_message(), Some(INVALID_POSITION_MESSAGE));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_precondition("replace_at", 0, 0);
        assert!(matches!(result, Err(ActivityLogError::Precondition { .. })));

        let result = None::<usize>.ok_or_not_found("abc");
        assert_eq!(
            result,
            Err(ActivityLogError::NotFound {
                id: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_json_error_is_corrupt() {
        let err: ActivityLogError = serde_json::from_str::<Vec<u8>>("{oops")
            .unwrap_err()
            .into();
        assert!(matches!(err, ActivityLogError::PersistenceCorrupt { .. }));
    }
}

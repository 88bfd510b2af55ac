//! Error taxonomy for the placement engine.

use thiserror::Error;

/// Why a single configuration's action did not complete on this tick.
///
/// None of these ever stop the continuous loop; they are isolated to one
/// configuration and surfaced to callers as an outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// No matching window or process.
    #[error("no matching window or process")]
    NotFound,

    /// The window or process vanished between two platform calls.
    #[error("window {window:#x} disappeared during {operation}")]
    StaleHandle { window: u32, operation: &'static str },

    /// The effective target rect has a non-positive width or height.
    #[error("effective size {width}x{height} is not positive")]
    InvalidGeometry { width: i32, height: i32 },

    /// The platform call itself reported failure.
    #[error("{operation} failed: {reason}")]
    OsCallFailed {
        operation: &'static str,
        reason: String,
    },
}

impl PlacementError {
    pub fn os(operation: &'static str, reason: impl ToString) -> Self {
        Self::OsCallFailed {
            operation,
            reason: reason.to_string(),
        }
    }

    /// Expected conditions under normal OS churn; these are not worth a warning.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::NotFound | Self::StaleHandle { .. })
    }
}

pub type PlacementResult<T> = Result<T, PlacementError>;

//! Unified error handling for track processing.
//!
//! Two failure classes exist: fatal ones, returned as [`TrackError`] and meant to
//! abort the run, and per-record ones (a malformed CSV row, a point with invalid
//! coordinates) which parsers log and skip without surfacing here.

use thiserror::Error;

/// Unified error type for track-engine operations.
#[derive(Debug, Error)]
pub enum TrackError {
    /// The geodesic iteration did not converge. Happens for near-antipodal
    /// points; the caller must abort, retrying gives the same answer.
    #[error("distance between {from:?} and {to:?} did not converge after {iterations} iterations")]
    Computation {
        from: (f64, f64),
        to: (f64, f64),
        iterations: usize,
    },

    /// A numeric parameter is out of its accepted range
    #[error("invalid {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// Unknown filter or output selector
    #[error("unknown {kind} selector '{value}'")]
    UnknownSelector { kind: &'static str, value: String },

    /// Input format could not be determined
    #[error("cannot determine input format of '{0}'")]
    UnknownFormat(String),

    #[error("GPX parsing error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] xml::reader::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        TrackError::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    /// True for errors that mean the input itself is unusable for the whole run.
    pub fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            TrackError::Computation { .. } | TrackError::Gpx(_) | TrackError::Xml(_)
        )
    }
}

/// Result type alias for track-engine operations.
pub type Result<T> = std::result::Result<T, TrackError>;

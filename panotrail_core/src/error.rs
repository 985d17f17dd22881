//! Error types for dataset loading and provider queries.

use panotrail_env::FetchError;
use thiserror::Error;

/// Errors raised while turning raw rows into a [`Dataset`](crate::Dataset).
///
/// All of these are fatal for session setup; nothing is retried.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset is empty")]
    Empty,

    #[error("Dataset has no valid rows ({dropped} dropped)")]
    NoValidRows { dropped: usize },

    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the image provider to its caller.
///
/// Empty cells and unknown image ids are not errors; see
/// [`ImageProvider::images_in_cell`](crate::ImageProvider::images_in_cell) and
/// [`ImageProvider::images_by_id`](crate::ImageProvider::images_by_id).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    #[error("Invalid coordinates: lat={lat}, lng={lng}")]
    InvalidCoordinates { lat: f64, lng: f64 },
}

impl ProviderError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

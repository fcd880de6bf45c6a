//! Error types for photo-geocoder.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for photo-geocoder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for photo-geocoder.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("exiftool executable not found ({0}). Install exiftool and ensure it is in PATH")]
    ExifToolNotFound(std::io::Error),

    #[error("exiftool process terminated unexpectedly")]
    ProcessTerminated,

    #[error("Failed to read metadata from {path}: {message}")]
    MetadataRead { path: PathBuf, message: String },

    #[error("Failed to write metadata to {path}: {message}")]
    MetadataWrite { path: PathBuf, message: String },

    #[error("Reverse geocoding failed for ({lat:.5}, {lng:.5}): {message}")]
    Geocoding { lat: f64, lng: f64, message: String },
}

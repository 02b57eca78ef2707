//! Error types for the snapshot pipeline

use thiserror::Error;

/// Result type alias for snapshot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while snapshotting a node
#[derive(Error, Debug)]
pub enum Error {
    /// A resource could not be fetched and no placeholder was configured
    #[error("Failed to fetch {url}: {reason}")]
    FetchError { url: String, reason: String },

    /// Encoded image or vector container could not be decoded
    #[error("Decode failed: {0}")]
    DecodeError(String),

    /// A stylesheet refused rule enumeration
    #[error("Stylesheet is not accessible: {0}")]
    StyleSheetAccessError(String),

    /// Failed to produce or encode a raster output
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Invalid render options
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Transport-level error (connection refused, malformed URL, ...)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The host does not provide a required capability
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Convenience constructor for fetch failures
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::FetchError {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::RenderError(err.to_string())
    }
}

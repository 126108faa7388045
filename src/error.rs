use thiserror::Error;

/// Failure to turn an item's source into a displayable resource.
#[derive(Debug, Error)]
#[error("failed to load {item_name}")]
pub struct MediaLoadError {
    /// Display name of the item that failed (also its cache key).
    pub item_name: String,
    #[source]
    pub cause: LoadFailure,
}

/// What went wrong while resolving an item.
#[derive(Debug, Error)]
pub enum LoadFailure {
    /// Raw bytes could not be read, e.g. the file was removed after the scan.
    #[error("fetch failed: {0}")]
    Fetch(#[source] std::io::Error),

    /// The fallback decoder rejected the payload.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Fallback decode failed for a corrupt or unsupported payload.
#[derive(Debug, Error)]
#[error("could not decode .{extension} payload: {cause}")]
pub struct DecodeError {
    pub extension: String,
    pub cause: String,
}

impl DecodeError {
    pub fn new(extension: impl Into<String>, cause: impl ToString) -> Self {
        Self {
            extension: extension.into(),
            cause: cause.to_string(),
        }
    }
}

impl MediaLoadError {
    pub fn fetch(item_name: impl Into<String>, err: std::io::Error) -> Self {
        Self {
            item_name: item_name.into(),
            cause: LoadFailure::Fetch(err),
        }
    }

    pub fn decode(item_name: impl Into<String>, err: DecodeError) -> Self {
        Self {
            item_name: item_name.into(),
            cause: LoadFailure::Decode(err),
        }
    }
}

/// Enumeration failures, raised before a session starts.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The library root is missing or not a directory.
    #[error("invalid media directory: {}", .0.display())]
    BadDir(std::path::PathBuf),

    /// The scan completed but found nothing to show.
    #[error("no supported media files found under {}", .0.display())]
    EmptyScan(std::path::PathBuf),
}

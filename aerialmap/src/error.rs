use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors emitted by the aerial photo processing pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// An input file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Any other filesystem failure, tagged with the path involved.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A JSON document could not be encoded or decoded.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A CSV input could not be decoded.
    #[error("invalid CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    /// The PDF structure could not be parsed or lacks a required object.
    #[error("failed to parse PDF {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },
    /// The geocoding service failed or returned an unusable answer.
    #[error("geocoding failed for {query:?}: {message}")]
    Geocode { query: String, message: String },
    /// Both control points share a pixel coordinate on one axis.
    #[error("control points share the same {axis} pixel coordinate ({value})")]
    DegenerateControlPoints { axis: char, value: f64 },
    /// A control point has a NaN or infinite coordinate.
    #[error("control point {axis} coordinates must be finite")]
    NonFiniteControlPoint { axis: char },
    /// No control-point pair was recorded for an index document.
    #[error("no address pair found for index {0}")]
    MissingControlPoints(String),
    /// The record creation time could not be formatted.
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
    /// Batch metadata lacks something the workflow depends on.
    #[error("missing data: {0}")]
    MissingData(String),
}

impl Error {
    /// Wraps an I/O error, promoting `NotFound` to [`Error::NotFound`].
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(path)
        } else {
            Error::Io { path, source }
        }
    }

    pub(crate) fn pdf(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Error::Pdf {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn geocode(query: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Geocode {
            query: query.into(),
            message: message.into(),
        }
    }

    /// `true` when the error stems from a missing input file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_distinguished_from_other_io_failures() {
        let missing = Error::io(
            "nowhere.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(missing.is_not_found());

        let denied = Error::io(
            "locked.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!denied.is_not_found());
        assert!(denied.to_string().contains("locked.json"));
    }
}

//! Feed error taxonomy
//!
//! Field-level parse failures never appear in this enum: a
//! malformed field becomes an absent marker in the window and never
//! surfaces as an error.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from catalog loading, source selection and window I/O
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Cannot read source directory {}: {source}", path.display())]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No matching files found in {}", directory.display())]
    EmptyCatalog { directory: PathBuf },

    #[error("Selection index {index} is out of range for a catalog of {available} file(s)")]
    SelectionOutOfRange { index: usize, available: usize },

    #[error("Source file {name} is not in the catalog")]
    SourceNotInCatalog { name: String },

    #[error("Source file {} is unavailable: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write window to {}: {source}", path.display())]
    WindowWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Feed channel closed")]
    ChannelClosed,
}

impl FeedError {
    /// True when the error means "nothing to serve" rather than a failure
    pub fn is_empty_catalog(&self) -> bool {
        matches!(self, FeedError::EmptyCatalog { .. })
    }
}

/// Result alias for feed operations
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_catalog_is_flagged() {
        let err = FeedError::EmptyCatalog {
            directory: PathBuf::from("./csv_files"),
        };
        assert!(err.is_empty_catalog());
        assert!(!FeedError::ChannelClosed.is_empty_catalog());
    }

    #[test]
    fn test_source_unavailable_message_names_path() {
        let err = FeedError::SourceUnavailable {
            path: PathBuf::from("/data/ecg.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/ecg.csv"));
        assert!(msg.contains("gone"));
    }
}

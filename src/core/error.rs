//! Defines the custom error type for the `core` module.

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for the `core` module.
///
/// This enum encapsulates all possible errors that can occur while building
/// the filtered directory snapshot.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Represents an I/O error, typically from file system operations.
    #[error("I/O error for path {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    /// Represents a path that was expected to be a directory but was not.
    #[error("Path is not a valid directory: {0}")]
    NotADirectory(PathBuf),

    /// Represents a scan root that is itself excluded by the active
    /// ignore rules, leaving nothing to analyze.
    #[error("Scan root is excluded by the active ignore rules: {0}")]
    RootIgnored(PathBuf),
}

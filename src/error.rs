//! Error types for the tail reader library.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tail reader operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when opening or reading the tracked file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Seeking to the requested start offset failed.
    #[error("seek failed: {} to offset {offset}: {source}", .path.display())]
    Seek {
        path: PathBuf,
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    /// Capturing file metadata at open time failed.
    #[error("stat failed: {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Establishing the change subscription failed.
    #[error("watch failed: {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The change subscription reported an error while a read was waiting.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Releasing the change subscription failed during close.
    #[error("unwatch failed: {}: {source}", .path.display())]
    Unwatch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The tracked file was removed.
    #[error("File removed: {}", .path.display())]
    FileRemoved { path: PathBuf },

    /// The tracked file was renamed away from its path.
    #[error("File renamed: {}", .path.display())]
    FileRenamed { path: PathBuf },
}

/// A convenient Result type for tail reader operations.
pub type Result<T> = std::result::Result<T, Error>;

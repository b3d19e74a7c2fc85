//! Error types for the retrieval engine.
//!
//! These never escape [`super::RetrievalEngine::retrieve_file`]: every
//! failure is folded into a [`super::TransferOutcome`] with status `Failed`.
//! They are public so the client can be driven directly in tests and tools.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::TransportError;

/// Errors that can occur while transferring one file.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// HEAD or GET failed (connection, timeout, non-2xx, stream error).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// File system error while staging, renaming or deleting a file.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Received body size disagrees with the advertised `Content-Length`.
    #[error("size mismatch for {path}: expected {expected_bytes} bytes, got {actual_bytes}")]
    SizeMismatch {
        /// Destination that failed verification.
        path: PathBuf,
        /// Size advertised by the server.
        expected_bytes: u64,
        /// Size actually received.
        actual_bytes: u64,
    },
}

impl RetrievalError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a size mismatch error.
    pub fn size_mismatch(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::SizeMismatch {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }
}

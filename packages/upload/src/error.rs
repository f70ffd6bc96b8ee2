//! Error types for the upload pipeline.

use std::path::PathBuf;

/// Why a remote metadata lookup did not produce metadata.
///
/// Every variant is recoverable: the overwrite policy treats all of them as
/// "proceed with upload".
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The object does not exist.
    #[error("object not found")]
    NotFound,

    /// The backend cannot look objects up by key (e.g. a Glacier vault).
    #[error("backend does not support per-key metadata lookups")]
    Unsupported,

    /// The lookup itself failed (network, permissions, throttling).
    #[error("metadata lookup failed: {source}")]
    Failed {
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors returned by a [`RemoteStore`](crate::RemoteStore) transfer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The remote service rejected or failed the transfer.
    #[error("Failed to upload {location}: {source}")]
    Upload {
        /// Human-readable destination (`s3://bucket/key`, `glacier://vault`).
        location: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The service answered but left out a field the transfer needs.
    #[error("Incomplete response uploading {location}: missing {field}")]
    MissingField {
        /// Human-readable destination.
        location: String,
        /// Name of the missing response field.
        field: &'static str,
    },

    /// The backend cannot store a zero-byte object.
    #[error("Cannot upload empty file to {location}")]
    EmptyObject {
        /// Human-readable destination.
        location: String,
    },

    /// I/O error reading the local file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal errors that stop an upload run.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The uploaded object's checksum does not match the local file.
    #[error("Verification failed for {}: {location} reports {digest}", .path.display())]
    VerificationFailed {
        /// Local file.
        path: PathBuf,
        /// Remote destination.
        location: String,
        /// Digest reported by the remote side.
        digest: String,
    },

    /// The uploaded object's checksum could not be obtained.
    #[error("Cannot verify {location}: {reason}")]
    DigestUnavailable {
        /// Remote destination.
        location: String,
        /// What went wrong fetching or parsing the digest.
        reason: String,
    },

    /// The transfer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Walking or reading a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

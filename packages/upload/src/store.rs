//! The seam between the pipeline and a storage backend.

use std::sync::Arc;

use async_trait::async_trait;
use titanic_upload_models::{FileEntry, RemoteDigest, RemoteObjectMeta};

use crate::error::{LookupError, StoreError};
use crate::progress::TransferProgress;

/// What a backend knows about an object it just stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Checksum returned by the completing request, when the backend has no
    /// way to look it up again afterwards. `None` means "ask
    /// [`RemoteStore::head_object`]".
    pub digest: Option<RemoteDigest>,
    /// Backend-assigned identifier (Glacier archive ID).
    pub archive_id: Option<String>,
}

/// Remote operations the upload pipeline depends on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human-readable destination for `key`, used in logs and errors.
    fn location(&self, key: &str) -> String;

    /// Whether zero-byte files can be stored. Empty files are skipped
    /// before any remote call when this is `false`.
    fn accepts_empty(&self) -> bool {
        true
    }

    /// Fetch object metadata.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] if the object doesn't exist,
    /// [`LookupError::Unsupported`] if the backend cannot look up by key, or
    /// [`LookupError::Failed`] for anything else.
    async fn head_object(&self, key: &str) -> Result<RemoteObjectMeta, LookupError>;

    /// Upload `entry` under `entry.key`, reporting bytes sent through
    /// `progress`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the transfer fails.
    async fn upload_file(
        &self,
        entry: &FileEntry,
        progress: Arc<TransferProgress>,
    ) -> Result<UploadReceipt, StoreError>;
}

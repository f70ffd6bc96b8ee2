#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Glacier vault backend for titanic.
//!
//! Archives are uploaded with the Glacier multipart primitives. Every part
//! carries its own SHA-256 tree hash and the completed archive's tree hash
//! comes back in the upload receipt, where the uploader checks it against
//! the local file.
//!
//! Vaults have no per-key lookup, so [`RemoteStore::head_object`] always
//! answers [`LookupError::Unsupported`] and every file is uploaded. The
//! derived key is stored as the archive description. Vaults reject empty
//! archives, so zero-byte files are never sent.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_glacier::config::{Credentials, StalledStreamProtectionConfig};
use aws_sdk_glacier::primitives::ByteStream;
use futures::{StreamExt as _, TryStreamExt as _, stream};
use titanic_upload::checksum::{self, TREE_HASH_BLOCK};
use titanic_upload::{
    FileEntry, LookupError, RemoteDigest, RemoteObjectMeta, RemoteStore, StorageConfig,
    StoreError, TransferProgress, UploadReceipt, read_range,
};

/// Default target number of parts per archive.
pub const DEFAULT_PARTS: u64 = 1000;

/// Largest part size Glacier accepts (4 GiB).
pub const MAX_PART_SIZE: u64 = 4 << 30;

/// Glacier alias for the account owning the credentials.
const ACCOUNT_ID: &str = "-";

/// Uploads archives into one vault.
pub struct GlacierStore {
    client: aws_sdk_glacier::Client,
    vault: String,
    parts: u64,
    concurrency: usize,
}

impl GlacierStore {
    /// Creates a client from config-file credentials.
    ///
    /// `parts` is the target part count used to pick the part size and
    /// `concurrency` bounds the parts in flight for one archive.
    #[must_use]
    pub fn new(config: &StorageConfig, vault: &str, parts: u64, concurrency: usize) -> Self {
        let creds = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "titanic-config",
        );

        let mut builder = aws_sdk_glacier::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: aws_sdk_glacier::Client::from_conf(builder.build()),
            vault: vault.to_string(),
            parts: parts.max(1),
            concurrency: concurrency.max(1),
        }
    }

    fn upload_error(
        &self,
        key: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> StoreError {
        StoreError::Upload {
            location: self.location(key),
            source: source.into(),
        }
    }

    fn missing(&self, key: &str, field: &'static str) -> StoreError {
        StoreError::MissingField {
            location: self.location(key),
            field,
        }
    }

    async fn upload_parts(
        &self,
        entry: &FileEntry,
        upload_id: &str,
        part_size: u64,
        progress: &TransferProgress,
    ) -> Result<(), StoreError> {
        let count = entry.size.div_ceil(part_size);

        stream::iter(0..count)
            .map(|index| {
                self.upload_part(entry, upload_id, index * part_size, part_size, progress)
            })
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(())
    }

    async fn upload_part(
        &self,
        entry: &FileEntry,
        upload_id: &str,
        offset: u64,
        part_size: u64,
        progress: &TransferProgress,
    ) -> Result<(), StoreError> {
        let len = part_size.min(entry.size - offset);
        let data = read_range(&entry.path, offset, len).await?;
        let tree_hash = hex::encode(checksum::tree_hash_bytes(&data));

        self.client
            .upload_multipart_part()
            .account_id(ACCOUNT_ID)
            .vault_name(&self.vault)
            .upload_id(upload_id)
            .range(content_range(offset, len))
            .checksum(tree_hash)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| self.upload_error(&entry.key, e))?;

        progress.record(len);
        log::trace!("{}: bytes {offset}+{len} sent", entry.key);
        Ok(())
    }

    async fn abort(&self, entry: &FileEntry, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .account_id(ACCOUNT_ID)
            .vault_name(&self.vault)
            .upload_id(upload_id)
            .send()
            .await
        {
            log::warn!(
                "Failed to abort multipart upload {upload_id} for {}: {e}",
                self.location(&entry.key)
            );
        }
    }
}

#[async_trait]
impl RemoteStore for GlacierStore {
    fn location(&self, key: &str) -> String {
        format!("glacier://{}/{key}", self.vault)
    }

    fn accepts_empty(&self) -> bool {
        false
    }

    async fn head_object(&self, _key: &str) -> Result<RemoteObjectMeta, LookupError> {
        Err(LookupError::Unsupported)
    }

    async fn upload_file(
        &self,
        entry: &FileEntry,
        progress: Arc<TransferProgress>,
    ) -> Result<UploadReceipt, StoreError> {
        if entry.size == 0 {
            return Err(StoreError::EmptyObject {
                location: self.location(&entry.key),
            });
        }
        let part_size = part_size_for(entry.size, self.parts);

        let initiated = self
            .client
            .initiate_multipart_upload()
            .account_id(ACCOUNT_ID)
            .vault_name(&self.vault)
            .archive_description(&entry.key)
            .part_size(part_size.to_string())
            .send()
            .await
            .map_err(|e| self.upload_error(&entry.key, e))?;

        let upload_id = initiated
            .upload_id()
            .ok_or_else(|| self.missing(&entry.key, "uploadId"))?
            .to_string();

        log::debug!(
            "{}: vault upload {upload_id}, part size {part_size}",
            entry.key
        );

        let result = self
            .finish_upload(entry, &upload_id, part_size, &progress)
            .await;
        if result.is_err() {
            self.abort(entry, &upload_id).await;
        }
        result
    }
}

impl GlacierStore {
    async fn finish_upload(
        &self,
        entry: &FileEntry,
        upload_id: &str,
        part_size: u64,
        progress: &TransferProgress,
    ) -> Result<UploadReceipt, StoreError> {
        self.upload_parts(entry, upload_id, part_size, progress)
            .await?;

        let path = entry.path.clone();
        let tree_hash = tokio::task::spawn_blocking(move || checksum::tree_hash_file(&path))
            .await
            .map_err(std::io::Error::other)??;

        let completed = self
            .client
            .complete_multipart_upload()
            .account_id(ACCOUNT_ID)
            .vault_name(&self.vault)
            .upload_id(upload_id)
            .archive_size(entry.size.to_string())
            .checksum(tree_hash)
            .send()
            .await
            .map_err(|e| self.upload_error(&entry.key, e))?;

        let archive_id = completed
            .archive_id()
            .ok_or_else(|| self.missing(&entry.key, "archiveId"))?;
        let remote_hash = completed
            .checksum()
            .ok_or_else(|| self.missing(&entry.key, "checksum"))?;

        Ok(UploadReceipt {
            digest: Some(RemoteDigest::TreeHash(remote_hash.to_string())),
            archive_id: Some(archive_id.to_string()),
        })
    }
}

/// Smallest power-of-two multiple of 1 MiB that fits `size` into at most
/// `parts` parts, capped at [`MAX_PART_SIZE`].
#[must_use]
pub fn part_size_for(size: u64, parts: u64) -> u64 {
    let parts = parts.max(1);
    let mut part_size = TREE_HASH_BLOCK as u64;
    while part_size < MAX_PART_SIZE && size.div_ceil(part_size) > parts {
        part_size *= 2;
    }
    part_size
}

/// `Content-Range` value for the part at `offset`.
fn content_range(offset: u64, len: u64) -> String {
    format!("bytes {offset}-{}/*", (offset + len).saturating_sub(1))
}

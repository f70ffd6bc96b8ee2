#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! S3 backend for titanic.
//!
//! Implements [`RemoteStore`] on top of `aws-sdk-s3`:
//!
//! - `head_object` maps `HeadObject` to [`RemoteObjectMeta`], turning a
//!   `NotFound` into [`LookupError::NotFound`].
//! - `upload_file` sends files up to [`TransferConfig::multipart_threshold`]
//!   with a single `PutObject` and everything larger as a multipart upload
//!   with up to [`TransferConfig::concurrency`] parts in flight.
//!
//! Credentials come from the config file only. Setting `endpoint` switches
//! to path-style addressing for S3-compatible services.

mod transfer;

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use chrono::{DateTime, Utc};
use titanic_upload::{
    FileEntry, LookupError, RemoteObjectMeta, RemoteStore, StorageConfig, StoreError,
    TransferProgress, UploadReceipt,
};

pub use transfer::{
    DEFAULT_PART_SIZE, MAX_PART_SIZE, MAX_PARTS, MULTIPART_THRESHOLD, TransferConfig,
    part_size_for,
};

/// Uploads into one S3 bucket.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    transfer: TransferConfig,
}

impl S3Store {
    /// Creates a client from config-file credentials.
    #[must_use]
    pub fn new(config: &StorageConfig, transfer: TransferConfig) -> Self {
        let creds = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "titanic-config",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            transfer,
        }
    }

    /// Bucket this store uploads into.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
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
}

#[async_trait]
impl RemoteStore for S3Store {
    fn location(&self, key: &str) -> String {
        format!("s3://{}/{key}", self.bucket)
    }

    async fn head_object(&self, key: &str) -> Result<RemoteObjectMeta, LookupError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(RemoteObjectMeta {
                etag: output.e_tag().map(str::to_string),
                last_modified: output.last_modified().and_then(to_utc),
                size: output.content_length().and_then(|n| u64::try_from(n).ok()),
            }),
            Err(err) => {
                // A missing object means "upload it", not a failed lookup.
                let service_err = err.as_service_error();
                if service_err
                    .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found)
                {
                    return Err(LookupError::NotFound);
                }
                Err(LookupError::Failed {
                    source: Box::new(err),
                })
            }
        }
    }

    async fn upload_file(
        &self,
        entry: &FileEntry,
        progress: Arc<TransferProgress>,
    ) -> Result<UploadReceipt, StoreError> {
        if entry.size <= self.transfer.multipart_threshold {
            self.put_single(entry, &progress).await?;
        } else {
            self.put_multipart(entry, &progress).await?;
        }
        // The ETag is re-read with HeadObject for verification.
        Ok(UploadReceipt::default())
    }
}

fn to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Walk, decide, upload, verify.
//!
//! The pipeline is sequential: the [`Walker`] yields regular
//! files in sorted order, the [`Uploader`] runs the overwrite [`policy`] for
//! each one, hands the body to a [`RemoteStore`] and finally confirms the
//! stored object with the [`checksum`] verifier. A verification mismatch is
//! fatal and stops the run.
//!
//! Backends (S3, Glacier) live in their own crates and only implement the
//! [`RemoteStore`] trait.

pub mod checksum;
mod error;
mod orchestrator;
pub mod policy;
pub mod progress;
mod range;
mod store;
mod walker;

#[cfg(test)]
mod test_support;

pub use error::{LookupError, StoreError, UploadError};
pub use orchestrator::{UploadOptions, Uploader};
pub use policy::Decision;
pub use progress::{NullProgress, ProgressCallback, ProgressFactory, TransferProgress};
pub use range::read_range;
pub use store::{RemoteStore, UploadReceipt};
pub use titanic_upload_models::{
    ETag, FileEntry, OverwriteMode, RemoteDigest, RemoteObjectMeta, SkipReason, StorageConfig,
    UploadState, UploadStats,
};
pub use walker::Walker;

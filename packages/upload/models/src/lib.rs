#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the titanic upload pipeline.
//!
//! These are the values that flow between the directory walker, the
//! overwrite policy, the checksum verifier and the storage backends:
//! [`FileEntry`] describes a local file, [`RemoteObjectMeta`] describes what
//! the remote side knows about the same key, and [`ETag`] /
//! [`RemoteDigest`] carry the remote checksum used for verification.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString, VariantNames};

/// How to treat a local file whose key already exists remotely.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OverwriteMode {
    /// Skip whenever the remote object exists.
    Never,
    /// Skip when the remote object is strictly newer than the local file.
    #[default]
    Older,
    /// Skip when the remote `ETag` matches the local content.
    Checksum,
    /// Always upload without looking at the remote side.
    Footgun,
}

impl OverwriteMode {
    /// Whether this mode needs a `HeadObject` before deciding.
    #[must_use]
    pub const fn needs_lookup(self) -> bool {
        !matches!(self, Self::Footgun)
    }
}

/// Connection settings read from the config file.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// AWS region (e.g. `us-east-1`).
    pub region: String,
    /// Access key ID.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Destination bucket.
    pub bucket: String,
    /// Optional key prefix for every uploaded object.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Optional S3-compatible endpoint URL (path-style addressing).
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// A regular local file queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path as produced by the walker.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Local modification time.
    pub modified: DateTime<Utc>,
    /// Object key the file is uploaded under.
    pub key: String,
}

impl FileEntry {
    /// Stats `path` and derives its remote key.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file cannot be stat'ed.
    pub fn from_path(path: &Path, prefix: Option<&str>) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            modified: DateTime::<Utc>::from(meta.modified()?),
            key: remote_key(path, prefix),
        })
    }
}

/// Derives the object key for a local path.
///
/// Root, drive prefix and `.` components are dropped so `/var/log/a.txt`
/// becomes `var/log/a.txt`. A non-empty `prefix` is joined in front with a
/// single `/`.
#[must_use]
pub fn remote_key(path: &Path, prefix: Option<&str>) -> String {
    let parts: Vec<Cow<'_, str>> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy()),
            Component::ParentDir => Some(Cow::Borrowed("..")),
            Component::RootDir | Component::Prefix(_) | Component::CurDir => None,
        })
        .collect();
    let relative = parts.join("/");

    match prefix.map(|p| p.trim_end_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{relative}"),
        None => relative,
    }
}

/// Remote object metadata from a successful `HeadObject`.
///
/// A value of this type means the object exists; absence is reported by the
/// lookup error instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteObjectMeta {
    /// Raw `ETag` header, quotes included if the service sent them.
    pub etag: Option<String>,
    /// `Last-Modified` timestamp.
    pub last_modified: Option<DateTime<Utc>>,
    /// Content length in bytes.
    pub size: Option<u64>,
}

impl RemoteObjectMeta {
    /// Whether the remote reported a non-empty `ETag`.
    #[must_use]
    pub fn has_etag(&self) -> bool {
        self.etag
            .as_deref()
            .is_some_and(|etag| !etag.trim_matches('"').is_empty())
    }
}

/// Errors from parsing an `ETag` header value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ETagParseError {
    /// The header was empty (or only quotes).
    #[error("empty ETag")]
    Empty,

    /// The part after `-` was not a positive integer.
    #[error("invalid part count in ETag {etag:?}")]
    InvalidPartCount {
        /// The offending `ETag`.
        etag: String,
    },
}

/// A parsed object `ETag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ETag {
    /// MD5 of the whole object (single-part upload).
    Plain {
        /// Lowercase hex digest.
        digest: String,
    },
    /// MD5 of the concatenated per-part MD5s, tagged with the part count.
    Composite {
        /// Lowercase hex digest.
        digest: String,
        /// Number of parts the object was uploaded in.
        parts: u64,
    },
}

impl ETag {
    /// The hex digest without the part-count suffix.
    #[must_use]
    pub fn digest(&self) -> &str {
        match self {
            Self::Plain { digest } | Self::Composite { digest, .. } => digest,
        }
    }
}

impl FromStr for ETag {
    type Err = ETagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean = s.trim().trim_matches('"');
        if clean.is_empty() {
            return Err(ETagParseError::Empty);
        }

        match clean.split_once('-') {
            None => Ok(Self::Plain {
                digest: clean.to_ascii_lowercase(),
            }),
            Some((digest, parts)) => {
                let parts = parts
                    .parse::<u64>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| ETagParseError::InvalidPartCount {
                        etag: clean.to_string(),
                    })?;
                Ok(Self::Composite {
                    digest: digest.to_ascii_lowercase(),
                    parts,
                })
            }
        }
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain { digest } => f.write_str(digest),
            Self::Composite { digest, parts } => write!(f, "{digest}-{parts}"),
        }
    }
}

/// The checksum a backend reports for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDigest {
    /// S3-style `ETag`.
    ETag(ETag),
    /// Glacier SHA-256 tree hash, lowercase hex.
    TreeHash(String),
}

impl std::fmt::Display for RemoteDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ETag(etag) => write!(f, "etag {etag}"),
            Self::TreeHash(hash) => write!(f, "tree hash {hash}"),
        }
    }
}

/// Why a file was not uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    /// `never` mode and the key already exists.
    #[strum(to_string = "exists remotely")]
    Exists,
    /// `older` mode and the remote copy is newer.
    #[strum(to_string = "remote is newer")]
    RemoteNewer,
    /// `checksum` mode and the remote content matches.
    #[strum(to_string = "checksum matches")]
    ChecksumMatch,
    /// Zero-byte file and the backend cannot store empty objects.
    #[strum(to_string = "empty files cannot be archived")]
    EmptyFile,
}

/// Per-file upload lifecycle.
///
/// `Pending → (Skip | Uploading → Verifying → (Done | Failed))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UploadState {
    /// Key derived, policy not yet evaluated.
    Pending,
    /// Terminal: the policy decided not to upload.
    Skip(SkipReason),
    /// Object body is being transferred.
    Uploading,
    /// Transfer finished, comparing checksums.
    Verifying,
    /// Terminal: uploaded and verified (or planned, in dry-run).
    Done,
    /// Terminal: transfer or verification failed.
    Failed,
}

impl UploadState {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Skip(_) | Self::Done | Self::Failed)
    }
}

/// Result of an upload run: how many files were uploaded vs skipped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    /// Files transferred and verified.
    pub uploaded: u64,
    /// Files the overwrite policy skipped.
    pub skipped: u64,
    /// Files that would have been considered in dry-run mode.
    pub planned: u64,
    /// Bytes transferred.
    pub bytes: u64,
}

impl UploadStats {
    /// Merge another stats into this one.
    pub const fn merge(&mut self, other: Self) {
        self.uploaded += other.uploaded;
        self.skipped += other.skipped;
        self.planned += other.planned;
        self.bytes += other.bytes;
    }

    /// Total number of files considered.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.uploaded + self.skipped + self.planned
    }
}

impl std::fmt::Display for UploadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded ({} bytes), {} skipped, {} planned (dry run)",
            self.uploaded, self.bytes, self.skipped, self.planned
        )
    }
}

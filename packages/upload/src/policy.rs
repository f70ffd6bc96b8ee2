//! Overwrite policy: upload or skip?
//!
//! | Mode | Skips when |
//! |---|---|
//! | `footgun` | never (no lookup is made) |
//! | `never` | the remote object has an `ETag` |
//! | `older` | the remote `Last-Modified` is strictly after the local mtime |
//! | `checksum` | the local content matches the remote `ETag` |
//!
//! A missing object, an unsupported lookup and a failed lookup all mean
//! "upload".

use titanic_upload_models::{
    ETag, FileEntry, OverwriteMode, RemoteDigest, RemoteObjectMeta, SkipReason,
};

use crate::checksum;
use crate::error::LookupError;
use crate::store::RemoteStore;

/// Outcome of the overwrite policy for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Transfer the file.
    Upload,
    /// Leave the remote object alone.
    Skip(SkipReason),
}

/// Looks up `entry.key` (unless `mode` is `footgun`) and decides.
pub async fn evaluate(mode: OverwriteMode, entry: &FileEntry, store: &dyn RemoteStore) -> Decision {
    if !mode.needs_lookup() {
        return Decision::Upload;
    }

    match store.head_object(&entry.key).await {
        Ok(meta) => decide(mode, entry, &meta).await,
        Err(LookupError::NotFound) => Decision::Upload,
        Err(LookupError::Unsupported) => {
            log::debug!(
                "{}: no per-key lookup, overwrite mode {mode} has no effect",
                store.location(&entry.key)
            );
            Decision::Upload
        }
        Err(e @ LookupError::Failed { .. }) => {
            log::warn!("{}: {e}, uploading anyway", store.location(&entry.key));
            Decision::Upload
        }
    }
}

/// Decides against metadata of an object known to exist.
pub async fn decide(mode: OverwriteMode, entry: &FileEntry, meta: &RemoteObjectMeta) -> Decision {
    match mode {
        OverwriteMode::Footgun => Decision::Upload,
        OverwriteMode::Never => {
            if meta.has_etag() {
                Decision::Skip(SkipReason::Exists)
            } else {
                Decision::Upload
            }
        }
        OverwriteMode::Older => {
            if remote_is_newer(entry, meta) {
                Decision::Skip(SkipReason::RemoteNewer)
            } else {
                Decision::Upload
            }
        }
        OverwriteMode::Checksum => match content_matches(entry, meta).await {
            Ok(true) => Decision::Skip(SkipReason::ChecksumMatch),
            Ok(false) => Decision::Upload,
            Err(e) => {
                log::warn!(
                    "{}: cannot compute local checksum ({e}), uploading anyway",
                    entry.path.display()
                );
                Decision::Upload
            }
        },
    }
}

/// Whether the remote copy was modified strictly after the local file.
#[must_use]
pub fn remote_is_newer(entry: &FileEntry, meta: &RemoteObjectMeta) -> bool {
    meta.last_modified
        .is_some_and(|remote| remote > entry.modified)
}

async fn content_matches(entry: &FileEntry, meta: &RemoteObjectMeta) -> std::io::Result<bool> {
    let Some(raw) = meta.etag.as_deref() else {
        return Ok(false);
    };
    let etag = match raw.parse::<ETag>() {
        Ok(etag) => etag,
        Err(e) => {
            log::debug!("{}: {e}", entry.path.display());
            return Ok(false);
        }
    };
    checksum::verify_digest(&entry.path, &RemoteDigest::ETag(etag)).await
}

//! Per-file upload state machine.

use std::path::PathBuf;
use std::sync::Arc;

use titanic_upload_models::{
    ETag, FileEntry, OverwriteMode, RemoteDigest, SkipReason, UploadState, UploadStats,
};

use crate::checksum;
use crate::error::UploadError;
use crate::policy::{self, Decision};
use crate::progress::{NullProgress, ProgressFactory, TransferProgress};
use crate::store::{RemoteStore, UploadReceipt};

/// Run-wide settings, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Overwrite policy.
    pub mode: OverwriteMode,
    /// Log what would be uploaded and touch nothing remote.
    pub dry_run: bool,
    /// Key prefix prepended to every derived key.
    pub prefix: Option<String>,
}

/// Uploads files one at a time, in the order they are given.
pub struct Uploader {
    store: Arc<dyn RemoteStore>,
    options: UploadOptions,
    progress: Arc<dyn ProgressFactory>,
}

impl Uploader {
    /// Creates an uploader with no progress display.
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, options: UploadOptions) -> Self {
        Self {
            store,
            options,
            progress: Arc::new(NullProgress),
        }
    }

    /// Renders per-file transfer progress through `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressFactory>) -> Self {
        self.progress = progress;
        self
    }

    /// Uploads every path `files` yields, stopping at the first fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Io`] if walking or stat'ing fails,
    /// [`UploadError::Store`] if a transfer fails, and
    /// [`UploadError::VerificationFailed`] if an uploaded object does not
    /// match its local file.
    pub async fn run<I>(&self, files: I) -> Result<UploadStats, UploadError>
    where
        I: IntoIterator<Item = std::io::Result<PathBuf>>,
    {
        let mut stats = UploadStats::default();
        for path in files {
            let entry = FileEntry::from_path(&path?, self.options.prefix.as_deref())?;
            stats.merge(self.upload(&entry).await?);
        }
        Ok(stats)
    }

    /// Drives one file through
    /// `Pending → (Skip | Uploading → Verifying → (Done | Failed))`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Store`] if the transfer fails and
    /// [`UploadError::VerificationFailed`] /
    /// [`UploadError::DigestUnavailable`] if it cannot be confirmed.
    pub async fn upload(&self, entry: &FileEntry) -> Result<UploadStats, UploadError> {
        let location = self.store.location(&entry.key);
        let mut state = UploadState::Pending;

        if entry.size == 0 && !self.store.accepts_empty() {
            let reason = SkipReason::EmptyFile;
            log::warn!("Skipping {} ({reason})", entry.path.display());
            advance(&mut state, UploadState::Skip(reason), entry);
            return Ok(UploadStats {
                skipped: 1,
                ..UploadStats::default()
            });
        }

        if self.options.dry_run {
            log::info!(
                "Would upload {} -> {location} ({} bytes, overwrite={})",
                entry.path.display(),
                entry.size,
                self.options.mode
            );
            advance(&mut state, UploadState::Done, entry);
            return Ok(UploadStats {
                planned: 1,
                ..UploadStats::default()
            });
        }

        if let Decision::Skip(reason) =
            policy::evaluate(self.options.mode, entry, self.store.as_ref()).await
        {
            log::info!("Skipping {} ({reason})", entry.path.display());
            advance(&mut state, UploadState::Skip(reason), entry);
            return Ok(UploadStats {
                skipped: 1,
                ..UploadStats::default()
            });
        }

        advance(&mut state, UploadState::Uploading, entry);
        log::info!("Uploading {} -> {location}", entry.path.display());

        let display = self
            .progress
            .transfer_bar(&entry.path.display().to_string(), entry.size);
        let progress = Arc::new(TransferProgress::new(entry.size, display));

        let receipt = match self.store.upload_file(entry, Arc::clone(&progress)).await {
            Ok(receipt) => receipt,
            Err(e) => {
                log::warn!(
                    "{}: transfer stopped at {:.1}% ({} of {} bytes)",
                    entry.path.display(),
                    progress.percent(),
                    progress.sent(),
                    progress.total()
                );
                progress.abandon();
                advance(&mut state, UploadState::Failed, entry);
                return Err(e.into());
            }
        };

        advance(&mut state, UploadState::Verifying, entry);
        progress.set_message(format!("verifying {}", entry.key));
        if let Err(e) = self.verify(entry, &location, receipt).await {
            log::error!("Verification failed for {}", entry.path.display());
            progress.abandon();
            advance(&mut state, UploadState::Failed, entry);
            return Err(e);
        }
        progress.finish(format!("verified {}", entry.key));
        advance(&mut state, UploadState::Done, entry);

        Ok(UploadStats {
            uploaded: 1,
            bytes: entry.size,
            ..UploadStats::default()
        })
    }

    async fn verify(
        &self,
        entry: &FileEntry,
        location: &str,
        receipt: UploadReceipt,
    ) -> Result<(), UploadError> {
        let UploadReceipt { digest, archive_id } = receipt;
        let digest = match digest {
            Some(digest) => digest,
            None => RemoteDigest::ETag(self.fetch_etag(entry, location).await?),
        };

        if checksum::verify_digest(&entry.path, &digest).await? {
            log::info!("  verified {location} ({digest})");
            if let Some(archive_id) = archive_id {
                log::info!("  archive id {archive_id}");
            }
            Ok(())
        } else {
            Err(UploadError::VerificationFailed {
                path: entry.path.clone(),
                location: location.to_string(),
                digest: digest.to_string(),
            })
        }
    }

    async fn fetch_etag(&self, entry: &FileEntry, location: &str) -> Result<ETag, UploadError> {
        let unavailable = |reason: String| UploadError::DigestUnavailable {
            location: location.to_string(),
            reason,
        };

        let meta = self
            .store
            .head_object(&entry.key)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let raw = meta
            .etag
            .ok_or_else(|| unavailable("no ETag in object metadata".to_string()))?;
        raw.parse::<ETag>().map_err(|e| unavailable(e.to_string()))
    }
}

fn advance(state: &mut UploadState, next: UploadState, entry: &FileEntry) {
    debug_assert!(
        !state.is_terminal(),
        "{}: no transition out of {state}",
        entry.key
    );
    log::debug!("{}: {state} -> {next}", entry.key);
    *state = next;
}

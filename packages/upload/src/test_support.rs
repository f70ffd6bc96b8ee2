//! In-memory [`RemoteStore`] for tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use titanic_upload_models::{FileEntry, RemoteObjectMeta};

use crate::error::{LookupError, StoreError};
use crate::progress::TransferProgress;
use crate::store::{RemoteStore, UploadReceipt};

/// Records calls and keeps uploaded objects' metadata in a map.
#[derive(Default)]
pub struct MockStore {
    objects: Mutex<HashMap<String, RemoteObjectMeta>>,
    heads: AtomicUsize,
    uploads: Mutex<Vec<String>>,
    fail_lookups: bool,
    corrupt_uploads: bool,
    reject_empty: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `head_object` fails with [`LookupError::Failed`].
    pub fn failing_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    /// Uploaded objects report an `ETag` that never matches.
    pub fn corrupting(mut self) -> Self {
        self.corrupt_uploads = true;
        self
    }

    /// Reports that zero-byte objects cannot be stored.
    pub fn rejecting_empty(mut self) -> Self {
        self.reject_empty = true;
        self
    }

    pub fn insert(&self, key: &str, meta: RemoteObjectMeta) {
        self.objects.lock().unwrap().insert(key.to_string(), meta);
    }

    pub fn head_calls(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    fn location(&self, key: &str) -> String {
        format!("mock://{key}")
    }

    fn accepts_empty(&self) -> bool {
        !self.reject_empty
    }

    async fn head_object(&self, key: &str) -> Result<RemoteObjectMeta, LookupError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups {
            return Err(LookupError::Failed {
                source: "simulated outage".into(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(LookupError::NotFound)
    }

    async fn upload_file(
        &self,
        entry: &FileEntry,
        progress: Arc<TransferProgress>,
    ) -> Result<UploadReceipt, StoreError> {
        let data = std::fs::read(&entry.path)?;
        progress.record(data.len() as u64);

        let etag = if self.corrupt_uploads {
            "0".repeat(32)
        } else {
            format!("{:x}", md5::compute(&data))
        };
        self.insert(
            &entry.key,
            RemoteObjectMeta {
                etag: Some(format!("\"{etag}\"")),
                last_modified: Some(Utc::now()),
                size: Some(data.len() as u64),
            },
        );
        self.uploads.lock().unwrap().push(entry.key.clone());

        Ok(UploadReceipt::default())
    }
}

/// Writes `data` to a temp file and stats it.
pub fn fixture_entry(name: &str, data: &[u8]) -> FileEntry {
    let path = fixture_path(name);
    std::fs::write(&path, data).unwrap();
    FileEntry::from_path(&path, None).unwrap()
}

/// A fresh temp directory for fixture trees.
pub fn fixture_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("titanic_fixtures").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn fixture_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("titanic_fixtures");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

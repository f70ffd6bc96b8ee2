//! Object body transfer: single `PutObject` or parallel multipart.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use futures::{StreamExt as _, TryStreamExt as _, stream};
use titanic_upload::{FileEntry, RemoteStore as _, StoreError, TransferProgress, read_range};

use crate::S3Store;

/// Files larger than this are uploaded in parts (8 MiB).
pub const MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;

/// Starting part size for multipart uploads (8 MiB).
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// S3's limit on parts per upload.
pub const MAX_PARTS: u64 = 10_000;

/// Knobs for the transfer primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Parts in flight at once for one file.
    pub concurrency: usize,
    /// Size above which multipart upload is used.
    pub multipart_threshold: u64,
    /// Starting part size; doubled until the file fits in [`MAX_PARTS`].
    pub part_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            multipart_threshold: MULTIPART_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

/// Largest part size chosen (4 GiB), the top of the inference ladder.
pub const MAX_PART_SIZE: u64 = 1 << 32;

/// Part size for a file of `size` bytes: `base` doubled until the file fits
/// in [`MAX_PARTS`] parts.
///
/// The size stays a power of two so the multipart `ETag` can be checked by
/// part-size inference. Inference picks the first power of two strictly
/// above `size / parts`, which overshoots when the parts divide the file
/// exactly, so such sizes keep doubling until the last part is short or a
/// single part remains.
#[must_use]
pub fn part_size_for(size: u64, base: u64) -> u64 {
    let mut part_size = base.max(1);
    while size.div_ceil(part_size) > MAX_PARTS {
        part_size *= 2;
    }
    while size % part_size == 0 && size / part_size > 1 && part_size < MAX_PART_SIZE {
        part_size *= 2;
    }
    part_size
}

impl S3Store {
    /// Uploads the whole file with one `PutObject`.
    pub(crate) async fn put_single(
        &self,
        entry: &FileEntry,
        progress: &TransferProgress,
    ) -> Result<(), StoreError> {
        let data = tokio::fs::read(&entry.path).await?;
        let size = data.len() as u64;
        let body = ByteStream::from(data);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&entry.key)
            .body(body)
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| self.upload_error(&entry.key, e))?;

        progress.record(size);
        Ok(())
    }

    /// Uploads the file in parts, aborting the upload if any part fails.
    pub(crate) async fn put_multipart(
        &self,
        entry: &FileEntry,
        progress: &TransferProgress,
    ) -> Result<(), StoreError> {
        let part_size = part_size_for(entry.size, self.transfer.part_size);

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&entry.key)
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| self.upload_error(&entry.key, e))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::MissingField {
                location: self.location(&entry.key),
                field: "UploadId",
            })?
            .to_string();

        log::debug!(
            "{}: multipart upload {upload_id}, {} parts of {part_size} bytes",
            entry.key,
            entry.size.div_ceil(part_size)
        );

        let result = match self
            .upload_parts(entry, &upload_id, part_size, progress)
            .await
        {
            Ok(parts) => self.complete(entry, &upload_id, parts).await,
            Err(e) => Err(e),
        };

        if result.is_err() {
            self.abort(entry, &upload_id).await;
        }
        result
    }

    async fn upload_parts(
        &self,
        entry: &FileEntry,
        upload_id: &str,
        part_size: u64,
        progress: &TransferProgress,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        let count = entry.size.div_ceil(part_size);

        let mut parts: Vec<CompletedPart> = stream::iter(1..=count)
            .map(|number| self.upload_part(entry, upload_id, number, part_size, progress))
            .buffer_unordered(self.transfer.concurrency.max(1))
            .try_collect()
            .await?;

        parts.sort_by_key(CompletedPart::part_number);
        Ok(parts)
    }

    async fn upload_part(
        &self,
        entry: &FileEntry,
        upload_id: &str,
        number: u64,
        part_size: u64,
        progress: &TransferProgress,
    ) -> Result<CompletedPart, StoreError> {
        let offset = (number - 1) * part_size;
        let len = part_size.min(entry.size - offset);
        let data = read_range(&entry.path, offset, len).await?;
        let part_number =
            i32::try_from(number).map_err(|e| self.upload_error(&entry.key, e))?;

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&entry.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| self.upload_error(&entry.key, e))?;

        progress.record(len);
        log::trace!("{}: part {part_number} sent ({len} bytes)", entry.key);

        Ok(CompletedPart::builder()
            .set_e_tag(output.e_tag().map(str::to_string))
            .part_number(part_number)
            .build())
    }

    async fn complete(
        &self,
        entry: &FileEntry,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StoreError> {
        let multipart = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&entry.key)
            .upload_id(upload_id)
            .multipart_upload(multipart)
            .send()
            .await
            .map_err(|e| self.upload_error(&entry.key, e))?;

        Ok(())
    }

    /// Best effort: a failed abort leaves parts for a lifecycle rule to
    /// clean up.
    async fn abort(&self, entry: &FileEntry, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&entry.key)
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

#[cfg(test)]
mod tests {
    use super::*;
    use titanic_upload::ETag;
    use titanic_upload::checksum::{composite_md5_file, etag_matches, infer_chunk_size};

    #[test]
    fn part_size_starts_at_base() {
        assert_eq!(part_size_for(100 << 20, DEFAULT_PART_SIZE), DEFAULT_PART_SIZE);
    }

    #[test]
    fn part_size_doubles_to_respect_part_limit() {
        // 100 GB at 8 MiB would need ~11 920 parts.
        let size = 100_000_000_000;
        let part_size = part_size_for(size, DEFAULT_PART_SIZE);
        assert_eq!(part_size, 16 << 20);
        assert!(size.div_ceil(part_size) <= MAX_PARTS);
    }

    #[test]
    fn uploaded_part_size_is_recoverable_by_inference() {
        // A 20 MiB + 1 byte file goes up as three 8 MiB parts.
        let size = (20 << 20) + 1;
        let part_size = part_size_for(size, DEFAULT_PART_SIZE);
        let parts = size.div_ceil(part_size);
        assert_eq!(parts, 3);
        assert_eq!(infer_chunk_size(size, parts), Some(part_size));
    }

    #[test]
    fn exact_multiples_still_verify() {
        const MIB: u64 = 1 << 20;

        // 16 MiB would be two full 8 MiB parts; it goes up as one part.
        let part_size = part_size_for(16 * MIB, DEFAULT_PART_SIZE);
        assert_eq!(part_size, 16 * MIB);
        let inferred = infer_chunk_size(16 * MIB, 1).unwrap();
        assert!(inferred >= 16 * MIB);

        // 24 MiB would be three full 8 MiB parts; it goes up as 16 + 8.
        let part_size = part_size_for(24 * MIB, DEFAULT_PART_SIZE);
        assert_eq!(part_size, 16 * MIB);
        let parts = (24 * MIB).div_ceil(part_size);
        assert_eq!(parts, 2);
        assert_eq!(infer_chunk_size(24 * MIB, parts), Some(part_size));
    }

    #[test]
    fn composite_etag_of_exact_multiple_matches_local_file() {
        const MIB: u64 = 1 << 20;
        let size = 24 * MIB;
        let path = std::env::temp_dir().join("titanic_s3_exact_multiple.bin");
        let data: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let part_size = part_size_for(size, DEFAULT_PART_SIZE);
        let etag = ETag::Composite {
            digest: composite_md5_file(&path, part_size).unwrap(),
            parts: size.div_ceil(part_size),
        };
        assert!(etag_matches(&path, &etag).unwrap());

        let _ = std::fs::remove_file(&path);
    }
}

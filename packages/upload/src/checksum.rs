//! Local checksums compatible with what the remote side reports.
//!
//! ## S3 `ETag`
//!
//! A single-part object's `ETag` is the MD5 of its content. A multipart
//! object's `ETag` is `md5(md5(part1) ‖ md5(part2) ‖ …)-N` where `N` is the
//! part count. The part size is not recorded anywhere, so it is inferred:
//! the smallest power of two in `2^20 ..= 2^32` strictly greater than
//! `size / N`. Objects uploaded with non-power-of-two or uneven parts will
//! not verify.
//!
//! ## Glacier tree hash
//!
//! SHA-256 over 1 MiB leaves, combined pairwise until one digest remains.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest as _, Sha256};
use titanic_upload_models::{ETag, RemoteDigest};

/// Smallest candidate part size (1 MiB).
pub const MIN_CHUNK_SHIFT: u32 = 20;

/// Largest candidate part size (4 GiB).
pub const MAX_CHUNK_SHIFT: u32 = 32;

/// Glacier tree hash leaf size.
pub const TREE_HASH_BLOCK: usize = 1 << 20;

const READ_BUFFER: usize = 256 * 1024;

/// Infers the part size a multipart object was uploaded with.
///
/// Returns `None` if `parts` is zero or no ladder value exceeds
/// `file_size / parts`.
#[must_use]
#[allow(clippy::cast_precision_loss)] // ladder values are exact; sizes far below 2^52
pub fn infer_chunk_size(file_size: u64, parts: u64) -> Option<u64> {
    if parts == 0 {
        return None;
    }
    let ck = file_size as f64 / parts as f64;

    (MIN_CHUNK_SHIFT..=MAX_CHUNK_SHIFT)
        .map(|shift| 1u64 << shift)
        .find(|&size| size as f64 > ck)
}

/// MD5 hex digest of a whole file.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn md5_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", context.finalize()))
}

/// Multipart-style MD5 of a file split into `chunk_size` blocks.
///
/// Each block's raw 16-byte digest is appended to an accumulator whose MD5
/// is returned as hex.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn composite_md5_file(path: &Path, chunk_size: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; READ_BUFFER];
    let mut digests = Vec::new();

    loop {
        let mut context = md5::Context::new();
        let mut remaining = chunk_size;
        let mut consumed = 0u64;

        while remaining > 0 {
            let want = buffer
                .len()
                .min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let n = file.read(&mut buffer[..want])?;
            if n == 0 {
                break;
            }
            context.consume(&buffer[..n]);
            remaining -= n as u64;
            consumed += n as u64;
        }

        if consumed == 0 {
            break;
        }
        digests.extend_from_slice(&context.finalize().0);
        if remaining > 0 {
            break;
        }
    }

    Ok(format!("{:x}", md5::compute(&digests)))
}

/// Compares a file against an S3 `ETag`.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn etag_matches(path: &Path, etag: &ETag) -> std::io::Result<bool> {
    match etag {
        ETag::Plain { digest } => Ok(md5_file(path)? == *digest),
        ETag::Composite { digest, parts } => {
            let size = std::fs::metadata(path)?.len();
            let Some(chunk_size) = infer_chunk_size(size, *parts) else {
                log::warn!(
                    "{}: no part size in the 2^{MIN_CHUNK_SHIFT}..2^{MAX_CHUNK_SHIFT} ladder fits \
                     {size} bytes in {parts} parts",
                    path.display()
                );
                return Ok(false);
            };
            log::debug!(
                "{}: verifying {parts}-part ETag with inferred part size {chunk_size}",
                path.display()
            );
            Ok(composite_md5_file(path, chunk_size)? == *digest)
        }
    }
}

/// Glacier tree hash of an in-memory buffer.
#[must_use]
pub fn tree_hash_bytes(data: &[u8]) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = data
        .chunks(TREE_HASH_BLOCK)
        .map(|block| Sha256::digest(block).into())
        .collect();
    combine_tree(leaves)
}

/// Reduces leaf (or subtree) digests to the tree root.
///
/// Adjacent pairs are hashed together; an unpaired trailing digest is
/// promoted to the next level unchanged. No leaves hash as the empty string.
#[must_use]
pub fn combine_tree(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                if let [left, right] = pair {
                    let mut hasher = Sha256::new();
                    hasher.update(left);
                    hasher.update(right);
                    hasher.finalize().into()
                } else {
                    pair[0]
                }
            })
            .collect();
    }
    level.pop().unwrap_or_else(|| Sha256::digest(b"").into())
}

/// Glacier tree hash of a file, lowercase hex.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn tree_hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut block = vec![0u8; TREE_HASH_BLOCK];
    let mut leaves: Vec<[u8; 32]> = Vec::new();

    loop {
        let mut filled = 0;
        while filled < block.len() {
            let n = file.read(&mut block[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            break;
        }
        leaves.push(Sha256::digest(&block[..filled]).into());
        if filled < block.len() {
            break;
        }
    }

    Ok(hex::encode(combine_tree(leaves)))
}

/// Compares a file against whatever digest the remote reported.
///
/// Hashing runs on a blocking thread.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub async fn verify_digest(path: &Path, digest: &RemoteDigest) -> std::io::Result<bool> {
    let path: PathBuf = path.to_path_buf();
    let digest = digest.clone();
    tokio::task::spawn_blocking(move || match &digest {
        RemoteDigest::ETag(etag) => etag_matches(&path, etag),
        RemoteDigest::TreeHash(expected) => {
            Ok(tree_hash_file(&path)?.eq_ignore_ascii_case(expected))
        }
    })
    .await
    .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture(name: &str, data: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join("titanic_checksum_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Builds the multipart ETag a remote would report for `data`.
    fn multipart_etag(data: &[u8], part_size: usize) -> ETag {
        let mut acc = Vec::new();
        for part in data.chunks(part_size) {
            acc.extend_from_slice(&md5::compute(part).0);
        }
        ETag::Composite {
            digest: format!("{:x}", md5::compute(&acc)),
            parts: data.chunks(part_size).count() as u64,
        }
    }

    #[test]
    fn chunk_size_ladder_picks_first_strictly_greater_power() {
        // 10_000_000 / 3 ≈ 3_333_333.3 → 2^21 is too small, 2^22 fits.
        assert_eq!(infer_chunk_size(10_000_000, 3), Some(1 << 22));
        assert_eq!(infer_chunk_size(0, 1), Some(1 << 20));
        assert_eq!(infer_chunk_size(5 << 20, 10), Some(1 << 20));
    }

    #[test]
    fn chunk_size_is_strictly_greater_than_quotient() {
        // Exactly 2^23 per part infers 2^24, not 2^23.
        assert_eq!(infer_chunk_size(16 << 20, 2), Some(1 << 24));
    }

    #[test]
    fn chunk_size_ladder_has_bounds() {
        assert_eq!(infer_chunk_size(10, 0), None);
        assert_eq!(infer_chunk_size(1 << 33, 1), None);
        assert_eq!(infer_chunk_size((1 << 32) - 1, 1), Some(1 << 32));
    }

    #[test]
    fn plain_etag_matches_whole_file_md5() {
        let path = fixture("plain.bin", b"hello world");
        let etag: ETag = "\"5eb63bbbe01eeed093cb22bb8f5acdc3\"".parse().unwrap();
        assert!(etag_matches(&path, &etag).unwrap());

        let wrong: ETag = "00000000000000000000000000000000".parse().unwrap();
        assert!(!etag_matches(&path, &wrong).unwrap());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn composite_etag_round_trips() {
        // 2.5 MiB in three 1 MiB parts: 2.5/3 MiB per part infers 2^20.
        let data = pattern((5 << 20) / 2);
        let path = fixture("composite.bin", &data);
        let etag = multipart_etag(&data, 1 << 20);
        assert!(matches!(etag, ETag::Composite { parts: 3, .. }));
        assert!(etag_matches(&path, &etag).unwrap());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn composite_etag_detects_corruption() {
        let mut data = pattern((5 << 20) / 2);
        let etag = multipart_etag(&data, 1 << 20);
        data[(1 << 20) + 7] ^= 0xff;
        let path = fixture("corrupt.bin", &data);
        assert!(!etag_matches(&path, &etag).unwrap());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn composite_etag_with_unexpected_part_size_fails() {
        // Uneven 1 MiB + 2 MiB parts; 3 MiB / 2 infers 2 MiB parts instead.
        let data = pattern(3 << 20);
        let path = fixture("uneven.bin", &data);
        let mut acc = Vec::new();
        for part in [&data[..1 << 20], &data[1 << 20..]] {
            acc.extend_from_slice(&md5::compute(part).0);
        }
        let etag = ETag::Composite {
            digest: format!("{:x}", md5::compute(&acc)),
            parts: 2,
        };
        assert!(!etag_matches(&path, &etag).unwrap());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn tree_hash_of_single_block_is_sha256() {
        let data = b"glacier";
        assert_eq!(tree_hash_bytes(data), <[u8; 32]>::from(Sha256::digest(data)));
        assert_eq!(tree_hash_bytes(b""), <[u8; 32]>::from(Sha256::digest(b"")));
    }

    #[test]
    fn tree_hash_combines_pairs_and_promotes_odd_leaf() {
        let data = pattern((2 << 20) + 10);
        let leaves: Vec<[u8; 32]> = data
            .chunks(TREE_HASH_BLOCK)
            .map(|b| Sha256::digest(b).into())
            .collect();
        assert_eq!(leaves.len(), 3);

        let mut hasher = Sha256::new();
        hasher.update(leaves[0]);
        hasher.update(leaves[1]);
        let left: [u8; 32] = hasher.finalize().into();
        let mut hasher = Sha256::new();
        hasher.update(left);
        hasher.update(leaves[2]);
        let expected: [u8; 32] = hasher.finalize().into();

        assert_eq!(tree_hash_bytes(&data), expected);

        let path = fixture("tree.bin", &data);
        assert_eq!(tree_hash_file(&path).unwrap(), hex::encode(expected));
        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn verify_digest_dispatches_on_kind() {
        let data = pattern(4096);
        let path = fixture("dispatch.bin", &data);

        let etag = RemoteDigest::ETag(ETag::Plain {
            digest: format!("{:x}", md5::compute(&data)),
        });
        assert!(verify_digest(&path, &etag).await.unwrap());

        let tree = RemoteDigest::TreeHash(hex::encode(tree_hash_bytes(&data)).to_uppercase());
        assert!(verify_digest(&path, &tree).await.unwrap());

        let bad = RemoteDigest::TreeHash("00".repeat(32));
        assert!(!verify_digest(&path, &bad).await.unwrap());
        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn verify_digest_reports_missing_file() {
        let digest = RemoteDigest::TreeHash("00".repeat(32));
        assert!(
            verify_digest(Path::new("/nonexistent/titanic.bin"), &digest)
                .await
                .is_err()
        );
    }
}

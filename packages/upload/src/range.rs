//! Byte-range reads for part uploads.

use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};

/// Reads `len` bytes of `path` starting at `offset`.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be opened or holds fewer than
/// `offset + len` bytes.
pub async fn read_range(path: &Path, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buffer = vec![0u8; usize::try_from(len).map_err(std::io::Error::other)?];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

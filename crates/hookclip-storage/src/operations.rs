//! File operations: ranged reads, sizes and deletion.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// Inclusive byte range resolved against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` header value.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Parse a single-range `Range` header (`bytes=a-b`, `bytes=a-`, `bytes=-n`)
/// against a file of `total` bytes.
pub fn parse_range(header: &str, total: u64) -> StorageResult<ByteRange> {
    let invalid = || StorageError::InvalidRange(header.to_string());

    let spec = header.trim().strip_prefix("bytes=").ok_or_else(invalid)?;
    if spec.contains(',') || total == 0 {
        return Err(invalid());
    }
    let (start, end) = spec.split_once('-').ok_or_else(invalid)?;
    let (start, end) = (start.trim(), end.trim());

    let range = match (start.is_empty(), end.is_empty()) {
        (true, true) => return Err(invalid()),
        // Suffix: the last n bytes
        (true, false) => {
            let n: u64 = end.parse().map_err(|_| invalid())?;
            if n == 0 {
                return Err(invalid());
            }
            ByteRange {
                start: total.saturating_sub(n),
                end: total - 1,
            }
        }
        (false, true) => ByteRange {
            start: start.parse().map_err(|_| invalid())?,
            end: total - 1,
        },
        (false, false) => {
            let start: u64 = start.parse().map_err(|_| invalid())?;
            let end: u64 = end.parse().map_err(|_| invalid())?;
            ByteRange {
                start,
                end: end.min(total - 1),
            }
        }
    };

    if range.start > range.end || range.start >= total {
        return Err(invalid());
    }
    Ok(range)
}

/// An open file positioned at the requested range, read lazily.
#[derive(Debug)]
pub struct FileReader {
    /// Yields exactly `len` bytes
    pub reader: Take<File>,
    pub len: u64,
    /// Size of the whole file
    pub total: u64,
    /// Present when only part of the file is served
    pub range: Option<ByteRange>,
}

/// Open a whole file, or the part named by a `Range` header, for streaming.
pub async fn open_file(path: &Path, range_header: Option<&str>) -> StorageResult<FileReader> {
    let mut file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::not_found(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let total = file.metadata().await?.len();

    let range = match range_header {
        Some(header) => Some(parse_range(header, total)?),
        None => None,
    };
    let (start, len) = match range {
        Some(r) => (r.start, r.len()),
        None => (0, total),
    };
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }

    Ok(FileReader {
        reader: file.take(len),
        len,
        total,
        range,
    })
}

/// Total size of regular files under `path`. Missing paths count as zero.
pub async fn dir_size(path: &Path) -> StorageResult<u64> {
    let mut total = 0;
    let mut stack = vec![path.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

/// Delete a file; a missing file is not an error.
pub async fn delete_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted file: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

/// Delete a directory tree; a missing directory is not an error.
pub async fn remove_dir(path: &Path) -> StorageResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("bytes=0-99", 1000).unwrap(), ByteRange { start: 0, end: 99 });
        assert_eq!(parse_range("bytes=900-", 1000).unwrap(), ByteRange { start: 900, end: 999 });
        assert_eq!(parse_range("bytes=-100", 1000).unwrap(), ByteRange { start: 900, end: 999 });
        assert_eq!(parse_range("bytes=-5000", 1000).unwrap(), ByteRange { start: 0, end: 999 });
        assert_eq!(parse_range("bytes=990-2000", 1000).unwrap(), ByteRange { start: 990, end: 999 });
        assert_eq!(parse_range("bytes=0-0", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_range_rejects() {
        for bad in ["bytes=1000-", "bytes=5-1", "items=0-1", "bytes=-", "bytes=0-1,5-6", "bytes=-0", "bytes=a-b"] {
            assert!(parse_range(bad, 1000).is_err(), "{}", bad);
        }
        assert!(parse_range("bytes=0-", 0).is_err());
    }

    async fn read_all(file: FileReader) -> Vec<u8> {
        let mut data = Vec::new();
        let mut reader = file.reader;
        reader.read_to_end(&mut data).await.unwrap();
        data
    }

    #[tokio::test]
    async fn test_open_file_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip_1.mp4");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let whole = open_file(&path, None).await.unwrap();
        assert!(whole.range.is_none());
        assert_eq!(whole.len, 10);
        assert_eq!(read_all(whole).await, b"0123456789");

        let part = open_file(&path, Some("bytes=2-4")).await.unwrap();
        assert_eq!(part.total, 10);
        assert_eq!(part.len, 3);
        assert_eq!(part.range.unwrap().content_range(part.total), "bytes 2-4/10");
        assert_eq!(read_all(part).await, b"234");

        assert!(matches!(
            open_file(&path, Some("bytes=20-30")).await,
            Err(StorageError::InvalidRange(_))
        ));
        assert!(matches!(
            open_file(&dir.path().join("missing.mp4"), None).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dir_size_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("job");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(dir.path().join("a.mp4"), vec![0u8; 100]).await.unwrap();
        tokio::fs::write(nested.join("b.mp4"), vec![0u8; 50]).await.unwrap();

        assert_eq!(dir_size(dir.path()).await.unwrap(), 150);
        assert_eq!(dir_size(&dir.path().join("nope")).await.unwrap(), 0);

        delete_file(&dir.path().join("a.mp4")).await;
        delete_file(&dir.path().join("a.mp4")).await;
        remove_dir(&nested).await.unwrap();
        remove_dir(&nested).await.unwrap();
        assert_eq!(dir_size(dir.path()).await.unwrap(), 0);
    }
}

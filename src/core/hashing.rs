//! Streaming file digests.
//!
//! Every sample is identified by its SHA-256; MD5 and SHA-1 ride along for
//! cross-referencing with external feeds. One pass over the file feeds all
//! three hashers and counts bytes.

use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::config::FILE_HASH_BUFFER_SIZE;
use crate::core::Result;

/// Digest set identifying one sample.
#[derive(Debug, Clone)]
pub struct FileDigest {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub size: i64,
}

/// Hash a file in [`FILE_HASH_BUFFER_SIZE`]-byte chunks.
///
/// Fails only on I/O error, which callers treat as a sample-level skip.
pub async fn hash_file(path: &Path) -> Result<FileDigest> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut size: i64 = 0;
    let mut buf = vec![0u8; FILE_HASH_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        md5.update(&buf[..read]);
        sha1.update(&buf[..read]);
        sha256.update(&buf[..read]);
        size += read as i64;
    }

    Ok(FileDigest {
        md5: hex::encode(md5.finalize()),
        sha1: hex::encode(sha1.finalize()),
        sha256: hex::encode(sha256.finalize()),
        size,
    })
}

/// MD5 and byte count for an archive, read in double-size chunks.
///
/// Packages are keyed by MD5 only, so the full digest set is not needed.
pub async fn archive_digest(path: &Path) -> Result<(String, i64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut md5 = Md5::new();
    let mut size: i64 = 0;
    let mut buf = vec![0u8; FILE_HASH_BUFFER_SIZE * 2];

    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        md5.update(&buf[..read]);
        size += read as i64;
    }

    Ok((hex::encode(md5.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn known_digests() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();

        let digest = hash_file(file.path()).await.unwrap();
        assert_eq!(digest.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(digest.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            digest.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.size, 3);
    }

    #[tokio::test]
    async fn size_spans_multiple_chunks() {
        let mut file = NamedTempFile::new().unwrap();
        let payload = vec![0xA5u8; FILE_HASH_BUFFER_SIZE * 3 + 17];
        file.write_all(&payload).unwrap();

        let digest = hash_file(file.path()).await.unwrap();
        assert_eq!(digest.size, payload.len() as i64);

        let (md5, size) = archive_digest(file.path()).await.unwrap();
        assert_eq!(md5, digest.md5);
        assert_eq!(size, digest.size);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        assert!(hash_file(Path::new("/nonexistent/sample.bin")).await.is_err());
    }
}

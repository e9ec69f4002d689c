//! Checksum utilities for archive integrity
//!
//! Archives can approach the aggregate download ceiling (1.5 GiB), so every
//! digest here is computed by streaming fixed-size chunks through the hasher
//! instead of reading the file into memory.

use crate::error::{McrError, Result};
use crate::types::ChecksumAlgorithm;
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::Path;

/// Read buffer size used while hashing
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Compute checksum for a file
pub fn compute_file_checksum(
    path: impl AsRef<Path>,
    algorithm: ChecksumAlgorithm,
) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file, algorithm)
}

/// Compute checksum for any readable source, returned as lowercase hex
pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<String> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => digest_reader(reader, Sha256::new()),
        ChecksumAlgorithm::Sha512 => digest_reader(reader, Sha512::new()),
    }
}

fn digest_reader<R: Read, D: Digest>(reader: &mut R, mut hasher: D) -> Result<String> {
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify checksum for a file
pub fn verify_file_checksum(
    path: impl AsRef<Path>,
    expected: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<()> {
    let actual = compute_file_checksum(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(McrError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_compute_checksum_sha256() {
        let mut cursor = Cursor::new(b"hello world");
        let checksum = compute_checksum(&mut cursor, ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(checksum, "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9");
    }

    #[test]
    fn test_compute_checksum_empty_input() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let checksum = compute_checksum(&mut cursor, ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(checksum, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn test_file_checksum_spans_multiple_chunks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data = vec![b'a'; HASH_CHUNK_SIZE * 3 + 17];
        file.write_all(&data).unwrap();

        let streamed = compute_file_checksum(file.path(), ChecksumAlgorithm::Sha256).unwrap();
        let in_memory = hex::encode(Sha256::digest(&data));

        assert_eq!(streamed, in_memory);
        assert_eq!(streamed.len(), 64);
    }

    #[test]
    fn test_verify_file_checksum() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        assert!(verify_file_checksum(
            file.path(),
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9",
            ChecksumAlgorithm::Sha256,
        )
        .is_ok());

        let err = verify_file_checksum(file.path(), "deadbeef", ChecksumAlgorithm::Sha256)
            .unwrap_err();
        assert!(matches!(err, McrError::ChecksumMismatch { .. }));
    }
}

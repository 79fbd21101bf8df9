use std::path::Path;

use crate::TransferError;

/// Checks that `chunk_size` is a positive multiple of the protocol granularity.
///
/// Only the final chunk of an upload may be shorter; every other chunk is
/// exactly `chunk_size` bytes, so a misaligned limit would be rejected by the
/// server on the first chunk.
pub fn validate_chunk_size(chunk_size: u64, granularity: u64) -> Result<(), TransferError> {
    if chunk_size == 0 || granularity == 0 || chunk_size % granularity != 0 {
        return Err(TransferError::InvalidChunkSize {
            chunk_size,
            granularity,
        });
    }
    Ok(())
}

/// Returns the size of `path`, rejecting anything that is not a regular file.
pub fn source_size(path: &Path) -> Result<u64, TransferError> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Err(TransferError::NotAFile(path.display().to_string()));
    }
    Ok(meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use driveup_protocol::constants::CHUNK_GRANULARITY;

    #[test]
    fn accepts_granularity_multiples() {
        assert!(validate_chunk_size(CHUNK_GRANULARITY, CHUNK_GRANULARITY).is_ok());
        assert!(validate_chunk_size(4 * CHUNK_GRANULARITY, CHUNK_GRANULARITY).is_ok());
        assert!(validate_chunk_size(crate::DEFAULT_CHUNK_SIZE, CHUNK_GRANULARITY).is_ok());
    }

    #[test]
    fn rejects_misaligned_chunk_size() {
        let err = validate_chunk_size(300_000, CHUNK_GRANULARITY).unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidChunkSize {
                chunk_size: 300_000,
                granularity: CHUNK_GRANULARITY
            }
        ));
    }

    #[test]
    fn rejects_zero() {
        assert!(validate_chunk_size(0, CHUNK_GRANULARITY).is_err());
        assert!(validate_chunk_size(CHUNK_GRANULARITY, 0).is_err());
    }

    #[test]
    fn source_size_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"12345").unwrap();
        assert_eq!(source_size(&path).unwrap(), 5);
    }

    #[test]
    fn source_size_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            source_size(dir.path()),
            Err(TransferError::NotAFile(_))
        ));
    }

    #[test]
    fn source_size_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            source_size(&dir.path().join("nope")),
            Err(TransferError::Io(_))
        ));
    }
}

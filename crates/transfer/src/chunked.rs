use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::TransferError;
use crate::checkpoint::source_modified;
use crate::plan::ChunkPlan;
use crate::validation::source_size;

/// Reads chunks of a source file at arbitrary offsets.
///
/// No file handle is kept between chunks: every read re-opens the file and
/// seeks, so a resumed upload never depends on the position of an earlier
/// handle.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    path: PathBuf,
    file_size: u64,
    modified: Option<DateTime<Utc>>,
}

impl ChunkReader {
    /// Records the current size of `path` as the size every later read is
    /// checked against, along with its modification time.
    pub fn new(path: &Path) -> Result<Self, TransferError> {
        let file_size = source_size(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file_size,
            modified: source_modified(path),
        })
    }

    /// Reads exactly `plan.len` bytes starting at `plan.start`.
    pub fn read_chunk(&self, plan: &ChunkPlan) -> Result<Vec<u8>, TransferError> {
        if plan.end() > self.file_size {
            return Err(TransferError::OffsetOutOfRange {
                offset: plan.end(),
                total: self.file_size,
            });
        }

        let mut file = std::fs::File::open(&self.path)?;
        let actual = file.metadata()?.len();
        if actual != self.file_size {
            return Err(TransferError::SourceChanged {
                expected: self.file_size,
                actual,
            });
        }

        let mut buf = vec![0u8; plan.len as usize];
        file.seek(SeekFrom::Start(plan.start))?;
        let n = fill_buffer(&mut file, &mut buf)?;
        if n != buf.len() {
            return Err(TransferError::ShortRead {
                offset: plan.start,
                expected: plan.len,
                read: n as u64,
            });
        }
        Ok(buf)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the source file when the reader was created.
    /// Modification time observed when the reader was created.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

/// Reads until `buf` is full or the reader hits EOF; returns the byte count.
///
/// A single `read` may return fewer bytes than asked for, so one call is
/// never assumed to fill the buffer.
pub fn fill_buffer<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

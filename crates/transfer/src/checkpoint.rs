//! On-disk checkpoints for resuming an upload after the process exits.
//!
//! One JSON file per source file, stored under
//! `~/.config/driveup/checkpoints/<hash>.json` where `<hash>` is derived from
//! the source path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::TransferError;
use crate::types::UploadSession;

/// Persisted state of an interrupted upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub session_endpoint: String,
    pub acked_offset: u64,
    pub total_size: u64,
    pub source_path: PathBuf,
    /// Modification time of the source when the upload began.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_modified: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint for `source_path` as it is on disk right now.
    pub fn new(session: &UploadSession, source_path: &Path, acked_offset: u64) -> Self {
        Self {
            session_endpoint: session.endpoint.clone(),
            acked_offset,
            total_size: session.total_size,
            source_path: source_path.to_path_buf(),
            source_modified: source_modified(source_path),
            updated_at: Utc::now(),
        }
    }

    /// Pins the recorded source modification time.
    pub fn with_source_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.source_modified = modified;
        self
    }

    /// The session this checkpoint belongs to.
    pub fn session(&self) -> UploadSession {
        UploadSession::new(self.session_endpoint.clone(), self.total_size)
    }

    /// Returns `true` if the checkpoint can resume a source of `total_size`
    /// bytes last modified at `modified`. A file rewritten since the
    /// checkpoint, even at the same size, must start a fresh session.
    ///
    /// The modification times are only compared when both are known.
    pub fn matches(&self, total_size: u64, modified: Option<DateTime<Utc>>) -> bool {
        let same_content = match (self.source_modified, modified) {
            (Some(recorded), Some(current)) => recorded == current,
            _ => true,
        };
        self.total_size == total_size && self.acked_offset <= total_size && same_content
    }
}

/// Directory of checkpoint files.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the checkpoint for `source`, if one exists.
    pub fn load(&self, source: &Path) -> Result<Option<Checkpoint>, TransferError> {
        let path = self.path_for(source);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&data)?;
        debug!(path = %path.display(), offset = checkpoint.acked_offset, "loaded checkpoint");
        Ok(Some(checkpoint))
    }

    /// Writes `checkpoint`, replacing any previous one for the same source.
    ///
    /// The file is written next to its final location and renamed into place
    /// so a crash never leaves a half-written checkpoint.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), TransferError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&checkpoint.source_path);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(checkpoint)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), offset = checkpoint.acked_offset, "saved checkpoint");
        Ok(())
    }

    /// Deletes the checkpoint for `source`. Missing checkpoints are not an error.
    pub fn remove(&self, source: &Path) -> Result<(), TransferError> {
        match std::fs::remove_file(self.path_for(source)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, source: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", hash_source(source)))
    }
}

/// Modification time of `path`, if the platform reports one.
pub fn source_modified(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Deterministic file name for a source path: first 16 bytes of SHA-256 of
/// the canonical path, hex encoded.
fn hash_source(source: &Path) -> String {
    let canonical = std::fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
    let hash = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(&hash[..16])
}

/// Returns the default checkpoint directory.
pub fn default_checkpoint_dir() -> Option<PathBuf> {
    config_dir().map(|d| d.join("driveup").join("checkpoints"))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, CheckpointStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(tmp.path().join("checkpoints"));
        (tmp, store)
    }

    fn source(tmp: &tempfile::TempDir) -> PathBuf {
        let path = tmp.path().join("big.zip");
        std::fs::write(&path, b"payload").unwrap();
        path
    }

    #[test]
    fn missing_checkpoint_loads_none() {
        let (tmp, store) = test_store();
        assert!(store.load(&source(&tmp)).unwrap().is_none());
    }

    #[test]
    fn save_and_load() {
        let (tmp, store) = test_store();
        let src = source(&tmp);
        let session = UploadSession::new("https://upload.example/s?upload_id=abc", 7);
        let cp = Checkpoint::new(&session, &src, 4);
        store.save(&cp).unwrap();

        let loaded = store.load(&src).unwrap().unwrap();
        assert_eq!(loaded, cp);
        assert_eq!(loaded.session(), session);
    }

    #[test]
    fn save_overwrites_previous_offset() {
        let (tmp, store) = test_store();
        let src = source(&tmp);
        let session = UploadSession::new("https://upload.example/s", 7);
        store.save(&Checkpoint::new(&session, &src, 2)).unwrap();
        store.save(&Checkpoint::new(&session, &src, 6)).unwrap();
        assert_eq!(store.load(&src).unwrap().unwrap().acked_offset, 6);
    }

    #[test]
    fn remove_deletes_and_tolerates_missing() {
        let (tmp, store) = test_store();
        let src = source(&tmp);
        let session = UploadSession::new("https://upload.example/s", 7);
        store.save(&Checkpoint::new(&session, &src, 2)).unwrap();
        store.remove(&src).unwrap();
        assert!(store.load(&src).unwrap().is_none());
        store.remove(&src).unwrap();
    }

    #[test]
    fn distinct_sources_get_distinct_files() {
        let (tmp, store) = test_store();
        let a = tmp.path().join("a.bin");
        let b = tmp.path().join("b.bin");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        store
            .save(&Checkpoint::new(&UploadSession::new("https://s/a", 1), &a, 0))
            .unwrap();
        store
            .save(&Checkpoint::new(&UploadSession::new("https://s/b", 1), &b, 1))
            .unwrap();

        assert_eq!(store.load(&a).unwrap().unwrap().session_endpoint, "https://s/a");
        assert_eq!(store.load(&b).unwrap().unwrap().session_endpoint, "https://s/b");
    }

    #[test]
    fn corrupt_checkpoint_is_an_error() {
        let (tmp, store) = test_store();
        let src = source(&tmp);
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.path_for(&src), "{not json").unwrap();
        assert!(matches!(store.load(&src), Err(TransferError::Json(_))));
    }

    #[test]
    fn matches_requires_same_size() {
        let cp = Checkpoint::new(&UploadSession::new("https://s", 10), Path::new("x"), 4);
        assert!(cp.source_modified.is_none());
        assert!(cp.matches(10, None));
        assert!(!cp.matches(11, None));
    }

    #[test]
    fn same_size_rewrite_does_not_match() {
        let (tmp, store) = test_store();
        let src = source(&tmp);
        let session = UploadSession::new("https://upload.example/s", 7);
        store.save(&Checkpoint::new(&session, &src, 4)).unwrap();

        let loaded = store.load(&src).unwrap().unwrap();
        assert!(loaded.source_modified.is_some());
        assert!(loaded.matches(7, source_modified(&src)));

        // Same length, new content, later mtime.
        std::fs::write(&src, b"PAYLOAD").unwrap();
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(!loaded.matches(7, source_modified(&src)));
    }

    #[test]
    fn pinned_modification_time_survives_later_saves() {
        let (tmp, store) = test_store();
        let src = source(&tmp);
        let pinned = Utc::now() - chrono::Duration::hours(2);
        let cp = Checkpoint::new(&UploadSession::new("https://s", 7), &src, 4)
            .with_source_modified(Some(pinned));
        store.save(&cp).unwrap();
        assert_eq!(store.load(&src).unwrap().unwrap().source_modified, Some(pinned));
    }

    #[test]
    fn checkpoint_without_modification_time_still_loads() {
        let (tmp, store) = test_store();
        let src = source(&tmp);
        std::fs::create_dir_all(store.dir()).unwrap();
        let json = r#"{"sessionEndpoint":"https://s","ackedOffset":4,"totalSize":7,
            "sourcePath":"/tmp/big.zip","updatedAt":"2026-01-01T00:00:00Z"}"#;
        std::fs::write(store.path_for(&src), json).unwrap();
        let cp = store.load(&src).unwrap().unwrap();
        assert_eq!(cp.source_modified, None);
        assert!(cp.matches(7, source_modified(&src)));
    }

    #[test]
    fn hash_is_stable_and_short() {
        let h1 = hash_source(Path::new("/does/not/exist.bin"));
        let h2 = hash_source(Path::new("/does/not/exist.bin"));
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 32);
    }

    #[test]
    fn default_dir_is_namespaced() {
        if let Some(dir) = default_checkpoint_dir() {
            assert!(dir.ends_with("driveup/checkpoints") || dir.ends_with("driveup\\checkpoints"));
        }
    }
}

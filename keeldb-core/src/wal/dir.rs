//! Log segment directory
//!
//! Enumerates on-disk segments by numeric signature. A directory holds
//! segments of exactly one kind; the signature embedded in a filename
//! is the LSN at which that segment was opened.

use super::LogKind;
use crate::{Error, Result, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A directory of log segments of one kind
#[derive(Debug, Clone)]
pub struct LogDir {
    path: PathBuf,
    kind: LogKind,
}

impl LogDir {
    /// Create a handle for a log directory
    pub fn new(path: impl Into<PathBuf>, kind: LogKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Directory root
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kind of segments this directory holds
    pub fn kind(&self) -> LogKind {
        self.kind
    }

    /// Enumerate segment signatures, sorted ascending.
    ///
    /// Entries whose name does not carry the configured extension, or
    /// whose stem is not a full base-10 integer, are skipped with a
    /// warning. Fails only when the directory itself cannot be read.
    pub fn scan(&self) -> Result<Vec<Signature>> {
        let entries = fs::read_dir(&self.path).map_err(|source| Error::Directory {
            path: self.path.clone(),
            source,
        })?;

        let suffix = format!(".{}", self.kind.extension());
        let mut signatures = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::Directory {
                path: self.path.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!("skipping non-UTF-8 file name {:?}", entry.file_name());
                continue;
            };

            let Some(stem) = name.strip_suffix(&suffix) else {
                continue;
            };

            match stem.parse::<Signature>() {
                Ok(signature) => signatures.push(signature),
                Err(_) => warn!("skipping {}: stem is not a valid signature", name),
            }
        }

        signatures.sort_unstable();
        signatures.dedup();
        Ok(signatures)
    }

    /// Signature of the latest segment, if the directory has any
    pub fn latest(&self) -> Result<Option<Signature>> {
        Ok(self.scan()?.into_iter().last())
    }

    /// Derive the path of the segment with the given signature
    pub fn format_path(&self, signature: Signature) -> PathBuf {
        self.path
            .join(format!("{:016}.{}", signature, self.kind.extension()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_scan_sorts_ascending() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "0000000000000010.xlog");
        touch(tmp.path(), "0000000000000002.xlog");

        let dir = LogDir::new(tmp.path(), LogKind::Wal);
        assert_eq!(dir.scan().unwrap(), vec![2, 10]);
        assert_eq!(dir.latest().unwrap(), Some(10));
    }

    #[test]
    fn test_scan_skips_malformed_names() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "0000000000000005.xlog");
        touch(tmp.path(), "garbage.xlog");
        touch(tmp.path(), "12abc.xlog");
        touch(tmp.path(), "99999999999999999999999999.xlog"); // overflows i64
        touch(tmp.path(), "0000000000000007.snap"); // wrong extension
        touch(tmp.path(), "noextension");

        let dir = LogDir::new(tmp.path(), LogKind::Wal);
        assert_eq!(dir.scan().unwrap(), vec![5]);
    }

    #[test]
    fn test_scan_snapshot_kind() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "0000000000000003.snap");
        touch(tmp.path(), "0000000000000004.xlog");

        let dir = LogDir::new(tmp.path(), LogKind::Snapshot);
        assert_eq!(dir.scan().unwrap(), vec![3]);
    }

    #[test]
    fn test_scan_missing_directory_fails() {
        let dir = LogDir::new("/nonexistent/keeldb-test", LogKind::Wal);
        assert!(matches!(dir.scan(), Err(Error::Directory { .. })));
    }

    #[test]
    fn test_format_path_zero_pads() {
        let dir = LogDir::new("/data/wal", LogKind::Wal);
        assert_eq!(
            dir.format_path(42),
            PathBuf::from("/data/wal/0000000000000042.xlog")
        );

        let snaps = LogDir::new("/data/snap", LogKind::Snapshot);
        assert_eq!(
            snaps.format_path(1),
            PathBuf::from("/data/snap/0000000000000001.snap")
        );
    }

    #[test]
    fn test_scan_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = LogDir::new(tmp.path(), LogKind::Wal);
        assert!(dir.scan().unwrap().is_empty());
        assert_eq!(dir.latest().unwrap(), None);
    }
}

//! Checkpoint store for the output table.
//!
//! The output file (CSV or `.xlsx`) is the checkpoint: its data-row count is
//! the resume offset. Results are buffered in memory and the whole table is
//! rewritten on each flush through a temp file that is renamed over the
//! destination, so a crash mid-flush leaves the previously flushed file intact.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::table::{read_records, write_records, TableError, TableFormat};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: TableError,
    },
    #[error(
        "{path} has columns [{}] but this task writes [{}]; use another output file",
        .found.join(", "),
        .expected.join(", ")
    )]
    HeaderMismatch {
        path: PathBuf,
        found: Vec<String>,
        expected: Vec<String>,
    },
}

/// Contents of an output table found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read an existing output table. `Ok(None)` if the file does not exist.
pub fn read_existing(path: &Path) -> Result<Option<ExistingTable>, CheckpointError> {
    if !path.exists() {
        return Ok(None);
    }

    let mut records = read_records(path)
        .map_err(|source| CheckpointError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .into_iter();
    let header = records.next().unwrap_or_default();
    let rows = records.collect();

    Ok(Some(ExistingTable { header, rows }))
}

/// In-memory output buffer plus the file it is flushed to.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    flushes: usize,
}

impl CheckpointStore {
    /// Start an empty table at `path` without looking at what is on disk.
    pub fn new(path: impl Into<PathBuf>, header: Vec<String>) -> Self {
        Self {
            path: path.into(),
            header,
            rows: Vec::new(),
            flushes: 0,
        }
    }

    /// Load whatever a previous run flushed to `path`.
    ///
    /// A missing or unreadable file yields an empty store; the header is
    /// written on the first flush. A table written under a different header
    /// is refused so rows of two layouts never end up in one file.
    pub fn resume(
        path: impl Into<PathBuf>,
        header: Vec<String>,
    ) -> Result<Self, CheckpointError> {
        let mut store = Self::new(path, header);
        match read_existing(&store.path) {
            Ok(Some(existing)) => {
                if !existing.header.is_empty() && existing.header != store.header {
                    return Err(CheckpointError::HeaderMismatch {
                        path: store.path.clone(),
                        found: existing.header,
                        expected: store.header,
                    });
                }
                debug!(
                    "Resuming {} with {} existing rows",
                    store.path.display(),
                    existing.rows.len()
                );
                store.rows = existing.rows;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}; starting a fresh table that will replace it", e);
            }
        }
        Ok(store)
    }

    /// Number of data rows already present, i.e. where processing continues.
    pub fn resume_offset(&self) -> usize {
        self.rows.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Data rows in the buffer (header excluded).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Buffer a result row. Does not touch the file.
    pub fn append(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    /// Rewrite the destination with the header and every buffered row.
    pub fn flush(&mut self) -> Result<(), CheckpointError> {
        let write_err = |source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        write_records(
            tmp.as_file_mut(),
            TableFormat::from_path(&self.path),
            &self.header,
            &self.rows,
        )
        .map_err(|source| CheckpointError::Encode {
            path: self.path.clone(),
            source,
        })?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        self.flushes += 1;
        debug!("Flushed {} rows to {}", self.rows.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn header() -> Vec<String> {
        vec!["combine_notes".to_string(), "matched_topic".to_string()]
    }

    fn row(content: &str, topic: &str) -> Vec<String> {
        vec![content.to_string(), topic.to_string()]
    }

    #[test]
    fn test_resume_missing_file() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::resume(dir.path().join("out.csv"), header()).unwrap();
        assert_eq!(store.resume_offset(), 0);
        assert!(store.is_empty());
        assert_eq!(store.flush_count(), 0);
    }

    #[test]
    fn test_flush_then_resume() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");

        let mut store = CheckpointStore::new(&path, header());
        store.append(row("猫税, really", "cattax"));
        store.append(row("line\nbreak", "match_failed"));
        assert!(!path.exists(), "append must not write");
        store.flush().unwrap();
        assert_eq!(store.flush_count(), 1);

        let resumed = CheckpointStore::resume(&path, header()).unwrap();
        assert_eq!(resumed.resume_offset(), 2);
        assert_eq!(resumed.rows()[0], row("猫税, really", "cattax"));
        assert_eq!(resumed.rows()[1], row("line\nbreak", "match_failed"));
    }

    #[test]
    fn test_flush_rewrites_whole_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut store = CheckpointStore::new(&path, header());
        store.append(row("a", "daily"));
        store.flush().unwrap();
        store.append(row("b", "learn"));
        store.flush().unwrap();

        let existing = read_existing(&path).unwrap().unwrap();
        assert_eq!(existing.header, header());
        assert_eq!(existing.rows, vec![row("a", "daily"), row("b", "learn")]);
    }

    #[test]
    fn test_empty_flush_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = CheckpointStore::new(&path, header());
        store.flush().unwrap();

        let existing = read_existing(&path).unwrap().unwrap();
        assert_eq!(existing.header, header());
        assert!(existing.rows.is_empty());
    }

    #[test]
    fn test_resume_refuses_other_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "笔记topic,评论内容,sentiment\nMusic,hi,快乐\n").unwrap();

        let err = CheckpointStore::resume(&path, header()).unwrap_err();
        match err {
            CheckpointError::HeaderMismatch { found, expected, .. } => {
                assert_eq!(found[0], "笔记topic");
                assert_eq!(expected, header());
            }
            other => panic!("unexpected error: {other}"),
        }
        // Untouched
        assert!(fs::read_to_string(&path).unwrap().starts_with("笔记topic"));
    }

    #[test]
    fn test_resume_header_only_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "combine_notes,matched_topic\n").unwrap();

        let store = CheckpointStore::resume(&path, header()).unwrap();
        assert_eq!(store.resume_offset(), 0);
    }

    #[test]
    fn test_resume_unreadable_xlsx_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        fs::write(&path, "not a zip archive").unwrap();

        let mut store = CheckpointStore::resume(&path, header()).unwrap();
        assert_eq!(store.resume_offset(), 0);
        store.append(row("a", "daily"));
        store.flush().unwrap();
        assert_eq!(read_existing(&path).unwrap().unwrap().rows.len(), 1);
    }

    #[test]
    fn test_xlsx_flush_then_resume() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("comments_results.xlsx");
        let header: Vec<String> = ["笔记topic", "评论内容", "sentiment", "valence"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let rows = vec![
            vec!["Music".to_string(), "好听".to_string(), "快乐".to_string(), "4".to_string()],
            vec!["daily".to_string(), "FAIL".to_string(), "0".to_string(), "0".to_string()],
        ];

        let mut store = CheckpointStore::new(&path, header.clone());
        for r in &rows {
            store.append(r.clone());
        }
        store.flush().unwrap();
        store.append(vec!["learn".to_string(), "学".to_string(), "疑惑".to_string(), "2".to_string()]);
        store.flush().unwrap();

        let resumed = CheckpointStore::resume(&path, header).unwrap();
        assert_eq!(resumed.resume_offset(), 3);
        assert_eq!(&resumed.rows()[..2], rows.as_slice());
        assert_eq!(resumed.rows()[2][3], "2");
    }

    #[test]
    fn test_read_existing_missing() {
        let dir = tempdir().unwrap();
        assert!(read_existing(&dir.path().join("none.csv")).unwrap().is_none());
    }
}

//! Row source: loads the input table and selects the row range for a run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::table::read_records;

/// One input row. `index` is the 0-based data-row position in the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRow {
    pub index: usize,
    fields: HashMap<String, String>,
}

impl InputRow {
    pub fn new(index: usize, fields: HashMap<String, String>) -> Self {
        Self { index, fields }
    }

    /// Cell text for `column`; missing cells read as empty.
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Half-open `[start, end)` slice of the input's data rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl RowRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<usize>, end: Option<usize>) -> Self {
        Self {
            start: start.unwrap_or(0),
            end,
        }
    }

    fn contains(&self, index: usize) -> bool {
        index >= self.start && self.end.map_or(true, |end| index < end)
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },
    #[error("Input {path} is missing required column(s): {}", .missing.join(", "))]
    MissingColumn { path: PathBuf, missing: Vec<String> },
    #[error("Invalid row range: start {start} is after end {end}")]
    InvalidRange { start: usize, end: usize },
}

impl SourceError {
    fn load(path: &Path, err: impl std::fmt::Display) -> Self {
        SourceError::Load {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Load rows from a CSV or `.xlsx` file, checking that every required column
/// exists.
pub fn load_rows(
    path: &Path,
    required_columns: &[&str],
    range: RowRange,
) -> Result<Vec<InputRow>, SourceError> {
    if let Some(end) = range.end {
        if range.start > end {
            return Err(SourceError::InvalidRange {
                start: range.start,
                end,
            });
        }
    }

    let mut records = read_records(path)
        .map_err(|e| SourceError::load(path, e))?
        .into_iter();

    let headers: Vec<String> = records
        .next()
        .unwrap_or_default()
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let missing: Vec<String> = required_columns
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SourceError::MissingColumn {
            path: path.to_path_buf(),
            missing,
        });
    }

    let rows: Vec<InputRow> = records
        .enumerate()
        .filter(|(index, _)| range.contains(*index))
        .map(|(index, record)| {
            let fields = headers
                .iter()
                .cloned()
                .zip(record)
                .collect();
            InputRow::new(index, fields)
        })
        .collect();

    debug!(
        "Loaded {} rows from {} (range {}..{:?})",
        rows.len(),
        path.display(),
        range.start,
        range.end
    );
    Ok(rows)
}

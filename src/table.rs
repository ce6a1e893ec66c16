//! Tabular file formats shared by the row source and the checkpoint store.
//!
//! The format is picked from the file extension: `.xlsx` workbooks (first
//! sheet only) or CSV for everything else. Tables are plain rows of text
//! cells, header row included.

use std::io::{Seek, Write};
use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{ColNum, RowNum, Workbook, Worksheet};
use thiserror::Error;

/// Longest string a single xlsx cell can hold.
const XLSX_MAX_CELL_CHARS: usize = 32_767;

/// Last row index an xlsx sheet can address.
const XLSX_MAX_ROW: usize = 1_048_575;

#[derive(Debug, Error)]
pub enum TableError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    XlsxRead(#[from] calamine::XlsxError),
    #[error(transparent)]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
    #[error("workbook has no sheets")]
    NoSheet,
    #[error("{rows} rows exceed the xlsx sheet limit")]
    TooManyRows { rows: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Xlsx,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("xlsx") | Some("xlsm") => TableFormat::Xlsx,
            _ => TableFormat::Csv,
        }
    }
}

/// Read every row of the table at `path`, header first.
pub fn read_records(path: &Path) -> Result<Vec<Vec<String>>, TableError> {
    match TableFormat::from_path(path) {
        TableFormat::Csv => read_csv(path),
        TableFormat::Xlsx => read_xlsx(path),
    }
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?.iter().map(String::from).collect());
    }
    Ok(records)
}

fn read_xlsx(path: &Path) -> Result<Vec<Vec<String>>, TableError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook.worksheet_range_at(0).ok_or(TableError::NoSheet)??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Whole numbers come back as floats; 4.0 prints as "4"
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Write `header` and `rows` to `out` in `format`.
pub fn write_records<W>(
    out: W,
    format: TableFormat,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<(), TableError>
where
    W: Write + Seek + Send,
{
    match format {
        TableFormat::Csv => write_csv(out, header, rows),
        TableFormat::Xlsx => write_xlsx(out, header, rows),
    }
}

fn write_csv<W: Write>(out: W, header: &[String], rows: &[Vec<String>]) -> Result<(), TableError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn write_xlsx<W>(out: W, header: &[String], rows: &[Vec<String>]) -> Result<(), TableError>
where
    W: Write + Seek + Send,
{
    if rows.len() > XLSX_MAX_ROW {
        return Err(TableError::TooManyRows { rows: rows.len() });
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in header.iter().enumerate() {
        sheet.write_string(0, col as ColNum, name.as_str())?;
    }
    for (i, row) in rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            write_cell(sheet, (i + 1) as RowNum, col as ColNum, cell)?;
        }
    }
    workbook.save_to_writer(out)?;
    Ok(())
}

/// Integers in canonical form become number cells so scores stay numeric for
/// spreadsheet consumers; everything else is text. Empty cells are skipped.
fn write_cell(
    sheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    cell: &str,
) -> Result<(), TableError> {
    if cell.is_empty() {
        return Ok(());
    }
    if let Ok(n) = cell.parse::<i32>() {
        if n.to_string() == cell {
            sheet.write_number(row, col, n)?;
            return Ok(());
        }
    }
    if cell.chars().count() > XLSX_MAX_CELL_CHARS {
        let kept: String = cell.chars().take(XLSX_MAX_CELL_CHARS).collect();
        sheet.write_string(row, col, kept)?;
    } else {
        sheet.write_string(row, col, cell)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TableFormat::from_path(Path::new("帖子.xlsx")), TableFormat::Xlsx);
        assert_eq!(TableFormat::from_path(Path::new("out.XLSX")), TableFormat::Xlsx);
        assert_eq!(TableFormat::from_path(Path::new("out.csv")), TableFormat::Csv);
        assert_eq!(TableFormat::from_path(Path::new("out")), TableFormat::Csv);
    }

    #[test]
    fn test_xlsx_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let header = strings(&["笔记topic", "评论内容", "valence"]);
        let rows = vec![
            strings(&["Music", "好听, really\nnice", "4"]),
            strings(&["daily", "", "0"]),
            strings(&["learn", "007", "5"]),
        ];

        let file = File::create(&path).unwrap();
        write_records(file, TableFormat::Xlsx, &header, &rows).unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records[0], header);
        assert_eq!(&records[1..], rows.as_slice());
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let header = strings(&["combine_notes", "matched_topic"]);
        let rows = vec![strings(&["a, \"quoted\"", "Music"])];

        let file = File::create(&path).unwrap();
        write_records(file, TableFormat::Csv, &header, &rows).unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![header, rows[0].clone()]);
    }

    #[test]
    fn test_xlsx_numbers_read_as_integers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "valence").unwrap();
        sheet.write_number(1, 0, 3.0).unwrap();
        workbook.save(&path).unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![strings(&["valence"]), strings(&["3"])]);
    }
}

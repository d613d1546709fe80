// 📄 Sheet Loading - first worksheet of an XLSX workbook or a CSV export
// Cells are kept as trimmed text; numeric interpretation happens per row.

use anyhow::{Context, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use std::io::Cursor;

use crate::error::ImportError;

/// Zip local file header, every XLSX starts with it
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Sheet - rows of text cells, row 0 is the first line of the sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Sheet { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Detect the format from the content and load the first sheet
    pub fn from_bytes(bytes: Vec<u8>, csv_delimiter: u8) -> Result<Self> {
        if bytes.starts_with(ZIP_MAGIC) {
            Sheet::from_xlsx(bytes)
        } else {
            Sheet::from_csv(&bytes, csv_delimiter)
        }
    }

    /// Load the first worksheet of an XLSX workbook
    ///
    /// calamine trims leading empty rows/columns off a range; they are put
    /// back so row and column indices match what a spreadsheet shows.
    pub fn from_xlsx(bytes: Vec<u8>) -> Result<Self> {
        let mut workbook: Xlsx<_> =
            open_workbook_from_rs(Cursor::new(bytes)).context("Failed to open xlsx")?;

        let range = match workbook.worksheet_range_at(0) {
            Some(range) => range.context("Failed to read first worksheet")?,
            None => return Err(ImportError::EmptyWorkbook.into()),
        };

        let (row_offset, col_offset) = range
            .start()
            .map(|(row, col)| (row as usize, col as usize))
            .unwrap_or((0, 0));

        let mut rows = vec![Vec::new(); row_offset];
        for row in range.rows() {
            let mut cells = vec![String::new(); col_offset];
            cells.extend(row.iter().map(cell_text));
            rows.push(trim_trailing_empty(cells));
        }

        Ok(Sheet { rows })
    }

    /// Load a delimited text export; ragged rows are kept as they are
    pub fn from_csv(bytes: &[u8], delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let record = result
                .with_context(|| format!("Failed to parse CSV line {}", line_num + 1))?;
            rows.push(trim_trailing_empty(
                record.iter().map(|cell| cell.trim().to_string()).collect(),
            ));
        }

        Ok(Sheet { rows })
    }
}

/// Rows end at their last filled cell
///
/// calamine pads every row to the width of the used range; a blank line
/// has to come out short so row mapping can skip it.
fn trim_trailing_empty(mut cells: Vec<String>) -> Vec<String> {
    while cells.last().is_some_and(|cell| cell.is_empty()) {
        cells.pop();
    }
    cells
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

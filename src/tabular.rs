// 📐 Tabular Adapter - column resolution and row access for sheet sources
//
// Two ways to get a ColumnMap:
//   - fixed:     indices straight from configuration
//   - discovered: the first row whose cells satisfy every column pattern
// Both end up in the same TableRows iterator, so row mapping code does not
// care how the columns were found.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

use crate::error::{ImportError, RecordError, Result};
use crate::sheet::Sheet;

// ============================================================================
// COLUMNS
// ============================================================================

/// Logical columns a tabular source can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Description,
    SellingPrice,
    PurchasePrice,
    RepairPrice,
    SellingFactorName,
    Manufacturer,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Description => "description",
            Column::SellingPrice => "selling price",
            Column::PurchasePrice => "purchase price",
            Column::RepairPrice => "repair price",
            Column::SellingFactorName => "selling factor name",
            Column::Manufacturer => "manufacturer",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ColumnMap - logical column -> physical cell index, frozen once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    indices: BTreeMap<Column, usize>,
    /// Columns a row may leave off at its end
    optional: BTreeSet<Column>,
}

impl ColumnMap {
    /// Fixed-index policy: positions come from configuration
    pub fn fixed<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (Column, usize)>,
    {
        ColumnMap {
            indices: columns.into_iter().collect(),
            optional: BTreeSet::new(),
        }
    }

    /// Builder pattern: a row that ends before `column` is still complete
    pub fn with_optional(mut self, column: Column) -> Self {
        self.optional.insert(column);
        self
    }

    pub fn index(&self, column: Column) -> Option<usize> {
        self.indices.get(&column).copied()
    }

    /// Cells a row needs before every required column can be read
    pub fn width(&self) -> usize {
        self.indices
            .iter()
            .filter(|(column, _)| !self.optional.contains(*column))
            .map(|(_, index)| index + 1)
            .max()
            .unwrap_or(0)
    }
}

// ============================================================================
// COLUMN DISCOVERY
// ============================================================================

/// ColumnPatterns - one regular expression per logical column
#[derive(Debug, Clone)]
pub struct ColumnPatterns {
    patterns: Vec<(Column, Regex)>,
}

/// Result of header discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub columns: ColumnMap,
    /// Index of the header row itself
    pub row: usize,
}

impl Header {
    /// First data row, right below the header
    pub fn data_start(&self) -> usize {
        self.row + 1
    }
}

impl ColumnPatterns {
    /// Compile the patterns; a bad expression is a configuration error
    pub fn compile<'a, I>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Column, &'a str)>,
    {
        let mut compiled = Vec::new();
        for (column, pattern) in patterns {
            let regex = Regex::new(pattern)
                .map_err(|source| ImportError::InvalidPattern { column, source })?;
            compiled.push((column, regex));
        }
        Ok(ColumnPatterns { patterns: compiled })
    }

    /// Match one candidate row: every pattern needs at least one cell
    ///
    /// The leftmost matching cell wins for each column.
    pub fn match_row(&self, cells: &[String]) -> Option<ColumnMap> {
        let mut indices = BTreeMap::new();
        for (column, regex) in &self.patterns {
            let index = cells.iter().position(|cell| regex.is_match(cell))?;
            indices.insert(*column, index);
        }
        Some(ColumnMap {
            indices,
            optional: BTreeSet::new(),
        })
    }

    /// Pattern-discovery policy: scan from the top for the header row
    pub fn discover(&self, sheet: &Sheet) -> Result<Header> {
        sheet
            .rows()
            .iter()
            .enumerate()
            .find_map(|(row, cells)| self.match_row(cells).map(|columns| Header { columns, row }))
            .ok_or(ImportError::HeaderNotFound)
    }
}

// ============================================================================
// ROW ACCESS
// ============================================================================

/// SheetRow - one complete data row seen through a ColumnMap
#[derive(Debug, Clone, Copy)]
pub struct SheetRow<'a> {
    /// 1-based line number as shown in a spreadsheet
    pub line: usize,
    cells: &'a [String],
    columns: &'a ColumnMap,
}

impl<'a> SheetRow<'a> {
    /// Trimmed text of a column, empty when the column is not mapped
    pub fn text(&self, column: Column) -> &'a str {
        self.columns
            .index(column)
            .and_then(|index| self.cells.get(index))
            .map_or("", |cell| cell.trim())
    }

    pub fn is_empty(&self, column: Column) -> bool {
        self.text(column).is_empty()
    }

    /// Parse a column as a decimal number
    pub fn number(&self, column: Column) -> std::result::Result<f64, RecordError> {
        let text = self.text(column);
        text.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| RecordError::InvalidNumber {
                column,
                value: text.to_string(),
            })
    }
}

/// TableRows - data rows from `start` on; short rows are skipped with a warning
pub struct TableRows<'a> {
    rows: std::iter::Enumerate<std::slice::Iter<'a, Vec<String>>>,
    columns: &'a ColumnMap,
    start: usize,
    skipped: usize,
}

impl<'a> TableRows<'a> {
    pub fn new(sheet: &'a Sheet, columns: &'a ColumnMap, start: usize) -> Self {
        TableRows {
            rows: sheet.rows().iter().enumerate(),
            columns,
            start,
            skipped: 0,
        }
    }

    /// Rows dropped for having too few cells
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<'a> Iterator for TableRows<'a> {
    type Item = SheetRow<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let width = self.columns.width();
        for (index, cells) in self.rows.by_ref() {
            if index < self.start {
                continue;
            }
            let line = index + 1;
            if cells.len() < width {
                warn!(line, cells = cells.len(), "skip line, only {} columns, line appears empty", cells.len());
                self.skipped += 1;
                continue;
            }
            return Some(SheetRow {
                line,
                cells,
                columns: self.columns,
            });
        }
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Header-keyed decoding of a raw result set.
//!
//! Decoding is fail-fast: a cell in a required numeric column that does not
//! parse aborts the whole decode. Amounts are never replaced by zero.

use std::sync::Arc;

use thiserror::Error;

use super::{ResultRow, ResultSet};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("result set has no header row")]
    MissingHeader,

    #[error("header column {0} has an empty name")]
    EmptyColumnName(usize),

    #[error("duplicate column '{0}' in header")]
    DuplicateColumn(String),

    #[error("expected column '{0}' is not in the header")]
    MissingColumn(String),

    #[error("row {row} has {found} cells, header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}, column '{column}': '{value}' is not a number")]
    NotNumeric {
        row: usize,
        column: String,
        value: String,
    },

    #[error("engine returned page token '{0}' more than once")]
    PaginationLoop(String),
}

/// One decoded cell: the verbatim text plus its numeric reading, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub raw: String,
    pub number: Option<f64>,
}

impl Cell {
    fn new(raw: String) -> Self {
        let number = parse_number(&raw);
        Self { raw, number }
    }
}

/// A data row keyed by the header's column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    cells: Vec<Cell>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.cells.get(idx)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).map(|c| c.raw.as_str())
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(|c| c.number)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// Column names plus one record per data row, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTable {
    columns: Arc<[String]>,
    records: Vec<Record>,
}

impl DecodedTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Header-only input decodes to an empty table, which is not an error.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Back to raw rows, header first, cells verbatim.
    pub fn to_result_set(&self) -> ResultSet {
        let mut rows: Vec<ResultRow> = Vec::with_capacity(self.records.len() + 1);
        rows.push(self.columns.to_vec());
        rows.extend(
            self.records
                .iter()
                .map(|r| r.cells.iter().map(|c| c.raw.clone()).collect()),
        );
        ResultSet::new(rows)
    }
}

/// Decode `result_set`, requiring every column in `numeric_columns` to exist
/// and to hold a finite number in every data row.
pub fn decode(result_set: &ResultSet, numeric_columns: &[String]) -> Result<DecodedTable, DecodeError> {
    let header = result_set.header().ok_or(DecodeError::MissingHeader)?;
    let columns = validate_header(header)?;

    let mut required = Vec::with_capacity(numeric_columns.len());
    for name in numeric_columns {
        let idx = columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DecodeError::MissingColumn(name.clone()))?;
        required.push(idx);
    }

    let columns: Arc<[String]> = columns.into();
    let mut records = Vec::with_capacity(result_set.data_row_count());
    for (offset, row) in result_set.data_rows().iter().enumerate() {
        let row_number = offset + 1;
        if row.len() != columns.len() {
            return Err(DecodeError::RaggedRow {
                row: row_number,
                expected: columns.len(),
                found: row.len(),
            });
        }
        let cells: Vec<Cell> = row.iter().cloned().map(Cell::new).collect();
        for &idx in &required {
            if cells[idx].number.is_none() {
                return Err(DecodeError::NotNumeric {
                    row: row_number,
                    column: columns[idx].clone(),
                    value: cells[idx].raw.clone(),
                });
            }
        }
        records.push(Record {
            columns: Arc::clone(&columns),
            cells,
        });
    }

    Ok(DecodedTable { columns, records })
}

fn validate_header(header: &ResultRow) -> Result<Vec<String>, DecodeError> {
    let mut columns: Vec<String> = Vec::with_capacity(header.len());
    for (idx, name) in header.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(DecodeError::EmptyColumnName(idx));
        }
        if columns.contains(name) {
            return Err(DecodeError::DuplicateColumn(name.clone()));
        }
        columns.push(name.clone());
    }
    Ok(columns)
}

/// Plain finite decimal, surrounding whitespace allowed.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

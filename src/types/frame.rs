//! Column-named numeric table shared by feature engineering, scoring and training

use thiserror::Error;

/// Errors raised when building or reshaping a [`Frame`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("unknown column: {0}")]
    UnknownColumn(String),
}

/// Row-major table of `f64` values with ordered, unique column names.
///
/// Plays the role a data frame plays in a notebook: every row has exactly
/// one value per column, and column order is significant because it
/// determines the scorer's input layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Frame {
    /// Create a frame, checking that column names are unique and rows are rectangular
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, FrameError> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
        }

        for (row, values) in rows.iter().enumerate() {
            if values.len() != columns.len() {
                return Err(FrameError::RaggedRow {
                    row,
                    expected: columns.len(),
                    found: values.len(),
                });
            }
        }

        Ok(Self { columns, rows })
    }

    /// Create a frame from borrowed column names
    pub fn from_columns(columns: &[&str], rows: Vec<Vec<f64>>) -> Result<Self, FrameError> {
        Self::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    /// One-row frame from a fixed schema whose names are known to be unique
    pub(crate) fn single_row(columns: &[&str], row: Vec<f64>) -> Frame {
        debug_assert_eq!(columns.len(), row.len());
        Frame {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![row],
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Copy out a single column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// New frame holding the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// New frame without `name`. Absent columns are not an error.
    pub fn drop_column(&self, name: &str) -> Frame {
        let Some(idx) = self.column_index(name) else {
            return self.clone();
        };

        let mut columns = self.columns.clone();
        columns.remove(idx);

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.remove(idx);
                row
            })
            .collect();

        Frame { columns, rows }
    }

    /// Split a column off the frame, returning the remaining features and the column values
    pub fn split_off_column(&self, name: &str) -> Result<(Frame, Vec<f64>), FrameError> {
        let values = self
            .column(name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_string()))?;
        Ok((self.drop_column(name), values))
    }

    /// Column names in order, skipping the excluded ones
    pub fn columns_excluding(&self, exclude: &[&str]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !exclude.contains(&c.as_str()))
            .cloned()
            .collect()
    }

    /// Replace every value of a column in place
    pub(crate) fn map_column<F>(&mut self, idx: usize, f: F)
    where
        F: Fn(f64) -> f64,
    {
        for row in &mut self.rows {
            row[idx] = f(row[idx]);
        }
    }
}

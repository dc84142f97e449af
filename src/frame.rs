//! In-memory table of nullable variant cells.
//!
//! [`Table`] is the unit of exchange between the loader, cleaner, validator,
//! and feature builders: an ordered list of column names over rows of
//! `Option<Cell>`. Columns stay heterogeneous until the cleaner's explicit
//! coercion pass resolves them; every accessor here treats `None` as missing.

use std::collections::HashSet;

use crate::data::Cell;

const ROW_KEY_SEPARATOR: char = '\u{1f}';
const ROW_KEY_MISSING: &str = "\u{2400}";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<Cell>>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Appends a row, padding or truncating to the current column count.
    pub fn push_row(&mut self, mut row: Vec<Option<Cell>>) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Vec<Option<Cell>>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[Option<Cell>]> {
        self.rows.get(idx).map(|r| r.as_slice())
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r[col].as_ref())
    }

    pub fn set_cell(&mut self, row: usize, column: &str, value: Option<Cell>) {
        if let Some(col) = self.column_index(column)
            && let Some(r) = self.rows.get_mut(row)
        {
            r[col] = value;
        }
    }

    /// Borrowed view of one column, row-aligned.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Option<Cell>>> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[col]).collect())
    }

    pub fn column_owned(&self, name: &str) -> Option<Vec<Option<Cell>>> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[col].clone()).collect())
    }

    /// Adds a column, replacing any existing column of the same name.
    /// `values` is padded with missing entries if shorter than the table.
    pub fn set_column(&mut self, name: &str, mut values: Vec<Option<Cell>>) {
        values.resize(self.rows.len(), None);
        match self.column_index(name) {
            Some(col) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[col] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    pub fn set_const_column(&mut self, name: &str, value: Option<Cell>) {
        let values = vec![value; self.rows.len()];
        self.set_column(name, values);
    }

    /// Replaces every cell in `name` through `f`. No-op when the column is
    /// absent, matching the "apply only if relevant columns present" rule.
    pub fn map_column<F>(&mut self, name: &str, mut f: F)
    where
        F: FnMut(Option<Cell>) -> Option<Cell>,
    {
        if let Some(col) = self.column_index(name) {
            for row in &mut self.rows {
                row[col] = f(row[col].take());
            }
        }
    }

    /// Renames columns through `f`, keeping only the first occurrence of any
    /// resulting duplicate name.
    pub fn rename_columns<F>(&self, f: F) -> Table
    where
        F: Fn(&str) -> String,
    {
        let renamed: Vec<String> = self.columns.iter().map(|c| f(c)).collect();
        let mut seen = HashSet::new();
        let mut keep = Vec::new();
        for (idx, name) in renamed.iter().enumerate() {
            if seen.insert(name.clone()) {
                keep.push(idx);
            }
        }
        let columns = keep.iter().map(|&i| renamed[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Table { columns, rows }
    }

    /// Projects onto the given columns, silently skipping absent ones.
    pub fn select(&self, columns: &[&str]) -> Table {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Table { columns, rows }
    }

    /// Drops fully duplicate rows (all columns equal), keeping the first
    /// occurrence. Returns the number of rows removed.
    pub fn drop_duplicate_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row_key(row)));
        before - self.rows.len()
    }

    /// Counts fully duplicate rows without mutating the table.
    pub fn duplicate_row_count(&self) -> usize {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| !seen.insert(row_key(row)))
            .count()
    }

    /// Percentage of missing entries in a column, or `None` when the column
    /// is absent or the table has no rows.
    pub fn null_pct(&self, name: &str) -> Option<f64> {
        let col = self.column_index(name)?;
        if self.rows.is_empty() {
            return None;
        }
        let missing = self.rows.iter().filter(|r| r[col].is_none()).count();
        Some(missing as f64 / self.rows.len() as f64 * 100.0)
    }
}

/// Row identity for duplicate detection: cells compare by display form so
/// that, like the source system, `1` and `1.0` collapse to the same key.
pub fn row_key(row: &[Option<Cell>]) -> String {
    let mut key = String::new();
    for cell in row {
        match cell {
            Some(value) => key.push_str(&value.as_display()),
            None => key.push_str(ROW_KEY_MISSING),
        }
        key.push(ROW_KEY_SEPARATOR);
    }
    key
}

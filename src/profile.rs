//! Lightweight profiling of raw tables, taken before any cleaning so the
//! run report shows what the sources actually delivered.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{clean::round2, frame::Table, schema_map::Dataset};

#[derive(Debug, Clone, Serialize, Default)]
pub struct RawProfile {
    pub rows: usize,
    pub columns: Vec<String>,
    pub missing_pct: BTreeMap<String, f64>,
    /// First row as displayed strings, keyed by column.
    pub sample: BTreeMap<String, String>,
}

pub fn profile_table(table: &Table) -> RawProfile {
    if table.is_empty() {
        return RawProfile {
            columns: table.columns().to_vec(),
            ..RawProfile::default()
        };
    }

    let missing_pct = table
        .columns()
        .iter()
        .filter_map(|column| {
            table
                .null_pct(column)
                .map(|pct| (column.clone(), round2(pct)))
        })
        .collect();
    let sample = table
        .columns()
        .iter()
        .filter_map(|column| {
            table
                .cell(0, column)
                .map(|cell| (column.clone(), cell.as_display()))
        })
        .collect();

    RawProfile {
        rows: table.n_rows(),
        columns: table.columns().to_vec(),
        missing_pct,
        sample,
    }
}

pub fn profile_raw_tables(tables: &BTreeMap<Dataset, Table>) -> BTreeMap<Dataset, RawProfile> {
    tables
        .iter()
        .map(|(dataset, table)| (*dataset, profile_table(table)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;

    #[test]
    fn profile_reports_missing_pct_and_first_row_sample() {
        let mut table = Table::with_columns(["a", "b"]);
        table.push_row(vec![Some(Cell::Integer(1)), None]);
        table.push_row(vec![Some(Cell::Integer(2)), Some(Cell::String("x".into()))]);
        let profile = profile_table(&table);

        assert_eq!(profile.rows, 2);
        assert_eq!(profile.missing_pct["b"], 50.0);
        assert_eq!(profile.sample["a"], "1");
        assert!(!profile.sample.contains_key("b"));
    }

    #[test]
    fn empty_table_profiles_as_zero() {
        let profile = profile_table(&Table::with_columns(["a"]));
        assert_eq!(profile.rows, 0);
        assert!(profile.missing_pct.is_empty());
        assert!(profile.sample.is_empty());
    }
}

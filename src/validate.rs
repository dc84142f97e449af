//! Structural validation of cleaned datasets.
//!
//! Validation never aborts the pipeline: every finding lands in a
//! [`DatasetReport`] and the worst it does is flip a dataset's status to
//! `warning` with a log line.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    clean::round2,
    frame::Table,
    logger::PipelineLogger,
    schema_map::{Dataset, SchemaMap},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Ok,
    Warning,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Ok => "ok",
            ValidationStatus::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub status: ValidationStatus,
    pub rows: usize,
    pub columns: Vec<String>,
    pub missing_required: Vec<String>,
    pub duplicate_rows: usize,
    /// Missing-value percentage per required column that is present,
    /// rounded to two decimals. Empty tables report nothing here.
    pub null_pct_required: BTreeMap<String, f64>,
}

pub fn validate_datasets(
    clean_tables: &BTreeMap<Dataset, Table>,
    schema_map: &SchemaMap,
    logger: &dyn PipelineLogger,
) -> BTreeMap<Dataset, DatasetReport> {
    let mut report = BTreeMap::new();
    for (dataset, table) in clean_tables {
        report.insert(*dataset, validate_dataset(*dataset, table, schema_map, logger));
    }
    report
}

pub fn validate_dataset(
    dataset: Dataset,
    table: &Table,
    schema_map: &SchemaMap,
    logger: &dyn PipelineLogger,
) -> DatasetReport {
    let required: Vec<String> = schema_map
        .dataset(dataset)
        .map(|schema| schema.required_columns.clone())
        .unwrap_or_default();

    let missing_required: Vec<String> = required
        .iter()
        .filter(|column| !table.has_column(column))
        .cloned()
        .collect();

    let mut null_pct_required = BTreeMap::new();
    if !table.is_empty() {
        for column in &required {
            if let Some(pct) = table.null_pct(column) {
                null_pct_required.insert(column.clone(), round2(pct));
            }
        }
    }

    let status = if missing_required.is_empty() {
        ValidationStatus::Ok
    } else {
        logger.warning(&format!(
            "Missing required columns in {dataset}: {missing_required:?}"
        ));
        ValidationStatus::Warning
    };

    DatasetReport {
        status,
        rows: table.n_rows(),
        columns: table.columns().to_vec(),
        missing_required,
        duplicate_rows: table.duplicate_row_count(),
        null_pct_required,
    }
}

//! Raw multi-format loader.
//!
//! For each logical dataset it scans three source directories (structured
//! JSON records, flat CSV files, spreadsheet workbooks), scores candidate
//! filenames against the dataset's known stem tokens, and materializes the
//! best source into a raw [`Table`]. Workbook fallback dedupes duplicated
//! exports by content signature. Per-file failures are captured in the load
//! metadata, never propagated: the loader always yields a table per dataset,
//! possibly empty.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::Encoding;
use sha2::{Digest, Sha256};

use crate::{
    data::Cell,
    frame::Table,
    io_utils,
    logger::PipelineLogger,
    schema_map::Dataset,
    settings::Settings,
};

/// Rows sampled into the workbook content signature. Two workbooks that
/// differ only beyond this window are treated as duplicates — a known
/// approximation, not a bug.
const SIGNATURE_SAMPLE_ROWS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Json,
    Csv,
    Xlsx,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Json => "json",
            SourceKind::Csv => "csv",
            SourceKind::Xlsx => "xlsx",
        }
    }
}

/// Per-dataset load metadata: what was selected and what went wrong.
#[derive(Debug, Clone)]
pub struct SourceMeta {
    pub dataset: Dataset,
    pub source: Option<SourceKind>,
    pub source_file: Option<PathBuf>,
    pub duplicates_found: usize,
    pub errors: Vec<String>,
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Default)]
pub struct LoadedDatasets {
    pub tables: BTreeMap<Dataset, Table>,
    pub report: BTreeMap<Dataset, SourceMeta>,
}

/// Scores a filename stem against the dataset's alias tokens: exact match
/// 100, substring match `10 + alias length`, otherwise 0.
fn dataset_match_score(path: &Path, aliases: &[&str]) -> usize {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mut best = 0;
    for alias in aliases {
        if stem == *alias {
            return 100;
        }
        if stem.contains(alias) {
            best = best.max(10 + alias.len());
        }
    }
    best
}

/// Picks the highest-scoring candidate; score ties break toward the
/// lexically greater filename.
fn pick_file(files: &[PathBuf], aliases: &[&str]) -> Option<PathBuf> {
    files
        .iter()
        .map(|path| (dataset_match_score(path, aliases), path))
        .filter(|(score, _)| *score > 0)
        .max_by(|(score_a, path_a), (score_b, path_b)| {
            score_a
                .cmp(score_b)
                .then_with(|| file_name_string(path_a).cmp(&file_name_string(path_b)))
        })
        .map(|(_, path)| path.clone())
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn list_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();
    files.sort_by_key(|path| file_name_string(path));
    files
}

/// Reads a structured-record JSON file. Wrapper objects (`{"data": [...]}`)
/// are unwrapped to their first list-valued member; a bare object becomes a
/// one-row table.
pub fn load_json_table(path: &Path) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("Opening JSON file {path:?}"))?;
    let payload: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Parsing JSON payload {path:?}"))?;

    let records = match payload {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => {
            match map.values().find(|v| v.is_array()) {
                Some(serde_json::Value::Array(items)) => items.clone(),
                _ => vec![serde_json::Value::Object(map)],
            }
        }
        other => vec![other],
    };

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        if let serde_json::Value::Object(map) = record {
            for key in map.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut table = Table::with_columns(columns.clone());
    for record in &records {
        let serde_json::Value::Object(map) = record else {
            continue;
        };
        let row = columns
            .iter()
            .map(|column| map.get(column).and_then(json_to_cell))
            .collect();
        table.push_row(row);
    }
    Ok(table)
}

fn json_to_cell(value: &serde_json::Value) -> Option<Cell> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Cell::Boolean(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Cell::Integer(i))
            } else {
                n.as_f64().map(Cell::Float)
            }
        }
        serde_json::Value::String(s) => Some(Cell::String(s.clone())),
        // Nested structures are kept verbatim for traceability.
        other => Some(Cell::String(other.to_string())),
    }
}

/// Reads the named sheet from one workbook into a raw table.
pub fn load_xlsx_sheet(path: &Path, sheet: &str) -> Result<Table> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("Reading sheet '{sheet}' from {path:?}"))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Table::new());
    };
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let name = excel_to_cell(cell)
                .map(|c| c.as_display())
                .unwrap_or_default();
            if name.trim().is_empty() {
                format!("column_{idx}")
            } else {
                name
            }
        })
        .collect();

    let mut table = Table::with_columns(headers);
    for row in rows {
        table.push_row(row.iter().map(excel_to_cell).collect());
    }
    Ok(table)
}

fn excel_to_cell(data: &Data) -> Option<Cell> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(Cell::String(s.clone())),
        Data::Float(f) => Some(Cell::Float(*f)),
        Data::Int(i) => Some(Cell::Integer(*i)),
        Data::Bool(b) => Some(Cell::Boolean(*b)),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| Cell::Date(naive.date()))
            .or_else(|| Some(Cell::Float(dt.as_f64()))),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Cell::String(s.clone())),
    }
}

/// Content signature for duplicate-workbook detection: column list, row
/// count, and a bounded sample of serialized rows.
pub fn table_signature(table: &Table) -> String {
    let mut payload = table.columns().join("|");
    payload.push_str(&format!("|rows={}|sample=", table.n_rows()));
    for row in table.rows().iter().take(SIGNATURE_SAMPLE_ROWS) {
        let serialized: Vec<String> = row
            .iter()
            .map(|cell| cell.as_ref().map(Cell::as_display).unwrap_or_default())
            .collect();
        payload.push_str(&serialized.join(","));
        payload.push(';');
    }
    let digest = Sha256::digest(payload.as_bytes());
    format!("{digest:x}")
}

#[derive(Debug, Default)]
pub struct XlsxSelection {
    pub table: Option<Table>,
    pub selected_file: Option<PathBuf>,
    pub errors: Vec<String>,
    pub duplicates_found: usize,
}

/// Reads the named sheet from every workbook, collapses duplicate content
/// by signature (keeping the variant with more rows), and selects the
/// largest surviving table; ties break toward the lexically greater name.
pub fn select_best_xlsx(files: &[PathBuf], sheet: &str, logger: &dyn PipelineLogger) -> XlsxSelection {
    let mut selection = XlsxSelection::default();
    let mut candidates: Vec<(Table, PathBuf, String)> = Vec::new();
    let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();

    let mut sorted = files.to_vec();
    sorted.sort_by_key(|path| file_name_string(path));

    for path in &sorted {
        match load_xlsx_sheet(path, sheet) {
            Ok(table) => {
                let signature = table_signature(&table);
                if let Some(first) = seen.get(&signature) {
                    logger.info(&format!(
                        "Duplicate workbook detected for sheet {sheet}: {} ~ {}",
                        file_name_string(path),
                        file_name_string(first)
                    ));
                } else {
                    seen.insert(signature.clone(), path.clone());
                }
                candidates.push((table, path.clone(), signature));
            }
            Err(err) => {
                selection
                    .errors
                    .push(format!("{}: {err:#}", file_name_string(path)));
            }
        }
    }

    if candidates.is_empty() {
        return selection;
    }
    collapse_workbook_candidates(candidates, selection)
}

/// One survivor per content signature (preferring the variant with more
/// rows), then the overall largest survivor; ties break toward the lexically
/// greater name.
pub fn collapse_workbook_candidates(
    candidates: Vec<(Table, PathBuf, String)>,
    mut selection: XlsxSelection,
) -> XlsxSelection {
    let mut unique: BTreeMap<String, (Table, PathBuf)> = BTreeMap::new();
    let candidate_count = candidates.len();
    for (table, path, signature) in candidates {
        match unique.get(&signature) {
            Some((current, _)) if current.n_rows() >= table.n_rows() => {}
            _ => {
                unique.insert(signature, (table, path));
            }
        }
    }
    selection.duplicates_found = candidate_count - unique.len();

    let selected = unique.into_values().max_by(|(table_a, path_a), (table_b, path_b)| {
        table_a
            .n_rows()
            .cmp(&table_b.n_rows())
            .then_with(|| file_name_string(path_a).cmp(&file_name_string(path_b)))
    });
    if let Some((table, path)) = selected {
        selection.selected_file = Some(path);
        selection.table = Some(table);
    }
    selection
}

/// Loads all five datasets. Failure isolation is per dataset: a candidate
/// that fails to parse is recorded and the next source kind is tried.
pub fn load_raw_datasets(
    settings: &Settings,
    logger: &dyn PipelineLogger,
) -> Result<LoadedDatasets> {
    let encoding = io_utils::resolve_encoding(settings.runtime.input_encoding.as_deref())?;

    let json_files = list_files(&settings.paths.raw_json, "json");
    let csv_files = list_files(&settings.paths.raw_csv, "csv");
    let xlsx_files = list_files(&settings.paths.raw_xlsx, "xlsx");

    let mut loaded = LoadedDatasets::default();
    for dataset in Dataset::ALL {
        let outcome = load_single_dataset(
            dataset,
            &json_files,
            &csv_files,
            &xlsx_files,
            encoding,
            logger,
        );
        logger.info(&format!(
            "Dataset loaded: {dataset} | source={} | rows={} | columns={}",
            outcome
                .meta
                .source
                .map(|s| s.as_str())
                .unwrap_or("none"),
            outcome.meta.rows,
            outcome.meta.columns.len()
        ));
        loaded.report.insert(dataset, outcome.meta);
        loaded.tables.insert(dataset, outcome.table);
    }
    Ok(loaded)
}

struct DatasetOutcome {
    table: Table,
    meta: SourceMeta,
}

fn load_single_dataset(
    dataset: Dataset,
    json_files: &[PathBuf],
    csv_files: &[PathBuf],
    xlsx_files: &[PathBuf],
    encoding: &'static Encoding,
    logger: &dyn PipelineLogger,
) -> DatasetOutcome {
    let aliases = dataset.source_aliases();
    let mut errors = Vec::new();

    let mut attempt =
        |kind: SourceKind, path: PathBuf, result: Result<Table>| -> Option<DatasetOutcome> {
            match result {
                Ok(table) => Some(DatasetOutcome {
                    meta: SourceMeta {
                        dataset,
                        source: Some(kind),
                        source_file: Some(path),
                        duplicates_found: 0,
                        errors: std::mem::take(&mut errors),
                        rows: table.n_rows(),
                        columns: table.columns().to_vec(),
                    },
                    table,
                }),
                Err(err) => {
                    logger.warning(&format!(
                        "Failed to read {} source for '{dataset}' from {path:?}: {err:#}",
                        kind.as_str()
                    ));
                    errors.push(format!("{}: {err:#}", file_name_string(&path)));
                    None
                }
            }
        };

    if let Some(path) = pick_file(json_files, aliases) {
        let result = load_json_table(&path);
        if let Some(outcome) = attempt(SourceKind::Json, path, result) {
            return outcome;
        }
    }
    if let Some(path) = pick_file(csv_files, aliases) {
        let result = io_utils::read_csv_table(&path, encoding);
        if let Some(outcome) = attempt(SourceKind::Csv, path, result) {
            return outcome;
        }
    }

    let selection = select_best_xlsx(xlsx_files, dataset.sheet_name(), logger);
    errors.extend(selection.errors);
    let table = match selection.table {
        Some(table) => table,
        None => {
            logger.warning(&format!(
                "No usable source for dataset '{dataset}'; yielding an empty table"
            ));
            Table::new()
        }
    };
    let source = selection.selected_file.is_some().then_some(SourceKind::Xlsx);
    DatasetOutcome {
        meta: SourceMeta {
            dataset,
            source,
            source_file: selection.selected_file,
            duplicates_found: selection.duplicates_found,
            errors,
            rows: table.n_rows(),
            columns: table.columns().to_vec(),
        },
        table,
    }
}

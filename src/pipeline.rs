//! End-to-end orchestration: load, profile, clean, validate, build
//! features, persist. Each stage hands plain tables to the next; the only
//! hard failures are setup problems (missing config, unwritable output).

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

use crate::{
    cli::{ProfileArgs, RunArgs, ValidateArgs},
    clean::{self, CleanReport},
    data::Cell,
    features::{self, FeatureTables},
    frame::Table,
    io_utils,
    load::{self, LoadedDatasets},
    logger::{EnvLogger, PipelineLogger},
    profile::{self, RawProfile},
    schema_map::{Dataset, SchemaMap},
    settings::Settings,
    table,
    validate::{self, DatasetReport},
};

pub struct PipelineOutput {
    pub source: LoadedDatasets,
    pub raw_profile: BTreeMap<Dataset, RawProfile>,
    pub clean_tables: BTreeMap<Dataset, Table>,
    pub clean_report: BTreeMap<Dataset, CleanReport>,
    pub validation: BTreeMap<Dataset, DatasetReport>,
    pub features: FeatureTables,
}

/// Runs the core pipeline in memory, without touching the output directory.
pub fn run_core(
    settings: &Settings,
    schema_map: &SchemaMap,
    logger: &dyn PipelineLogger,
) -> Result<PipelineOutput> {
    let source = load::load_raw_datasets(settings, logger)?;
    let raw_profile = profile::profile_raw_tables(&source.tables);
    let (clean_tables, clean_report) = clean::clean_datasets(&source.tables, schema_map, logger);
    let validation = validate::validate_datasets(&clean_tables, schema_map, logger);
    let features = features::build_features(&clean_tables, settings, logger);
    Ok(PipelineOutput {
        source,
        raw_profile,
        clean_tables,
        clean_report,
        validation,
        features,
    })
}

/// Records every persisted artifact and writes a manifest next to them.
#[derive(Debug, Default)]
pub struct ArtifactTracker {
    records: Vec<ArtifactRecord>,
}

#[derive(Debug)]
struct ArtifactRecord {
    timestamp_utc: String,
    path: PathBuf,
    artifact_type: &'static str,
    rows: usize,
}

impl ArtifactTracker {
    pub fn register(&mut self, path: &Path, artifact_type: &'static str, rows: usize) {
        self.records.push(ArtifactRecord {
            timestamp_utc: Utc::now().to_rfc3339(),
            path: path.to_path_buf(),
            artifact_type,
            rows,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn save_manifest(&self, path: &Path) -> Result<()> {
        let mut manifest =
            Table::with_columns(["timestamp_utc", "path", "artifact_type", "rows"]);
        for record in &self.records {
            manifest.push_row(vec![
                Some(Cell::String(record.timestamp_utc.clone())),
                Some(Cell::String(record.path.display().to_string())),
                Some(Cell::String(record.artifact_type.to_string())),
                Some(Cell::Integer(record.rows as i64)),
            ]);
        }
        io_utils::write_csv_table(path, &manifest)
            .with_context(|| format!("Writing artifact manifest to {path:?}"))
    }
}

fn validation_table(validation: &BTreeMap<Dataset, DatasetReport>) -> Table {
    let mut table =
        Table::with_columns(["dataset", "status", "missing_required", "duplicate_rows"]);
    for (dataset, report) in validation {
        table.push_row(vec![
            Some(Cell::String(dataset.to_string())),
            Some(Cell::String(report.status.as_str().to_string())),
            Some(Cell::String(report.missing_required.join(", "))),
            Some(Cell::Integer(report.duplicate_rows as i64)),
        ]);
    }
    table
}

/// Writes cleaned tables, feature tables, the validation report, and the
/// artifact manifest under the processed directory.
pub fn persist_outputs(
    settings: &Settings,
    output: &PipelineOutput,
    tracker: &mut ArtifactTracker,
) -> Result<Vec<PathBuf>> {
    let processed = &settings.paths.processed_dir;
    let mut written = Vec::new();

    for (dataset, table) in &output.clean_tables {
        let path = processed.join(format!("{dataset}_clean.csv"));
        io_utils::write_csv_table(&path, table)?;
        tracker.register(&path, "processed_table", table.n_rows());
        written.push(path);
    }
    for (name, table) in output.features.named() {
        let path = processed.join(format!("{name}.csv"));
        io_utils::write_csv_table(&path, table)?;
        tracker.register(&path, "feature_table", table.n_rows());
        written.push(path);
    }

    let validation = validation_table(&output.validation);
    let path = processed.join("validation_report.csv");
    io_utils::write_csv_table(&path, &validation)?;
    tracker.register(&path, "validation_report", validation.n_rows());
    written.push(path);

    let manifest_path = processed.join("manifest.csv");
    tracker.save_manifest(&manifest_path)?;
    written.push(manifest_path);
    Ok(written)
}

fn load_config(settings_path: &Path, schema_path: &Path) -> Result<(Settings, SchemaMap)> {
    let settings = Settings::load(settings_path)?;
    let schema_map = SchemaMap::load(schema_path)?;
    Ok((settings, schema_map))
}

fn apply_run_overrides(settings: &mut Settings, args: &RunArgs) {
    if let Some(seed) = args.seed {
        settings.runtime.seed = seed;
    }
    if let Some(horizon) = args.forecast_horizon {
        settings.runtime.forecast_horizon = horizon;
    }
    if let Some(top) = args.top_ingredients {
        settings.runtime.top_ingredients = top;
    }
    if args.fast_aggregation {
        settings.runtime.fast_aggregation = true;
    }
    if let Some(encoding) = &args.input_encoding {
        settings.runtime.input_encoding = Some(encoding.clone());
    }
}

pub fn execute_run(args: &RunArgs) -> Result<()> {
    let (mut settings, schema_map) = load_config(&args.settings, &args.schema_map)?;
    apply_run_overrides(&mut settings, args);
    let logger = EnvLogger;
    info!(
        "Starting pipeline | seed={} horizon={} top_ingredients={} backend={}",
        settings.runtime.seed,
        settings.runtime.forecast_horizon,
        settings.runtime.top_ingredients,
        if settings.runtime.fast_aggregation {
            "hashed"
        } else {
            "sorted"
        }
    );

    let output = run_core(&settings, &schema_map, &logger)?;
    let mut tracker = ArtifactTracker::default();
    let written = persist_outputs(&settings, &output, &mut tracker)?;

    print_dataset_summary(&output);
    info!(
        "Pipeline finished | artifacts={} | output_dir={}",
        written.len(),
        settings.paths.processed_dir.display()
    );
    Ok(())
}

fn print_dataset_summary(output: &PipelineOutput) {
    let headers: Vec<String> = ["dataset", "source", "rows", "columns", "status"]
        .map(String::from)
        .to_vec();
    let rows: Vec<Vec<String>> = output
        .clean_report
        .iter()
        .map(|(dataset, report)| {
            let source = output
                .source
                .report
                .get(dataset)
                .and_then(|meta| meta.source.map(|s| s.as_str()))
                .unwrap_or("none");
            let status = output
                .validation
                .get(dataset)
                .map(|v| v.status.as_str())
                .unwrap_or("ok");
            vec![
                dataset.to_string(),
                source.to_string(),
                report.rows.to_string(),
                report.columns.len().to_string(),
                status.to_string(),
            ]
        })
        .collect();
    table::print_table(&headers, &rows);
}

pub fn execute_validate(args: &ValidateArgs) -> Result<()> {
    let (settings, schema_map) = load_config(&args.settings, &args.schema_map)?;
    let logger = EnvLogger;
    let source = load::load_raw_datasets(&settings, &logger)?;
    let (clean_tables, _) = clean::clean_datasets(&source.tables, &schema_map, &logger);
    let validation = validate::validate_datasets(&clean_tables, &schema_map, &logger);

    let headers: Vec<String> = [
        "dataset",
        "status",
        "rows",
        "missing_required",
        "duplicate_rows",
    ]
    .map(String::from)
    .to_vec();
    let rows: Vec<Vec<String>> = validation
        .iter()
        .map(|(dataset, report)| {
            vec![
                dataset.to_string(),
                report.status.as_str().to_string(),
                report.rows.to_string(),
                report.missing_required.join(", "),
                report.duplicate_rows.to_string(),
            ]
        })
        .collect();
    table::print_table(&headers, &rows);
    Ok(())
}

pub fn execute_profile(args: &ProfileArgs) -> Result<()> {
    let (settings, _) = load_config(&args.settings, &args.schema_map)?;
    let logger = EnvLogger;
    let source = load::load_raw_datasets(&settings, &logger)?;
    let profiles = profile::profile_raw_tables(&source.tables);

    let headers: Vec<String> = ["dataset", "source", "rows", "columns", "duplicates"]
        .map(String::from)
        .to_vec();
    let rows: Vec<Vec<String>> = profiles
        .iter()
        .map(|(dataset, profile)| {
            let meta = source.report.get(dataset);
            vec![
                dataset.to_string(),
                meta.and_then(|m| m.source.map(|s| s.as_str()))
                    .unwrap_or("none")
                    .to_string(),
                profile.rows.to_string(),
                profile.columns.len().to_string(),
                meta.map(|m| m.duplicates_found.to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    table::print_table(&headers, &rows);

    if args.missing {
        for (dataset, profile) in &profiles {
            if profile.missing_pct.is_empty() {
                continue;
            }
            println!("\n{dataset}");
            let headers: Vec<String> = ["column", "missing_pct"].map(String::from).to_vec();
            let rows: Vec<Vec<String>> = profile
                .missing_pct
                .iter()
                .map(|(column, pct)| vec![column.clone(), format!("{pct:.2}")])
                .collect();
            table::print_table(&headers, &rows);
        }
    }
    Ok(())
}

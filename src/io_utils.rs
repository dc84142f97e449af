//! CSV plumbing shared by the loader and the persistence step.
//!
//! Raw flat-file reads decode through `encoding_rs` (some point-of-sale
//! exports arrive as Latin-1) and land in a [`Table`] of raw string cells.
//! Processed output is written back as UTF-8 CSV, the row-oriented fallback
//! format of the external columnar store, with `QuoteStyle::Always` for
//! round-trip safety.

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::{data::Cell, frame::Table};

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

/// Reads a flat tabular file into a raw table: headers verbatim, every cell
/// a string, empty fields as missing.
pub fn read_csv_table(path: &Path, encoding: &'static Encoding) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .double_quote(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader
        .byte_headers()
        .with_context(|| format!("Reading headers from {path:?}"))?
        .clone();
    let decoded_headers = headers
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect::<Result<Vec<_>>>()?;

    let mut table = Table::with_columns(decoded_headers);
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record =
            record.with_context(|| format!("Reading row {} in {path:?}", row_idx + 2))?;
        let mut row = Vec::with_capacity(table.n_cols());
        for field in record.iter() {
            let text = decode_bytes(field, encoding)?;
            if text.is_empty() {
                row.push(None);
            } else {
                row.push(Some(Cell::String(text)));
            }
        }
        table.push_row(row);
    }
    Ok(table)
}

/// Writes a table as UTF-8 CSV; missing cells become empty fields.
pub fn write_csv_table(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Creating output directory {parent:?}"))?;
    }
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    let mut writer = csv::WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .double_quote(true)
        .from_writer(BufWriter::new(file));

    writer
        .write_record(table.columns())
        .context("Writing header row")?;
    for row in table.rows() {
        let record: Vec<String> = row
            .iter()
            .map(|cell| cell.as_ref().map(Cell::as_display).unwrap_or_default())
            .collect();
        writer.write_record(&record).context("Writing data row")?;
    }
    writer.flush().context("Flushing CSV output")?;
    Ok(())
}

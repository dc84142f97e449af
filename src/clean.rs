//! Schema-driven cleaning: canonical column names, explicit type coercion,
//! and per-dataset derivation rules.
//!
//! Every rule is conditional on its input columns being present, so a
//! degraded source (or an empty table) flows through without error. Failed
//! coercions degrade to missing, never abort.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    data::{Cell, coerce_boolean, coerce_numeric, hour_from_time, normalize_token},
    frame::Table,
    logger::PipelineLogger,
    schema_map::{Dataset, DatasetSchema, SchemaMap},
};

pub const NO_DATA: &str = "No data";

const SALES_NUMERIC: &[&str] = &[
    "unit_price",
    "quantity",
    "total_sale",
    "ingredient_cost",
    "gross_margin",
    "tip",
    "total_with_tip",
];
const CUSTOMERS_NUMERIC: &[&str] = &[
    "visits_last_year",
    "avg_spend",
    "estimated_total_spend",
    "loyalty_points",
    "satisfaction_score",
    "nps_score",
];
const BRANCHES_NUMERIC: &[&str] = &[
    "capacity_people",
    "num_employees",
    "rent_monthly",
    "utilities_monthly",
    "payroll_monthly",
    "operational_cost_total",
    "avg_monthly_income",
    "operating_margin",
    "profitability_pct",
    "nearby_competitors",
    "opening_year",
    "years_operating",
];
const BRANCHES_TEXT: &[&str] = &[
    "branch_id",
    "branch_name",
    "city",
    "address",
    "postal_code",
    "zone",
    "socioeconomic_level",
    "open_time",
    "close_time",
    "peak_hours",
    "nearby_poi",
    "parking",
];
const INVENTORY_NUMERIC: &[&str] = &[
    "qty_ordered",
    "unit_price",
    "total_purchase_cost",
    "qty_wasted",
    "waste_cost",
    "waste_pct",
    "current_stock",
    "min_stock",
    "shelf_life_days",
];
const DIGITAL_NUMERIC: &[&str] = &[
    "rating",
    "reach",
    "engagement",
    "engagement_rate",
    "campaign_cost",
    "response_hours",
];

/// Per-dataset cleaning summary for the run report.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub rows: usize,
    pub columns: Vec<String>,
    pub missing_pct: BTreeMap<String, f64>,
}

/// Maps raw column names to canonical ones. Candidate tokens are tried in
/// priority order (the canonical name itself first, then aliases), so a raw
/// table already carrying the canonical name wins over an aliased duplicate.
pub fn build_rename_map(table: &Table, schema: &DatasetSchema) -> BTreeMap<String, String> {
    let mut available: BTreeMap<String, String> = BTreeMap::new();
    for column in table.columns() {
        available.insert(normalize_token(column), column.clone());
    }

    let mut rename_map = BTreeMap::new();
    for (canonical, aliases) in &schema.canonical_to_aliases {
        for candidate in DatasetSchema::candidates(canonical, aliases) {
            if let Some(original) = available.get(&candidate) {
                rename_map.insert(original.clone(), canonical.clone());
                break;
            }
        }
    }
    rename_map
}

/// Applies the rename map, then snake_cases every remaining column name.
/// Duplicate resulting names keep their first occurrence.
pub fn standardize_columns(table: &Table, schema: &DatasetSchema) -> Table {
    let rename_map = build_rename_map(table, schema);
    table.rename_columns(|column| match rename_map.get(column) {
        Some(canonical) => canonical.clone(),
        None => normalize_token(column),
    })
}

fn blank_strings_to_missing(table: &mut Table) {
    let columns: Vec<String> = table.columns().to_vec();
    for column in &columns {
        table.map_column(column, |cell| match cell {
            Some(Cell::String(s)) if s.trim().is_empty() => None,
            other => other,
        });
    }
}

fn coerce_numeric_columns(table: &mut Table, columns: &[&str]) {
    for column in columns {
        table.map_column(column, |cell| {
            cell.and_then(|c| coerce_numeric(&c)).map(Cell::Float)
        });
    }
}

fn coerce_date_column(table: &mut Table, column: &str) {
    table.map_column(column, |cell| {
        cell.and_then(|c| c.as_date()).map(Cell::Date)
    });
}

fn coerce_boolean_columns(table: &mut Table, columns: &[&str]) {
    for column in columns {
        table.map_column(column, |cell| {
            cell.and_then(|c| coerce_boolean(&c)).map(Cell::Boolean)
        });
    }
}

fn stringify_columns(table: &mut Table, columns: &[&str]) {
    for column in columns {
        table.map_column(column, |cell| {
            cell.map(|c| Cell::String(c.as_display()))
        });
    }
}

fn numeric_at(table: &Table, row: usize, column: &str) -> Option<f64> {
    table.cell(row, column).and_then(coerce_numeric)
}

/// English daypart label for an hour of day. Hours outside the three named
/// windows fall to Night; a missing hour is reported, not guessed.
pub fn daypart_label(hour: Option<i64>) -> &'static str {
    match hour {
        None => NO_DATA,
        Some(h) if (6..12).contains(&h) => "Morning",
        Some(h) if (12..17).contains(&h) => "Lunch",
        Some(h) if (17..21).contains(&h) => "Evening",
        Some(_) => "Night",
    }
}

fn add_year_month(table: &mut Table) {
    if !table.has_column("date") {
        return;
    }
    let values: Vec<Option<Cell>> = (0..table.n_rows())
        .map(|row| {
            table
                .cell(row, "date")
                .and_then(|c| c.as_date())
                .map(|d| Cell::String(d.format("%Y-%m").to_string()))
        })
        .collect();
    table.set_column("year_month", values);
}

fn clean_sales(table: &mut Table) {
    coerce_numeric_columns(table, SALES_NUMERIC);
    coerce_date_column(table, "date");

    // Stored times keep only HH:MM; some exports pad with seconds.
    table.map_column("time", |cell| {
        cell.map(|c| Cell::String(c.as_display().chars().take(5).collect()))
    });

    // The hour column always exists on cleaned sales, even without a source
    // time column, so the daypart rule has a uniform input.
    let hours: Vec<Option<i64>> = if table.has_column("time") {
        (0..table.n_rows())
            .map(|row| table.cell(row, "time").and_then(hour_from_time))
            .collect()
    } else {
        vec![None; table.n_rows()]
    };
    table.set_column(
        "hour",
        hours.iter().map(|h| h.map(Cell::Integer)).collect(),
    );

    let has_price = table.has_column("unit_price");
    let has_qty = table.has_column("quantity");
    if !table.has_column("total_sale") && has_price && has_qty {
        let values: Vec<Option<Cell>> = (0..table.n_rows())
            .map(|row| {
                match (
                    numeric_at(table, row, "unit_price"),
                    numeric_at(table, row, "quantity"),
                ) {
                    (Some(p), Some(q)) => Some(Cell::Float(p * q)),
                    _ => None,
                }
            })
            .collect();
        table.set_column("total_sale", values);
    }
    if table.has_column("total_sale") {
        // An absent factor column contributes a literal zero; a present but
        // missing cell poisons the product and leaves the gap in place.
        let fills: Vec<Option<f64>> = (0..table.n_rows())
            .map(|row| {
                let price = if has_price {
                    numeric_at(table, row, "unit_price")
                } else {
                    Some(0.0)
                };
                let qty = if has_qty {
                    numeric_at(table, row, "quantity")
                } else {
                    Some(0.0)
                };
                match (price, qty) {
                    (Some(p), Some(q)) => Some(p * q),
                    _ => None,
                }
            })
            .collect();
        for (row, fill) in fills.into_iter().enumerate() {
            if table.cell(row, "total_sale").is_none()
                && let Some(value) = fill
            {
                table.set_cell(row, "total_sale", Some(Cell::Float(value)));
            }
        }
    }

    backfill_ingredient_cost(table);

    let margin_inputs = table.has_column("total_sale") && table.has_column("ingredient_cost");
    if !table.has_column("gross_margin") && margin_inputs {
        let values: Vec<Option<Cell>> = (0..table.n_rows())
            .map(|row| {
                match (
                    numeric_at(table, row, "total_sale"),
                    numeric_at(table, row, "ingredient_cost"),
                ) {
                    (Some(sale), Some(cost)) => Some(Cell::Float(sale - cost)),
                    _ => None,
                }
            })
            .collect();
        table.set_column("gross_margin", values);
    } else if table.has_column("gross_margin") && margin_inputs {
        for row in 0..table.n_rows() {
            if table.cell(row, "gross_margin").is_none()
                && let (Some(sale), Some(cost)) = (
                    numeric_at(table, row, "total_sale"),
                    numeric_at(table, row, "ingredient_cost"),
                )
            {
                table.set_cell(row, "gross_margin", Some(Cell::Float(sale - cost)));
            }
        }
    }

    table.map_column("payment_method", |cell| {
        cell.map(|c| Cell::String(c.as_display().trim().to_string()))
    });

    if table.has_column("date") {
        add_year_month(table);
        if !table.has_column("month") {
            let values: Vec<Option<Cell>> = (0..table.n_rows())
                .map(|row| {
                    table
                        .cell(row, "date")
                        .and_then(|c| c.as_date())
                        .map(|d| Cell::String(d.format("%B").to_string()))
                })
                .collect();
            table.set_column("month", values);
        }
        if !table.has_column("day_of_week") {
            let values: Vec<Option<Cell>> = (0..table.n_rows())
                .map(|row| {
                    table
                        .cell(row, "date")
                        .and_then(|c| c.as_date())
                        .map(|d| Cell::String(d.format("%A").to_string()))
                })
                .collect();
            table.set_column("day_of_week", values);
        }
    }

    let dayparts: Vec<Option<Cell>> = (0..table.n_rows())
        .map(|row| {
            let hour = table.cell(row, "hour").and_then(|c| match c {
                Cell::Integer(h) => Some(*h),
                other => coerce_numeric(other).map(|f| f as i64),
            });
            Some(Cell::String(daypart_label(hour).to_string()))
        })
        .collect();
    table.set_column("daypart", dayparts);
}

/// Fills missing ingredient costs from the per-category mean, then from a
/// fixed 35% share of the sale total for rows whose category has no data.
fn backfill_ingredient_cost(table: &mut Table) {
    if !table.has_column("ingredient_cost") {
        return;
    }

    // Without a category column all rows form one group.
    let has_category = table.has_column("category");
    let keys: Vec<Option<String>> = (0..table.n_rows())
        .map(|row| {
            if has_category {
                table.cell(row, "category").map(Cell::as_display)
            } else {
                None
            }
        })
        .collect();
    let mut sums: BTreeMap<Option<String>, (f64, usize)> = BTreeMap::new();
    for row in 0..table.n_rows() {
        if let Some(cost) = numeric_at(table, row, "ingredient_cost") {
            let entry = sums.entry(keys[row].clone()).or_insert((0.0, 0));
            entry.0 += cost;
            entry.1 += 1;
        }
    }

    let has_total = table.has_column("total_sale");
    for row in 0..table.n_rows() {
        if table.cell(row, "ingredient_cost").is_some() {
            continue;
        }
        let category_mean = sums
            .get(&keys[row])
            .map(|(sum, count)| sum / *count as f64);
        let fallback = if has_total {
            numeric_at(table, row, "total_sale").map(|sale| sale * 0.35)
        } else {
            None
        };
        if let Some(value) = category_mean.or(fallback) {
            table.set_cell(row, "ingredient_cost", Some(Cell::Float(value)));
        }
    }
}

fn clean_customers(table: &mut Table) {
    coerce_numeric_columns(table, CUSTOMERS_NUMERIC);
    coerce_date_column(table, "register_date");
    coerce_date_column(table, "last_visit");
    coerce_boolean_columns(table, &["loyalty_member", "accepts_promotions"]);

    if table.has_column("estimated_total_spend")
        && table.has_column("avg_spend")
        && table.has_column("visits_last_year")
    {
        for row in 0..table.n_rows() {
            if table.cell(row, "estimated_total_spend").is_none()
                && let (Some(avg), Some(visits)) = (
                    numeric_at(table, row, "avg_spend"),
                    numeric_at(table, row, "visits_last_year"),
                )
            {
                table.set_cell(row, "estimated_total_spend", Some(Cell::Float(avg * visits)));
            }
        }
    }
}

fn clean_branches(table: &mut Table) {
    coerce_numeric_columns(table, BRANCHES_NUMERIC);
    // Identifier-like fields stay textual; a numeric postal code from a
    // spreadsheet must not diverge from its CSV twin.
    stringify_columns(table, BRANCHES_TEXT);
}

fn clean_inventory(table: &mut Table) {
    coerce_numeric_columns(table, INVENTORY_NUMERIC);
    coerce_date_column(table, "date");
    add_year_month(table);
    coerce_boolean_columns(table, &["needs_reorder"]);
    table.map_column("waste_pct", |cell| {
        cell.and_then(|c| coerce_numeric(&c))
            .map(|v| Cell::Float(v.max(0.0)))
    });
}

fn clean_digital(table: &mut Table) {
    coerce_numeric_columns(table, DIGITAL_NUMERIC);
    coerce_date_column(table, "date");
    add_year_month(table);
    coerce_boolean_columns(table, &["conversion", "responded"]);
    table.map_column("sentiment", |cell| {
        cell.map(|c| Cell::String(c.as_display().trim().to_lowercase()))
    });
}

/// Cleans one dataset: canonical names, blank-to-missing, the dataset's own
/// coercion and derivation rules, then full-row deduplication.
pub fn clean_dataset(
    dataset: Dataset,
    table: &Table,
    schema: &DatasetSchema,
    logger: &dyn PipelineLogger,
) -> Table {
    let mut clean = standardize_columns(table, schema);
    blank_strings_to_missing(&mut clean);

    match dataset {
        Dataset::Sales => clean_sales(&mut clean),
        Dataset::Customers => clean_customers(&mut clean),
        Dataset::Branches => clean_branches(&mut clean),
        Dataset::Inventory => clean_inventory(&mut clean),
        Dataset::Digital => clean_digital(&mut clean),
    }

    clean.drop_duplicate_rows();
    logger.info(&format!(
        "Dataset cleaned: {dataset} | rows={} | columns={}",
        clean.n_rows(),
        clean.n_cols()
    ));
    clean
}

pub fn clean_datasets(
    raw_tables: &BTreeMap<Dataset, Table>,
    schema_map: &SchemaMap,
    logger: &dyn PipelineLogger,
) -> (BTreeMap<Dataset, Table>, BTreeMap<Dataset, CleanReport>) {
    let empty = DatasetSchema::default();
    let mut cleaned = BTreeMap::new();
    let mut report = BTreeMap::new();

    for (dataset, table) in raw_tables {
        let schema = schema_map.dataset(*dataset).unwrap_or(&empty);
        let clean = clean_dataset(*dataset, table, schema, logger);
        let missing_pct = if clean.is_empty() {
            BTreeMap::new()
        } else {
            clean
                .columns()
                .iter()
                .filter_map(|column| {
                    clean
                        .null_pct(column)
                        .map(|pct| (column.clone(), round2(pct)))
                })
                .collect()
        };
        report.insert(
            *dataset,
            CleanReport {
                rows: clean.n_rows(),
                columns: clean.columns().to_vec(),
                missing_pct,
            },
        );
        cleaned.insert(*dataset, clean);
    }
    (cleaned, report)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::RecordingLogger;

    fn sales_schema() -> DatasetSchema {
        DatasetSchema {
            canonical_to_aliases: vec![
                ("ticket_id".into(), vec!["Ticket_ID".into()]),
                ("date".into(), vec!["Fecha".into()]),
                ("time".into(), vec!["Hora".into()]),
                ("total_sale".into(), vec!["Total_Venta".into()]),
                ("unit_price".into(), vec!["Precio_Unitario".into()]),
                ("quantity".into(), vec!["Cantidad".into()]),
            ],
            required_columns: vec!["ticket_id".into()],
        }
    }

    #[test]
    fn standardize_columns_prefers_canonical_over_alias() {
        let mut table = Table::with_columns(["total_sale", "Total_Venta"]);
        table.push_row(vec![
            Some(Cell::String("100".into())),
            Some(Cell::String("999".into())),
        ]);
        let out = standardize_columns(&table, &sales_schema());
        assert_eq!(out.columns(), ["total_sale", "total_venta"]);
        assert_eq!(out.cell(0, "total_sale"), Some(&Cell::String("100".into())));
    }

    #[test]
    fn daypart_label_covers_boundaries() {
        assert_eq!(daypart_label(Some(5)), "Night");
        assert_eq!(daypart_label(Some(6)), "Morning");
        assert_eq!(daypart_label(Some(11)), "Morning");
        assert_eq!(daypart_label(Some(12)), "Lunch");
        assert_eq!(daypart_label(Some(16)), "Lunch");
        assert_eq!(daypart_label(Some(17)), "Evening");
        assert_eq!(daypart_label(Some(20)), "Evening");
        assert_eq!(daypart_label(Some(21)), "Night");
        assert_eq!(daypart_label(None), NO_DATA);
    }

    #[test]
    fn clean_sales_backfills_total_and_derives_daypart() {
        let mut table = Table::with_columns([
            "Ticket_ID",
            "Fecha",
            "Hora",
            "Precio_Unitario",
            "Cantidad",
            "Total_Venta",
        ]);
        table.push_row(vec![
            Some(Cell::String("T1".into())),
            Some(Cell::String("2025-03-10".into())),
            Some(Cell::String("12:30".into())),
            Some(Cell::String("50".into())),
            Some(Cell::String("3".into())),
            None,
        ]);
        let logger = RecordingLogger::default();
        let out = clean_dataset(Dataset::Sales, &table, &sales_schema(), &logger);

        assert_eq!(out.cell(0, "total_sale"), Some(&Cell::Float(150.0)));
        assert_eq!(out.cell(0, "hour"), Some(&Cell::Integer(12)));
        assert_eq!(out.cell(0, "daypart"), Some(&Cell::String("Lunch".into())));
        assert_eq!(
            out.cell(0, "year_month"),
            Some(&Cell::String("2025-03".into()))
        );
        assert_eq!(out.cell(0, "month"), Some(&Cell::String("March".into())));
        assert_eq!(
            out.cell(0, "day_of_week"),
            Some(&Cell::String("Monday".into()))
        );
    }

    #[test]
    fn time_values_truncate_to_hours_and_minutes() {
        let mut table = Table::with_columns(["Ticket_ID", "Hora"]);
        table.push_row(vec![
            Some(Cell::String("T1".into())),
            Some(Cell::String("13:10:59".into())),
        ]);
        let logger = RecordingLogger::default();
        let out = clean_dataset(Dataset::Sales, &table, &sales_schema(), &logger);

        assert_eq!(out.cell(0, "time"), Some(&Cell::String("13:10".into())));
        assert_eq!(out.cell(0, "hour"), Some(&Cell::Integer(13)));
    }

    #[test]
    fn ingredient_cost_backfills_category_mean_then_share_of_sale() {
        let mut table = Table::with_columns(["category", "total_sale", "ingredient_cost"]);
        table.push_row(vec![
            Some(Cell::String("Tacos".into())),
            Some(Cell::Float(100.0)),
            Some(Cell::Float(30.0)),
        ]);
        table.push_row(vec![
            Some(Cell::String("Tacos".into())),
            Some(Cell::Float(120.0)),
            None,
        ]);
        table.push_row(vec![
            Some(Cell::String("Bebidas".into())),
            Some(Cell::Float(200.0)),
            None,
        ]);
        backfill_ingredient_cost(&mut table);

        assert_eq!(table.cell(1, "ingredient_cost"), Some(&Cell::Float(30.0)));
        assert_eq!(table.cell(2, "ingredient_cost"), Some(&Cell::Float(70.0)));
    }

    #[test]
    fn clean_branches_stringifies_postal_codes() {
        let schema = DatasetSchema {
            canonical_to_aliases: vec![
                ("branch_id".into(), vec!["Sucursal_ID".into()]),
                ("postal_code".into(), vec!["Codigo_Postal".into()]),
            ],
            required_columns: vec![],
        };
        let mut table = Table::with_columns(["Sucursal_ID", "Codigo_Postal"]);
        table.push_row(vec![
            Some(Cell::String("S01".into())),
            Some(Cell::Float(6600.0)),
        ]);
        let logger = RecordingLogger::default();
        let out = clean_dataset(Dataset::Branches, &table, &schema, &logger);
        assert_eq!(
            out.cell(0, "postal_code"),
            Some(&Cell::String("6600".into()))
        );
    }

    #[test]
    fn cleaning_is_idempotent_on_cleaned_sales() {
        let mut table = Table::with_columns(["Ticket_ID", "Fecha", "Hora", "Total_Venta"]);
        table.push_row(vec![
            Some(Cell::String("T1".into())),
            Some(Cell::String("2025-03-10".into())),
            Some(Cell::String("09:00".into())),
            Some(Cell::String("80".into())),
        ]);
        let logger = RecordingLogger::default();
        let once = clean_dataset(Dataset::Sales, &table, &sales_schema(), &logger);
        let twice = clean_dataset(Dataset::Sales, &once, &sales_schema(), &logger);
        assert_eq!(once, twice);
    }

    #[test]
    fn blank_strings_become_missing() {
        let schema = DatasetSchema::default();
        let mut table = Table::with_columns(["note"]);
        table.push_row(vec![Some(Cell::String("   ".into()))]);
        table.push_row(vec![Some(Cell::String("ok".into()))]);
        let logger = RecordingLogger::default();
        let out = clean_dataset(Dataset::Digital, &table, &schema, &logger);
        assert_eq!(out.cell(0, "note"), None);
        assert_eq!(out.cell(1, "note"), Some(&Cell::String("ok".into())));
    }
}

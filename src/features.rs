//! Analytics feature builders.
//!
//! Two tables come out of here: a branch/day/hour sales aggregate enriched
//! with branch dimensions and daily digital signals, and a per-customer
//! value proxy (recency, frequency, monetary). The sales aggregation runs
//! on one of two interchangeable backends that must produce identical
//! output; the hashed one trades ordering work for throughput on wide
//! group counts.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDate, Utc};
use itertools::Itertools;

use crate::{
    clean::NO_DATA,
    data::{Cell, coerce_numeric},
    frame::{Table, row_key},
    logger::PipelineLogger,
    schema_map::Dataset,
    settings::Settings,
};

pub const BRANCH_DAY_HOUR: &str = "analytics_branch_day_hour";
pub const CUSTOMER_PROXY: &str = "analytics_customer_proxy";

const GROUP_COLUMNS: &[&str] = &[
    "branch_id",
    "branch_name",
    "city",
    "date",
    "year_month",
    "hour",
    "daypart",
];
const SUM_COLUMNS: &[&str] = &[
    "quantity",
    "total_sale",
    "ingredient_cost",
    "gross_margin",
    "tip",
];
const BRANCH_DIM_COLUMNS: &[&str] = &[
    "branch_id",
    "socioeconomic_level",
    "capacity_people",
    "num_employees",
    "operational_cost_total",
    "city",
];
const DIGITAL_METRIC_COLUMNS: &[&str] = &[
    "digital_engagement",
    "digital_sentiment_score",
    "digital_conversion_rate",
];

#[derive(Debug, Default)]
pub struct FeatureTables {
    pub branch_day_hour: Table,
    pub customer_proxy: Table,
}

impl FeatureTables {
    pub fn named(&self) -> [(&'static str, &Table); 2] {
        [
            (BRANCH_DAY_HOUR, &self.branch_day_hour),
            (CUSTOMER_PROXY, &self.customer_proxy),
        ]
    }
}

/// Sentiment polarity score. Unrecognized labels count as neutral rather
/// than dropping the observation.
pub fn sentiment_score(label: &str) -> f64 {
    match label.trim().to_lowercase().as_str() {
        "positive" | "positivo" => 1.0,
        "negative" | "negativo" => -1.0,
        _ => 0.0,
    }
}

fn numeric_at(table: &Table, row: usize, column: &str) -> Option<f64> {
    table.cell(row, column).and_then(coerce_numeric)
}

/// Normalizes sales for aggregation: measures present and zero-filled,
/// grouping dimensions present (with defaults where the source lacked
/// them), and a ticket identity for every row.
fn prepare_sales_work(sales: &Table) -> Table {
    let mut work = sales.clone();
    work.map_column("date", |cell| {
        cell.and_then(|c| c.as_date()).map(Cell::Date)
    });

    for column in SUM_COLUMNS {
        if !work.has_column(column) {
            work.set_const_column(column, Some(Cell::Float(0.0)));
        } else {
            work.map_column(column, |cell| {
                Some(Cell::Float(
                    cell.and_then(|c| coerce_numeric(&c)).unwrap_or(0.0),
                ))
            });
        }
    }

    if !work.has_column("ticket_id") {
        let values = (0..work.n_rows())
            .map(|row| Some(Cell::String(row.to_string())))
            .collect();
        work.set_column("ticket_id", values);
    }
    if !work.has_column("hour") {
        work.set_const_column("hour", None);
    }
    for column in ["daypart", "payment_method", "city"] {
        if !work.has_column(column) {
            work.set_const_column(column, Some(Cell::String(NO_DATA.into())));
        }
    }
    // Degraded sources may lack the branch dimensions entirely; grouping
    // still needs the columns, so they exist as all-missing.
    for column in ["branch_id", "branch_name"] {
        if !work.has_column(column) {
            work.set_const_column(column, None);
        }
    }
    if !work.has_column("year_month") && work.has_column("date") {
        let values = (0..work.n_rows())
            .map(|row| {
                work.cell(row, "date")
                    .and_then(|c| c.as_date())
                    .map(|d| Cell::String(d.format("%Y-%m").to_string()))
            })
            .collect();
        work.set_column("year_month", values);
    }
    work
}

#[derive(Debug, Default, Clone)]
struct GroupAccumulator {
    ticket_ids: BTreeSet<String>,
    quantity: f64,
    revenue: f64,
    ingredient_cost: f64,
    gross_margin: f64,
    tips: f64,
}

impl GroupAccumulator {
    fn absorb(&mut self, work: &Table, row: usize) {
        if let Some(ticket) = work.cell(row, "ticket_id") {
            self.ticket_ids.insert(ticket.as_display());
        }
        self.quantity += numeric_at(work, row, "quantity").unwrap_or(0.0);
        self.revenue += numeric_at(work, row, "total_sale").unwrap_or(0.0);
        self.ingredient_cost += numeric_at(work, row, "ingredient_cost").unwrap_or(0.0);
        self.gross_margin += numeric_at(work, row, "gross_margin").unwrap_or(0.0);
        self.tips += numeric_at(work, row, "tip").unwrap_or(0.0);
    }
}

fn group_key_cells(work: &Table, row: usize) -> Vec<Option<Cell>> {
    GROUP_COLUMNS
        .iter()
        .map(|column| work.cell(row, column).cloned())
        .collect()
}

fn finish_groups(groups: Vec<(Vec<Option<Cell>>, GroupAccumulator)>) -> Table {
    let mut columns: Vec<String> = GROUP_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(
        [
            "tickets",
            "total_quantity",
            "revenue",
            "ingredient_cost",
            "gross_margin",
            "tips",
            "avg_ticket",
        ]
        .map(String::from),
    );

    let mut table = Table::with_columns(columns);
    for (key, acc) in groups {
        let tickets = acc.ticket_ids.len();
        let avg_ticket = if tickets == 0 {
            0.0
        } else {
            acc.revenue / tickets as f64
        };
        let mut row = key;
        row.push(Some(Cell::Integer(tickets as i64)));
        row.push(Some(Cell::Float(acc.quantity)));
        row.push(Some(Cell::Float(acc.revenue)));
        row.push(Some(Cell::Float(acc.ingredient_cost)));
        row.push(Some(Cell::Float(acc.gross_margin)));
        row.push(Some(Cell::Float(acc.tips)));
        row.push(Some(Cell::Float(avg_ticket)));
        table.push_row(row);
    }
    table
}

/// Groups sales by the seven-column branch/day/hour key. Implementations
/// must agree cell for cell; the backend choice is a performance knob,
/// never a semantic one. Both key on the display-form composite from
/// [`row_key`], so `Integer(1)` and `String("1")` land in the same group
/// either way, with the first-seen cells as the group's representative.
pub trait AggregationBackend {
    fn name(&self) -> &'static str;
    fn aggregate(&self, work: &Table) -> Table;
}

/// Reference backend: ordered map keyed by the composite key string, so
/// output rows are emitted in key order directly.
pub struct SortedBackend;

impl AggregationBackend for SortedBackend {
    fn name(&self) -> &'static str {
        "sorted"
    }

    fn aggregate(&self, work: &Table) -> Table {
        let mut groups: BTreeMap<String, (Vec<Option<Cell>>, GroupAccumulator)> = BTreeMap::new();
        for row in 0..work.n_rows() {
            let key = group_key_cells(work, row);
            groups
                .entry(row_key(&key))
                .or_insert_with(|| (key, GroupAccumulator::default()))
                .1
                .absorb(work, row);
        }
        finish_groups(groups.into_values().collect())
    }
}

/// Hash-grouping backend: accumulates per composite key, then sorts once
/// at the end to match the reference ordering.
pub struct HashedBackend;

impl AggregationBackend for HashedBackend {
    fn name(&self) -> &'static str {
        "hashed"
    }

    fn aggregate(&self, work: &Table) -> Table {
        let mut groups: HashMap<String, (Vec<Option<Cell>>, GroupAccumulator)> = HashMap::new();
        for row in 0..work.n_rows() {
            let key = group_key_cells(work, row);
            groups
                .entry(row_key(&key))
                .or_insert_with(|| (key, GroupAccumulator::default()))
                .1
                .absorb(work, row);
        }
        let sorted: Vec<(Vec<Option<Cell>>, GroupAccumulator)> = groups
            .into_iter()
            .sorted_by(|(key_a, _), (key_b, _)| key_a.cmp(key_b))
            .map(|(_, group)| group)
            .collect();
        finish_groups(sorted)
    }
}

pub fn select_backend(fast_aggregation: bool) -> Box<dyn AggregationBackend> {
    if fast_aggregation {
        Box::new(HashedBackend)
    } else {
        Box::new(SortedBackend)
    }
}

fn attach_branch_dimensions(base: &mut Table, branches: &Table) {
    let existing: Vec<&str> = BRANCH_DIM_COLUMNS
        .iter()
        .copied()
        .filter(|column| branches.has_column(column))
        .collect();
    if !existing.contains(&"branch_id") {
        return;
    }

    // First row wins per branch id, missing keys never join.
    let mut lookup: BTreeMap<String, usize> = BTreeMap::new();
    for row in 0..branches.n_rows() {
        if let Some(id) = branches.cell(row, "branch_id") {
            lookup.entry(id.as_display()).or_insert(row);
        }
    }

    let base_branch_rows: Vec<Option<usize>> = (0..base.n_rows())
        .map(|row| {
            base.cell(row, "branch_id")
                .and_then(|id| lookup.get(&id.as_display()))
                .copied()
        })
        .collect();

    for column in existing {
        if column == "branch_id" {
            continue;
        }
        let values: Vec<Option<Cell>> = base_branch_rows
            .iter()
            .map(|branch_row| branch_row.and_then(|b| branches.cell(b, column).cloned()))
            .collect();
        if base.has_column(column) {
            // Sales-side value wins; the branch catalog only fills gaps.
            for (row, value) in values.into_iter().enumerate() {
                if base.cell(row, column).is_none() {
                    base.set_cell(row, column, value);
                }
            }
        } else {
            base.set_column(column, values);
        }
    }
}

#[derive(Debug, Default)]
struct DigitalDaily {
    engagement_sum: f64,
    sentiment_sum: f64,
    sentiment_count: usize,
    conversion_sum: f64,
    conversion_count: usize,
}

fn attach_digital_signals(base: &mut Table, digital: &Table) {
    let usable = !digital.is_empty()
        && digital.has_column("branch_id")
        && digital.has_column("date")
        && digital.has_column("sentiment");
    if usable {
        let mut daily: BTreeMap<(String, NaiveDate), DigitalDaily> = BTreeMap::new();
        for row in 0..digital.n_rows() {
            let (Some(branch), Some(date)) = (
                digital.cell(row, "branch_id").map(Cell::as_display),
                digital.cell(row, "date").and_then(|c| c.as_date()),
            ) else {
                continue;
            };
            let entry = daily.entry((branch, date)).or_default();
            if let Some(engagement) = numeric_at(digital, row, "engagement") {
                entry.engagement_sum += engagement;
            }
            let score = digital
                .cell(row, "sentiment")
                .map(|c| sentiment_score(&c.as_display()))
                .unwrap_or(0.0);
            entry.sentiment_sum += score;
            entry.sentiment_count += 1;
            if digital.has_column("conversion")
                && let Some(conversion) = numeric_at(digital, row, "conversion")
            {
                entry.conversion_sum += conversion;
                entry.conversion_count += 1;
            }
        }

        let metrics: Vec<[Option<f64>; 3]> = (0..base.n_rows())
            .map(|row| {
                let key = match (
                    base.cell(row, "branch_id").map(Cell::as_display),
                    base.cell(row, "date").and_then(|c| c.as_date()),
                ) {
                    (Some(branch), Some(date)) => Some((branch, date)),
                    _ => None,
                };
                match key.and_then(|k| daily.get(&k)) {
                    Some(entry) => [
                        Some(entry.engagement_sum),
                        Some(entry.sentiment_sum / entry.sentiment_count as f64),
                        (entry.conversion_count > 0)
                            .then(|| entry.conversion_sum / entry.conversion_count as f64),
                    ],
                    None => [None, None, None],
                }
            })
            .collect();
        for (idx, column) in DIGITAL_METRIC_COLUMNS.iter().enumerate() {
            let values = metrics.iter().map(|m| m[idx].map(Cell::Float)).collect();
            base.set_column(column, values);
        }
    }

    for column in DIGITAL_METRIC_COLUMNS {
        if !base.has_column(column) {
            base.set_const_column(column, Some(Cell::Float(0.0)));
        } else {
            base.map_column(column, |cell| {
                Some(cell.unwrap_or(Cell::Float(0.0)))
            });
        }
    }
}

pub fn build_branch_day_hour_table(
    sales: &Table,
    branches: &Table,
    digital: &Table,
    backend: &dyn AggregationBackend,
) -> Table {
    if sales.is_empty() {
        return Table::new();
    }
    let work = prepare_sales_work(sales);
    let mut base = backend.aggregate(&work);
    attach_branch_dimensions(&mut base, branches);
    attach_digital_signals(&mut base, digital);
    base
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

pub fn build_customer_proxy_table(customers: &Table, reference_date: Option<NaiveDate>) -> Table {
    if customers.is_empty() {
        return Table::new();
    }
    let reference = reference_date.unwrap_or_else(|| Utc::now().date_naive());

    let mut work = customers.clone();
    if work.has_column("last_visit") {
        work.map_column("last_visit", |cell| {
            cell.and_then(|c| c.as_date()).map(Cell::Date)
        });
    } else {
        work.set_const_column("last_visit", None);
    }
    for column in [
        "estimated_total_spend",
        "avg_spend",
        "loyalty_points",
        "satisfaction_score",
        "nps_score",
    ] {
        if !work.has_column(column) {
            work.set_const_column(column, None);
        }
    }
    if !work.has_column("visits_last_year") {
        work.set_const_column("visits_last_year", Some(Cell::Float(0.0)));
    }

    let frequencies: Vec<f64> = (0..work.n_rows())
        .map(|row| numeric_at(&work, row, "visits_last_year").unwrap_or(0.0))
        .collect();
    work.set_column(
        "frequency",
        frequencies.iter().map(|f| Some(Cell::Float(*f))).collect(),
    );

    let monetary: Vec<Option<Cell>> = (0..work.n_rows())
        .map(|row| {
            let direct = numeric_at(&work, row, "estimated_total_spend");
            let value = direct.unwrap_or_else(|| {
                numeric_at(&work, row, "avg_spend").unwrap_or(0.0) * frequencies[row]
            });
            Some(Cell::Float(value))
        })
        .collect();
    work.set_column("monetary", monetary);

    // Median imputation happens before the zero clip, so early reference
    // dates cannot drag imputed recencies negative.
    let raw_recency: Vec<Option<f64>> = (0..work.n_rows())
        .map(|row| {
            work.cell(row, "last_visit")
                .and_then(|c| c.as_date())
                .map(|visit| (reference - visit).num_days() as f64)
        })
        .collect();
    let recency_median = median(raw_recency.iter().flatten().copied().collect());
    let recency: Vec<Option<Cell>> = raw_recency
        .iter()
        .map(|days| {
            days.or(recency_median)
                .map(|value| Cell::Float(value.max(0.0)))
        })
        .collect();
    work.set_column("recency_days", recency);

    work.select(&[
        "customer_id",
        "name",
        "preferred_branch",
        "preferred_city",
        "customer_category",
        "acquisition_channel",
        "loyalty_member",
        "accepts_promotions",
        "loyalty_points",
        "satisfaction_score",
        "nps_score",
        "recency_days",
        "frequency",
        "monetary",
    ])
}

/// Builds both feature tables from the cleaned datasets. The reference
/// date for recency is the latest sales date, falling back to today.
pub fn build_features(
    clean_tables: &BTreeMap<Dataset, Table>,
    settings: &Settings,
    logger: &dyn PipelineLogger,
) -> FeatureTables {
    let empty = Table::new();
    let sales = clean_tables.get(&Dataset::Sales).unwrap_or(&empty);
    let branches = clean_tables.get(&Dataset::Branches).unwrap_or(&empty);
    let customers = clean_tables.get(&Dataset::Customers).unwrap_or(&empty);
    let digital = clean_tables.get(&Dataset::Digital).unwrap_or(&empty);

    let reference_date = sales
        .column_values("date")
        .map(|values| {
            values
                .iter()
                .filter_map(|cell| cell.as_ref().and_then(|c| c.as_date()))
                .max()
        })
        .unwrap_or(None);

    let backend = select_backend(settings.runtime.fast_aggregation);
    logger.info(&format!(
        "Aggregation backend: {} | reference_date={}",
        backend.name(),
        reference_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "today".to_string())
    ));

    let branch_day_hour = build_branch_day_hour_table(sales, branches, digital, backend.as_ref());
    let customer_proxy = build_customer_proxy_table(customers, reference_date);
    logger.info(&format!(
        "Feature tables built: {BRANCH_DAY_HOUR}={} rows, {CUSTOMER_PROXY}={} rows",
        branch_day_hour.n_rows(),
        customer_proxy.n_rows()
    ));

    FeatureTables {
        branch_day_hour,
        customer_proxy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_fixture() -> Table {
        let mut table = Table::with_columns([
            "ticket_id",
            "branch_id",
            "branch_name",
            "city",
            "date",
            "year_month",
            "hour",
            "daypart",
            "quantity",
            "total_sale",
            "ingredient_cost",
            "gross_margin",
            "tip",
        ]);
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        for (ticket, total) in [("T1", 150.0), ("T1", 100.0), ("T2", 150.0)] {
            table.push_row(vec![
                Some(Cell::String(ticket.into())),
                Some(Cell::String("S01".into())),
                Some(Cell::String("Centro".into())),
                Some(Cell::String("CDMX".into())),
                Some(Cell::Date(date)),
                Some(Cell::String("2025-03".into())),
                Some(Cell::Integer(13)),
                Some(Cell::String("Lunch".into())),
                Some(Cell::Float(1.0)),
                Some(Cell::Float(total)),
                Some(Cell::Float(40.0)),
                Some(Cell::Float(total - 40.0)),
                Some(Cell::Float(10.0)),
            ]);
        }
        table
    }

    #[test]
    fn sorted_backend_counts_distinct_tickets() {
        let work = prepare_sales_work(&sales_fixture());
        let out = SortedBackend.aggregate(&work);
        assert_eq!(out.n_rows(), 1);
        assert_eq!(out.cell(0, "tickets"), Some(&Cell::Integer(2)));
        assert_eq!(out.cell(0, "revenue"), Some(&Cell::Float(400.0)));
        assert_eq!(out.cell(0, "avg_ticket"), Some(&Cell::Float(200.0)));
    }

    #[test]
    fn backends_produce_identical_tables() {
        let mut sales = sales_fixture();
        let other_date = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        sales.push_row(vec![
            Some(Cell::String("T9".into())),
            Some(Cell::String("S02".into())),
            Some(Cell::String("Norte".into())),
            None,
            Some(Cell::Date(other_date)),
            Some(Cell::String("2025-03".into())),
            None,
            Some(Cell::String(NO_DATA.into())),
            Some(Cell::Float(2.0)),
            Some(Cell::Float(80.0)),
            Some(Cell::Float(20.0)),
            Some(Cell::Float(60.0)),
            Some(Cell::Float(0.0)),
        ]);
        let work = prepare_sales_work(&sales);
        assert_eq!(SortedBackend.aggregate(&work), HashedBackend.aggregate(&work));
    }

    #[test]
    fn backends_merge_mixed_type_keys_identically() {
        let mut sales = Table::with_columns(["ticket_id", "branch_id", "total_sale"]);
        // Same branch arriving as a number in one source and a string in
        // another must collapse into one group on either backend.
        sales.push_row(vec![
            Some(Cell::String("T1".into())),
            Some(Cell::Integer(1)),
            Some(Cell::Float(100.0)),
        ]);
        sales.push_row(vec![
            Some(Cell::String("T2".into())),
            Some(Cell::String("1".into())),
            Some(Cell::Float(300.0)),
        ]);
        let work = prepare_sales_work(&sales);
        let sorted = SortedBackend.aggregate(&work);
        let hashed = HashedBackend.aggregate(&work);

        assert_eq!(sorted.n_rows(), 1);
        assert_eq!(sorted.cell(0, "tickets"), Some(&Cell::Integer(2)));
        assert_eq!(sorted.cell(0, "revenue"), Some(&Cell::Float(400.0)));
        assert_eq!(sorted.cell(0, "avg_ticket"), Some(&Cell::Float(200.0)));
        assert_eq!(sorted, hashed);
    }

    #[test]
    fn non_numeric_sale_tokens_aggregate_as_zero() {
        let mut sales = Table::with_columns(["ticket_id", "branch_id", "total_sale"]);
        sales.push_row(vec![
            Some(Cell::String("T1".into())),
            Some(Cell::String("S01".into())),
            Some(Cell::String("NaN".into())),
        ]);
        let work = prepare_sales_work(&sales);
        let out = SortedBackend.aggregate(&work);

        assert_eq!(out.cell(0, "revenue"), Some(&Cell::Float(0.0)));
        assert_eq!(out.cell(0, "avg_ticket"), Some(&Cell::Float(0.0)));
    }

    #[test]
    fn avg_ticket_guards_division_by_zero() {
        let mut sales = Table::with_columns(["ticket_id", "branch_id", "total_sale"]);
        sales.push_row(vec![None, Some(Cell::String("S01".into())), None]);
        let work = prepare_sales_work(&sales);
        // Drop the ticket identity so the group has zero distinct tickets.
        let mut stripped = work.clone();
        stripped.set_const_column("ticket_id", None);
        let out = SortedBackend.aggregate(&stripped);
        assert_eq!(out.cell(0, "tickets"), Some(&Cell::Integer(0)));
        assert_eq!(out.cell(0, "avg_ticket"), Some(&Cell::Float(0.0)));
    }

    #[test]
    fn sentiment_score_maps_polarity() {
        assert_eq!(sentiment_score("Positive"), 1.0);
        assert_eq!(sentiment_score("positivo"), 1.0);
        assert_eq!(sentiment_score("neutral"), 0.0);
        assert_eq!(sentiment_score("NEGATIVE"), -1.0);
        assert_eq!(sentiment_score("weird"), 0.0);
    }

    #[test]
    fn customer_proxy_monetary_falls_back_to_spend_times_frequency() {
        let mut customers = Table::with_columns([
            "customer_id",
            "last_visit",
            "visits_last_year",
            "avg_spend",
            "estimated_total_spend",
        ]);
        customers.push_row(vec![
            Some(Cell::String("C1".into())),
            Some(Cell::String("2025-03-01".into())),
            Some(Cell::Float(5.0)),
            Some(Cell::Float(240.0)),
            None,
        ]);
        customers.push_row(vec![
            Some(Cell::String("C2".into())),
            Some(Cell::String("2025-02-19".into())),
            Some(Cell::Float(2.0)),
            Some(Cell::Float(100.0)),
            Some(Cell::Float(900.0)),
        ]);
        let reference = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let out = build_customer_proxy_table(&customers, Some(reference));

        assert_eq!(out.cell(0, "monetary"), Some(&Cell::Float(1200.0)));
        assert_eq!(out.cell(1, "monetary"), Some(&Cell::Float(900.0)));
        assert_eq!(out.cell(0, "recency_days"), Some(&Cell::Float(10.0)));
        assert_eq!(out.cell(0, "frequency"), Some(&Cell::Float(5.0)));
    }

    #[test]
    fn recency_is_median_imputed_then_clipped() {
        let mut customers = Table::with_columns(["customer_id", "last_visit"]);
        customers.push_row(vec![
            Some(Cell::String("C1".into())),
            Some(Cell::String("2025-03-01".into())),
        ]);
        customers.push_row(vec![
            Some(Cell::String("C2".into())),
            Some(Cell::String("2025-03-21".into())),
        ]);
        customers.push_row(vec![Some(Cell::String("C3".into())), None]);
        let reference = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let out = build_customer_proxy_table(&customers, Some(reference));

        assert_eq!(out.cell(0, "recency_days"), Some(&Cell::Float(10.0)));
        // Raw -10 clips to zero after the median is taken.
        assert_eq!(out.cell(1, "recency_days"), Some(&Cell::Float(0.0)));
        assert_eq!(out.cell(2, "recency_days"), Some(&Cell::Float(0.0)));
    }

    #[test]
    fn digital_signals_join_on_branch_and_day() {
        let sales = sales_fixture();
        let mut digital = Table::with_columns([
            "branch_id",
            "date",
            "sentiment",
            "engagement",
            "conversion",
        ]);
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        digital.push_row(vec![
            Some(Cell::String("S01".into())),
            Some(Cell::Date(date)),
            Some(Cell::String("positive".into())),
            Some(Cell::Float(120.0)),
            Some(Cell::Boolean(true)),
        ]);
        digital.push_row(vec![
            Some(Cell::String("S01".into())),
            Some(Cell::Date(date)),
            Some(Cell::String("negative".into())),
            Some(Cell::Float(30.0)),
            Some(Cell::Boolean(false)),
        ]);
        let out = build_branch_day_hour_table(&sales, &Table::new(), &digital, &SortedBackend);

        assert_eq!(out.cell(0, "digital_engagement"), Some(&Cell::Float(150.0)));
        assert_eq!(
            out.cell(0, "digital_sentiment_score"),
            Some(&Cell::Float(0.0))
        );
        assert_eq!(
            out.cell(0, "digital_conversion_rate"),
            Some(&Cell::Float(0.5))
        );
    }

    #[test]
    fn branch_dimensions_fill_missing_city_only() {
        let mut sales = sales_fixture();
        sales.set_const_column("city", None);
        let mut branches = Table::with_columns(["branch_id", "city", "capacity_people"]);
        branches.push_row(vec![
            Some(Cell::String("S01".into())),
            Some(Cell::String("Guadalajara".into())),
            Some(Cell::Float(80.0)),
        ]);
        let out = build_branch_day_hour_table(&sales, &branches, &Table::new(), &SortedBackend);

        assert_eq!(
            out.cell(0, "city"),
            Some(&Cell::String("Guadalajara".into()))
        );
        assert_eq!(out.cell(0, "capacity_people"), Some(&Cell::Float(80.0)));
    }
}

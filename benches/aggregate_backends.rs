use chrono::NaiveDate;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use mesa_analytics::data::Cell;
use mesa_analytics::features::{AggregationBackend, HashedBackend, SortedBackend};
use mesa_analytics::frame::Table;

fn generate_sales(rows: usize) -> Table {
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
    let base = NaiveDate::from_ymd_opt(2025, 1, 1).expect("base date");
    for i in 0..rows {
        let branch = i % 12;
        let day = (i % 90) as i64;
        let hour = 8 + (i % 14) as i64;
        let date = base + chrono::Duration::days(day);
        let daypart = match hour {
            6..12 => "Morning",
            12..17 => "Lunch",
            17..21 => "Evening",
            _ => "Night",
        };
        let total = 40.0 + (i % 17) as f64 * 12.5;
        table.push_row(vec![
            Some(Cell::String(format!("T{i}"))),
            Some(Cell::String(format!("S{branch:02}"))),
            Some(Cell::String(format!("Branch {branch}"))),
            Some(Cell::String("CDMX".into())),
            Some(Cell::Date(date)),
            Some(Cell::String(date.format("%Y-%m").to_string())),
            Some(Cell::Integer(hour)),
            Some(Cell::String(daypart.into())),
            Some(Cell::Float(1.0 + (i % 4) as f64)),
            Some(Cell::Float(total)),
            Some(Cell::Float(total * 0.35)),
            Some(Cell::Float(total * 0.65)),
            Some(Cell::Float(total * 0.1)),
        ]);
    }
    table
}

fn bench_backends(c: &mut Criterion) {
    let sales = generate_sales(50_000);
    let mut group = c.benchmark_group("branch_day_hour_aggregation");

    group.bench_function("sorted", |b| {
        b.iter_batched(
            || sales.clone(),
            |work| SortedBackend.aggregate(&work),
            BatchSize::LargeInput,
        )
    });
    group.bench_function("hashed", |b| {
        b.iter_batched(
            || sales.clone(),
            |work| HashedBackend.aggregate(&work),
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_backends);
criterion_main!(benches);

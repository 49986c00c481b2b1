//! Export in-memory rows with every column type class
//!
//! ```text
//! cargo run --example memory_export
//! ```

use chrono::NaiveDate;
use sqlsheet::{ColumnType, ExportConfig, Exporter, MemorySource, RawValue};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== In-Memory Export ===\n");

    let columns = vec![
        ColumnType::new("id", "INT"),
        ColumnType::new("code", "CHAR"),
        ColumnType::new("page_url", "VARCHAR").with_nullable(true),
        ColumnType::new("created_at", "DATETIME"),
        ColumnType::new("flags", "BINARY"),
        ColumnType::new("trace_id", "UNIQUEIDENTIFIER"),
        ColumnType::new("amount", "DECIMAL"),
    ];

    let created = NaiveDate::from_ymd_opt(2019, 3, 12)
        .and_then(|d| d.and_hms_opt(13, 30, 22))
        .ok_or("invalid date")?;

    let mut source = MemorySource::new(columns);
    for i in 0..10_000u64 {
        source.push_row(vec![
            RawValue::from(i.to_string()),
            RawValue::from("xls     "),
            if i % 10 == 0 {
                RawValue::Null
            } else {
                RawValue::from(format!("http://bing.com?id={}", i))
            },
            RawValue::from(created),
            RawValue::from(i.to_be_bytes().to_vec()),
            RawValue::from((u128::from(i) << 64 | 0x4000_8000_0000_0000).to_be_bytes().to_vec()),
            RawValue::from(format!("{}.{:02}", i, i % 100)),
        ])?;
    }

    let config = ExportConfig::new("memory_export.xlsx")
        .with_header(true)
        .with_null_placeholder("NULL");
    let summary = Exporter::new(config).export(source)?;

    println!(
        "Exported {} rows to {} in {:.2}s",
        summary.rows,
        summary.path.display(),
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

//! Integration tests for sqlsheet

use chrono::NaiveDate;
use flate2::read::{DeflateDecoder, GzDecoder};
use sqlsheet::gzip::gzip_file;
use sqlsheet::seed::{SampleRecord, Seeder, SqlExecutor, SqlParam};
use sqlsheet::{
    ColumnType, ExportConfig, ExportError, Exporter, MemorySource, Placeholder, RawValue,
    SeedConfig,
};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;
use tempfile::{tempdir, NamedTempFile};

fn u16_at(buf: &[u8], at: usize) -> usize {
    u16::from_le_bytes([buf[at], buf[at + 1]]) as usize
}

fn u32_at(buf: &[u8], at: usize) -> usize {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]) as usize
}

/// Read every entry of a ZIP archive through its central directory
fn read_zip(path: &Path) -> HashMap<String, String> {
    let buf = std::fs::read(path).unwrap();
    let eocd = buf.len() - 22;
    assert_eq!(&buf[eocd..eocd + 4], b"PK\x05\x06");

    let count = u16_at(&buf, eocd + 10);
    let mut at = u32_at(&buf, eocd + 16);
    let mut entries = HashMap::new();

    for _ in 0..count {
        assert_eq!(&buf[at..at + 4], b"PK\x01\x02");
        let compressed = u32_at(&buf, at + 20);
        let name_len = u16_at(&buf, at + 28);
        let extra_len = u16_at(&buf, at + 30);
        let comment_len = u16_at(&buf, at + 32);
        let local = u32_at(&buf, at + 42);
        let name = String::from_utf8(buf[at + 46..at + 46 + name_len].to_vec()).unwrap();

        let data_start = local + 30 + u16_at(&buf, local + 26) + u16_at(&buf, local + 28);
        let mut text = String::new();
        DeflateDecoder::new(&buf[data_start..data_start + compressed])
            .read_to_string(&mut text)
            .unwrap();
        entries.insert(name, text);

        at += 46 + name_len + extra_len + comment_len;
    }
    entries
}

fn sheet_xml(path: &Path) -> String {
    read_zip(path)
        .remove("xl/worksheets/sheet1.xml")
        .expect("sheet1.xml missing")
}

fn log_columns() -> Vec<ColumnType> {
    vec![
        ColumnType::new("id", "INT"),
        ColumnType::new("code", "CHAR"),
        ColumnType::new("note", "VARCHAR").with_nullable(true),
        ColumnType::new("created_at", "DATETIME"),
        ColumnType::new("flags", "BINARY"),
        ColumnType::new("trace_id", "UNIQUEIDENTIFIER"),
        ColumnType::new("amount", "DECIMAL"),
    ]
}

fn log_row(id: u32) -> Vec<RawValue> {
    let created = NaiveDate::from_ymd_opt(2019, 3, 12)
        .unwrap()
        .and_hms_opt(13, 30, 22)
        .unwrap();
    vec![
        RawValue::from(id.to_string()),
        RawValue::from("AB   "),
        RawValue::from("  x < y & z  "),
        RawValue::from(created),
        RawValue::from(vec![0, 0, 0, 0, 0, 0, 1, 0]),
        RawValue::from(vec![
            0x55, 0x0e, 0x84, 0x00, 0xe2, 0x9b, 0x41, 0xd4, 0xa7, 0x16, 0x44, 0x66, 0x55, 0x44,
            0x00, 0x00,
        ]),
        RawValue::from("12.50"),
    ]
}

#[test]
fn test_export_cell_text() {
    let temp = NamedTempFile::new().unwrap();
    let source = MemorySource::with_rows(log_columns(), vec![log_row(1)]).unwrap();

    let summary = Exporter::new(ExportConfig::new(temp.path()))
        .export(source)
        .unwrap();
    assert_eq!(summary.rows, 1);

    let xml = sheet_xml(temp.path());
    assert!(xml.contains(r#"<c r="A1" t="inlineStr"><is><t>1</t></is></c>"#));
    assert!(xml.contains("<t>AB</t>"));
    assert!(xml.contains(r#"<t xml:space="preserve">  x &lt; y &amp; z  </t>"#));
    assert!(xml.contains("<t>2019-03-12 13:30:22</t>"));
    assert!(xml.contains("<t>256</t>"));
    assert!(xml.contains("<t>550e8400-e29b-41d4-a716-446655440000</t>"));
    assert!(xml.contains("<t>12.50</t>"));
}

#[test]
fn test_export_nulls_and_zero_timestamps() {
    let temp = NamedTempFile::new().unwrap();
    let zero = NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let source = MemorySource::with_rows(
        vec![
            ColumnType::new("id", "INT"),
            ColumnType::new("note", "NVARCHAR").with_nullable(true),
            ColumnType::new("created_at", "TIMESTAMP"),
        ],
        vec![vec![RawValue::from("7"), RawValue::Null, RawValue::from(zero)]],
    )
    .unwrap();

    Exporter::new(ExportConfig::new(temp.path()))
        .export(source)
        .unwrap();

    let xml = sheet_xml(temp.path());
    assert!(xml.contains(r#"<row r="1"><c r="A1" t="inlineStr"><is><t>7</t></is></c></row>"#));
    assert!(!xml.contains(r#"r="B1""#));
    assert!(!xml.contains(r#"r="C1""#));
}

#[test]
fn test_export_null_placeholder() {
    let temp = NamedTempFile::new().unwrap();
    let source = MemorySource::with_rows(
        vec![ColumnType::new("note", "VARCHAR")],
        vec![vec![RawValue::Null]],
    )
    .unwrap();

    let config = ExportConfig::new(temp.path()).with_null_placeholder("NULL");
    Exporter::new(config).export(source).unwrap();

    assert!(sheet_xml(temp.path()).contains("<t>NULL</t>"));
}

#[test]
fn test_export_header_and_row_limit() {
    let temp = NamedTempFile::new().unwrap();
    let source = MemorySource::with_rows(log_columns(), (1..=10).map(log_row)).unwrap();

    let config = ExportConfig::new(temp.path())
        .with_header(true)
        .with_max_rows(4)
        .with_sheet_name("logs");
    let summary = Exporter::new(config).export(source).unwrap();
    assert_eq!(summary.rows, 4);

    let entries = read_zip(temp.path());
    assert!(entries["xl/workbook.xml"].contains(r#"<sheet name="logs""#));

    let xml = &entries["xl/worksheets/sheet1.xml"];
    assert!(xml.contains(r#"<row r="1"><c r="A1" t="inlineStr"><is><t>id</t></is></c>"#));
    assert!(xml.contains(r#"<row r="5">"#));
    assert!(!xml.contains(r#"<row r="6">"#));
}

#[test]
fn test_export_aborts_on_short_binary() {
    let temp = NamedTempFile::new().unwrap();
    let source = MemorySource::with_rows(
        vec![ColumnType::new("flags", "BINARY")],
        vec![vec![RawValue::from(vec![1u8, 2, 3])]],
    )
    .unwrap();

    let err = Exporter::new(ExportConfig::new(temp.path()))
        .export(source)
        .unwrap_err();
    match err {
        ExportError::ValueMismatch { column, .. } => assert_eq!(column, "flags"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_export_then_gzip() {
    let dir = tempdir().unwrap();
    let xlsx = dir.path().join("logs.xlsx");
    let gz = dir.path().join("logs.xlsx.gz");

    let source = MemorySource::with_rows(log_columns(), (1..=100).map(log_row)).unwrap();
    Exporter::new(ExportConfig::new(&xlsx)).export(source).unwrap();

    let copied = gzip_file(&xlsx, &gz).unwrap();
    assert_eq!(copied, std::fs::metadata(&xlsx).unwrap().len());

    let mut restored = Vec::new();
    GzDecoder::new(std::fs::File::open(&gz).unwrap())
        .read_to_end(&mut restored)
        .unwrap();
    assert_eq!(restored, std::fs::read(&xlsx).unwrap());
}

struct RecordingExecutor {
    statements: Mutex<Vec<(String, usize)>>,
}

impl SqlExecutor for RecordingExecutor {
    fn execute(&self, sql: &str, params: &[SqlParam]) -> sqlsheet::Result<u64> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.len()));
        Ok((params.len() / SampleRecord::COLUMNS.len()) as u64)
    }
}

#[test]
fn test_seeder_statements() {
    let executor = RecordingExecutor {
        statements: Mutex::new(Vec::new()),
    };
    let config = SeedConfig::default()
        .with_batches(12, 2)
        .with_workers(3)
        .with_placeholder(Placeholder::Dollar);

    let summary = Seeder::run(&executor, &config).unwrap();
    assert_eq!(summary.statements, 12);
    assert_eq!(summary.rows, 24);

    let statements = executor.statements.into_inner().unwrap();
    assert_eq!(statements.len(), 12);
    for (sql, params) in &statements {
        assert!(sql.starts_with("INSERT INTO logs(appid,author,"));
        assert!(sql.ends_with("$17,$18)"));
        assert_eq!(*params, 18);
    }
}

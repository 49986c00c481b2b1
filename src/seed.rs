//! Synthetic data seeding for load testing exports
//!
//! The seeder repeats one sample record into multi-row `INSERT` statements
//! and runs them from a pool of worker threads.

use crate::config::SeedConfig;
use crate::error::{ExportError, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::time::{Duration, Instant};

/// Bind parameter syntax of the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (MySQL, SQLite)
    Question,
    /// `$1`, `$2`, ... (PostgreSQL)
    Dollar,
}

/// A bind parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        SqlParam::Text(s.to_string())
    }
}

impl From<i64> for SqlParam {
    fn from(i: i64) -> Self {
        SqlParam::Int(i)
    }
}

/// The row inserted by the seeder: one access-log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub appid: String,
    pub author: String,
    pub build_version: String,
    pub copyright: String,
    pub created_at: String,
    pub page_url: String,
    pub product_name: String,
    pub proto: String,
    pub user_id: i64,
}

impl SampleRecord {
    /// Column names, in the order of [`SampleRecord::params`]
    pub const COLUMNS: [&'static str; 9] = [
        "appid",
        "author",
        "build_version",
        "copyright",
        "created_at",
        "page_url",
        "product_name",
        "proto",
        "user_id",
    ];

    pub fn params(&self) -> Vec<SqlParam> {
        vec![
            self.appid.as_str().into(),
            self.author.as_str().into(),
            self.build_version.as_str().into(),
            self.copyright.as_str().into(),
            self.created_at.as_str().into(),
            self.page_url.as_str().into(),
            self.product_name.as_str().into(),
            self.proto.as_str().into(),
            self.user_id.into(),
        ]
    }
}

impl Default for SampleRecord {
    fn default() -> Self {
        SampleRecord {
            appid: "xlstest_1".to_string(),
            author: "steeven".to_string(),
            build_version: "1.0.1".to_string(),
            copyright: "xlstest".to_string(),
            created_at: "2019-03-12 13:30:22".to_string(),
            page_url: "http://bing.com?id=aaf_afsd_adsf".to_string(),
            product_name: "I'd check to see what that library you're using requires".to_string(),
            proto: "xls".to_string(),
            user_id: 1,
        }
    }
}

/// Build `INSERT INTO table(c1,..) VALUES (..),(..)` with `rows` value groups
///
/// # Examples
///
/// ```
/// use sqlsheet::seed::{build_insert, Placeholder};
///
/// let sql = build_insert("logs", &["a", "b"], 2, Placeholder::Dollar);
/// assert_eq!(sql, "INSERT INTO logs(a,b) VALUES ($1,$2),($3,$4)");
/// ```
pub fn build_insert(table: &str, columns: &[&str], rows: usize, placeholder: Placeholder) -> String {
    let mut sql = format!("INSERT INTO {}({}) VALUES ", table, columns.join(","));
    let mut n = 0usize;
    for row in 0..rows {
        if row > 0 {
            sql.push(',');
        }
        sql.push('(');
        for col in 0..columns.len() {
            if col > 0 {
                sql.push(',');
            }
            n += 1;
            match placeholder {
                Placeholder::Question => sql.push('?'),
                Placeholder::Dollar => {
                    sql.push('$');
                    sql.push_str(itoa::Buffer::new().format(n));
                }
            }
        }
        sql.push(')');
    }
    sql
}

/// Executes statements against the target database
///
/// Implementations are shared between the seeding pool's worker threads;
/// [`rayon::current_thread_index`] tells them which worker is calling.
pub trait SqlExecutor: Sync {
    /// Run `sql` with `params`, returning the affected row count
    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;
}

/// Outcome of a seeding run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub statements: usize,
    pub rows: u64,
    pub elapsed: Duration,
}

/// Runs a seeding workload
pub struct Seeder;

impl Seeder {
    /// Run `config.batches` INSERT statements across `config.workers` threads
    ///
    /// Stops at the first failure and returns it.
    pub fn run<E: SqlExecutor + ?Sized>(executor: &E, config: &SeedConfig) -> Result<SeedSummary> {
        config.validate()?;

        let sql = build_insert(
            &config.table,
            &SampleRecord::COLUMNS,
            config.rows_per_batch,
            config.placeholder,
        );
        let record = config.record.params();
        let params: Vec<SqlParam> = (0..config.rows_per_batch)
            .flat_map(|_| record.iter().cloned())
            .collect();

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .map_err(|e| ExportError::Config(format!("cannot start seeding workers: {}", e)))?;

        log::info!(
            "seeding {} statements of {} rows into {} with {} workers",
            config.batches,
            config.rows_per_batch,
            config.table,
            config.workers
        );
        let start = Instant::now();

        // try_reduce stops handing out batches once any of them fails
        let rows = pool
            .install(|| {
                (0..config.batches)
                    .into_par_iter()
                    .map(|_| executor.execute(&sql, &params))
                    .try_reduce(|| 0, |a, b| Ok(a + b))
            })
            .inspect_err(|e| log::warn!("seeding aborted: {}", e))?;

        let summary = SeedSummary {
            statements: config.batches,
            rows,
            elapsed: start.elapsed(),
        };
        log::info!(
            "seeded {} rows in {:.2}s",
            summary.rows,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }
}

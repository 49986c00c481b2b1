//! PostgreSQL collaborators: a cursor-backed row source and a seeding
//! executor
//!
//! Results are fetched in batches with `FETCH n`, so only one batch is held
//! in memory at a time.

use super::RowSource;
use crate::error::{ExportError, Result};
use crate::seed::{SqlExecutor, SqlParam};
use crate::types::{ColumnType, RawValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::types::{FromSql, ToSql, Type};
use postgres::{Client, NoTls, Row, Transaction};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Duration;

const CURSOR_NAME: &str = "sqlsheet_export_cursor";

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Cursor settings
#[derive(Debug, Clone)]
pub struct PgSourceOptions {
    /// Rows per `FETCH`
    pub batch_size: u32,
    /// Applied with `SET LOCAL statement_timeout`
    pub statement_timeout: Option<Duration>,
}

impl Default for PgSourceOptions {
    fn default() -> Self {
        PgSourceOptions {
            batch_size: 500,
            statement_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Row source reading a query through a server-side cursor
pub struct PgSource<'a> {
    transaction: Transaction<'a>,
    columns: Vec<ColumnType>,
    pg_types: Vec<Type>,
    buffer: VecDeque<Row>,
    batch_size: u32,
    exhausted: bool,
}

impl<'a> PgSource<'a> {
    /// Open a cursor for `query` inside a new transaction on `client`
    pub fn open(client: &'a mut Client, query: &str, options: &PgSourceOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(ExportError::Config("batch size must be positive".to_string()));
        }

        let mut transaction = client.transaction()?;
        if let Some(timeout) = options.statement_timeout {
            transaction.batch_execute(&format!(
                "SET LOCAL statement_timeout = {}",
                timeout.as_millis()
            ))?;
        }

        let statement = transaction.prepare(query)?;
        let mut columns = Vec::with_capacity(statement.columns().len());
        let mut pg_types = Vec::with_capacity(statement.columns().len());
        for column in statement.columns() {
            let type_name = declared_type_name(column.type_()).ok_or_else(|| {
                ExportError::Config(format!(
                    "column '{}' has unsupported type {}; cast it to text in the query",
                    column.name(),
                    column.type_()
                ))
            })?;
            columns.push(ColumnType::new(column.name(), type_name));
            pg_types.push(column.type_().clone());
        }

        transaction.execute(
            &format!("DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR {query}"),
            &[],
        )?;
        log::debug!("declared cursor with {} columns", columns.len());

        Ok(PgSource {
            transaction,
            columns,
            pg_types,
            buffer: VecDeque::new(),
            batch_size: options.batch_size,
            exhausted: false,
        })
    }

    /// Close the cursor and end the transaction
    pub fn close(mut self) -> Result<()> {
        self.transaction
            .batch_execute(&format!("CLOSE {CURSOR_NAME}"))?;
        self.transaction.commit()?;
        Ok(())
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let rows = self.transaction.query(
            &format!("FETCH {} FROM {CURSOR_NAME}", self.batch_size),
            &[],
        )?;
        if rows.len() < self.batch_size as usize {
            self.exhausted = true;
        }
        self.buffer.extend(rows);
        Ok(())
    }

    fn convert(&self, row: &Row) -> Result<Vec<RawValue>> {
        self.pg_types
            .iter()
            .enumerate()
            .map(|(idx, ty)| raw_value(row, idx, ty))
            .collect()
    }
}

impl RowSource for PgSource<'_> {
    fn columns(&self) -> &[ColumnType] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<RawValue>>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch()?;
        }
        match self.buffer.pop_front() {
            Some(row) => self.convert(&row).map(Some),
            None => Ok(None),
        }
    }
}

/// Seeding executor holding one connection per worker
///
/// Each seeding worker uses the connection at its pool thread index, so
/// `SeedConfig::workers` connections run statements side by side. Calls
/// from outside a pool share the first connection.
pub struct PgExecutor {
    clients: Vec<Mutex<Client>>,
}

impl PgExecutor {
    /// Open `connections` connections to `params`
    pub fn connect(params: &str, connections: usize) -> Result<Self> {
        let clients = (0..connections)
            .map(|_| Client::connect(params, NoTls))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        log::debug!("opened {} seeding connections", clients.len());
        Self::from_clients(clients)
    }

    /// Use already-open connections
    pub fn from_clients(clients: Vec<Client>) -> Result<Self> {
        if clients.is_empty() {
            return Err(ExportError::Config(
                "seeding needs at least one connection".to_string(),
            ));
        }
        Ok(PgExecutor {
            clients: clients.into_iter().map(Mutex::new).collect(),
        })
    }

    /// Number of open connections
    pub fn connections(&self) -> usize {
        self.clients.len()
    }

    /// Give back the connections, in slot order
    pub fn into_clients(self) -> Vec<Client> {
        self.clients
            .into_iter()
            .map(|client| match client.into_inner() {
                Ok(client) => client,
                Err(poisoned) => poisoned.into_inner(),
            })
            .collect()
    }
}

/// Connection used by the worker at `thread_index`
fn connection_slot(thread_index: Option<usize>, connections: usize) -> usize {
    thread_index.unwrap_or(0) % connections
}

impl SqlExecutor for PgExecutor {
    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let slot = connection_slot(rayon::current_thread_index(), self.clients.len());
        let mut client = self.clients[slot]
            .lock()
            .map_err(|_| ExportError::Database("client mutex poisoned".to_string()))?;

        // Let the server infer parameter types, then bind to match them.
        let statement = client.prepare(sql)?;
        let bound = statement
            .params()
            .iter()
            .zip(params)
            .map(|(ty, param)| bind_param(ty, param))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|b| &**b).collect();

        Ok(client.execute(&statement, &refs)?)
    }
}

fn bind_param(ty: &Type, param: &SqlParam) -> Result<Box<dyn ToSql + Sync>> {
    let bad = |what: &str| ExportError::Config(format!("cannot bind {:?} as {}: {}", param, ty, what));

    let bound: Box<dyn ToSql + Sync> = match (param, ty) {
        (SqlParam::Int(i), &Type::INT2) => {
            Box::new(i16::try_from(*i).map_err(|_| bad("out of range"))?)
        }
        (SqlParam::Int(i), &Type::INT4) => {
            Box::new(i32::try_from(*i).map_err(|_| bad("out of range"))?)
        }
        (SqlParam::Int(i), &Type::INT8) => Box::new(*i),
        (SqlParam::Int(i), _) => Box::new(i.to_string()),
        (SqlParam::Text(s), &Type::INT2) => Box::new(s.parse::<i16>().map_err(|_| bad("not a number"))?),
        (SqlParam::Text(s), &Type::INT4) => Box::new(s.parse::<i32>().map_err(|_| bad("not a number"))?),
        (SqlParam::Text(s), &Type::INT8) => Box::new(s.parse::<i64>().map_err(|_| bad("not a number"))?),
        (SqlParam::Text(s), &Type::TIMESTAMP) => Box::new(parse_timestamp(s).ok_or_else(|| bad("not a timestamp"))?),
        (SqlParam::Text(s), &Type::TIMESTAMPTZ) => Box::new(
            parse_timestamp(s)
                .ok_or_else(|| bad("not a timestamp"))?
                .and_utc(),
        ),
        (SqlParam::Text(s), &Type::DATE) => Box::new(
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| bad("not a date"))?,
        ),
        (SqlParam::Text(s), _) => Box::new(s.clone()),
    };
    Ok(bound)
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()
}

/// Declared type name the formatter should see for a PostgreSQL type
///
/// `TIMESTAMPTZ` is reported as `TIMESTAMP` and its values are converted to
/// UTC, so cells show UTC wall-clock time whatever the session time zone.
fn declared_type_name(ty: &Type) -> Option<&'static str> {
    let name = match *ty {
        Type::BPCHAR => "CHAR",
        Type::VARCHAR | Type::TEXT | Type::NAME => "VARCHAR",
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => "INT",
        Type::BOOL => "BOOLEAN",
        Type::FLOAT4 => "FLOAT",
        Type::FLOAT8 => "DOUBLE",
        Type::NUMERIC => "DECIMAL",
        Type::MONEY => "MONEY",
        Type::DATE => "DATE",
        Type::TIMESTAMP | Type::TIMESTAMPTZ => "TIMESTAMP",
        Type::UUID => "UNIQUEIDENTIFIER",
        Type::BYTEA => "VARBINARY",
        _ if <String as FromSql<'_>>::accepts(ty) => "VARCHAR",
        _ => return None,
    };
    Some(name)
}

fn raw_value(row: &Row, idx: usize, ty: &Type) -> Result<RawValue> {
    let value: RawValue = match *ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| v.to_string()).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| v.to_string()).into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(|v| v.to_string()).into(),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(|v| v.to_string()).into(),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(|v| v.to_string()).into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| v.to_string()).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(|v| v.to_string()).into(),
        Type::NUMERIC => row.try_get::<_, Option<PgNumeric>>(idx)?.map(|n| n.0).into(),
        Type::MONEY => row.try_get::<_, Option<PgMoney>>(idx)?.map(|m| m.0).into(),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| d.and_time(NaiveTime::MIN))
            .into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.into(),
        // UTC, not the session time zone
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|d| d.naive_utc())
            .into(),
        Type::UUID | Type::BYTEA => row.try_get::<_, Option<RawBytes>>(idx)?.map(|b| b.0).into(),
        _ => row.try_get::<_, Option<String>>(idx)?.into(),
    };
    Ok(value)
}

/// The wire payload as-is, for types whose binary form is already what the
/// formatter expects (16-byte UUIDs, bytea)
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::UUID | Type::BYTEA)
    }
}

/// NUMERIC decoded to its exact decimal text
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        numeric_to_string(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// MONEY as decimal text; the wire value is an i64 count of cents
struct PgMoney(String);

impl<'a> FromSql<'a> for PgMoney {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let cents: [u8; 8] = raw.try_into().map_err(|_| "malformed MONEY value")?;
        Ok(PgMoney(money_to_string(i64::from_be_bytes(cents))))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::MONEY
    }
}

fn money_to_string(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render the binary NUMERIC format: a header of digit count, weight, sign
/// and display scale, followed by base-10000 digits.
fn numeric_to_string(raw: &[u8]) -> std::result::Result<String, BoxError> {
    let word = |i: usize| -> std::result::Result<u16, BoxError> {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i32;
    let sign = word(2)?;
    let dscale = word(3)? as usize;
    if raw.len() != 8 + ndigits * 2 {
        return Err("malformed NUMERIC value".into());
    }

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid NUMERIC sign {other:#06x}").into()),
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let digit = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG && ndigits > 0 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                write!(out, "{}", digit(i))?;
            } else {
                write!(out, "{:04}", digit(i))?;
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", digit(i))?;
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_numeric_decoding() {
        let cases: &[(Vec<u8>, &str)] = &[
            (encode(0, NUMERIC_POS, 2, &[19, 9900]), "19.99"),
            (encode(-1, NUMERIC_POS, 3, &[10]), "0.001"),
            (encode(1, NUMERIC_POS, 1, &[1, 2345, 6000]), "12345.6"),
            (encode(1, NUMERIC_POS, 0, &[1]), "10000"),
            (encode(0, NUMERIC_NEG, 2, &[5, 2500]), "-5.25"),
            (encode(0, NUMERIC_POS, 0, &[]), "0"),
            (encode(0, NUMERIC_POS, 2, &[]), "0.00"),
            (encode(0, NUMERIC_NAN, 0, &[]), "NaN"),
        ];
        for (raw, expected) in cases {
            assert_eq!(numeric_to_string(raw).unwrap(), *expected);
        }
    }

    #[test]
    fn test_money_decoding() {
        assert_eq!(money_to_string(1234), "12.34");
        assert_eq!(money_to_string(-5), "-0.05");
        assert_eq!(money_to_string(0), "0.00");
        assert_eq!(money_to_string(i64::MIN), "-92233720368547758.08");
    }

    #[test]
    fn test_numeric_rejects_malformed() {
        assert!(numeric_to_string(&[0, 1]).is_err());
        let mut raw = encode(0, NUMERIC_POS, 0, &[1]);
        raw.pop();
        assert!(numeric_to_string(&raw).is_err());
        assert!(numeric_to_string(&encode(0, 0x1234, 0, &[])).is_err());
    }

    fn bound(ty: Type, param: SqlParam) -> Result<String> {
        bind_param(&ty, &param).map(|value| format!("{:?}", value))
    }

    #[test]
    fn test_bind_integers() {
        assert_eq!(bound(Type::INT2, SqlParam::Int(7)).unwrap(), "7");
        assert_eq!(bound(Type::INT4, SqlParam::Int(-40_000)).unwrap(), "-40000");
        assert_eq!(bound(Type::INT8, SqlParam::Int(i64::MAX)).unwrap(), i64::MAX.to_string());
        assert_eq!(bound(Type::TEXT, SqlParam::Int(1)).unwrap(), "\"1\"");

        assert_eq!(bound(Type::INT2, SqlParam::from("12")).unwrap(), "12");
        assert_eq!(bound(Type::INT4, SqlParam::from("1")).unwrap(), "1");
        assert_eq!(bound(Type::INT8, SqlParam::from("-9")).unwrap(), "-9");
    }

    #[test]
    fn test_bind_integer_errors() {
        let err = bound(Type::INT2, SqlParam::Int(40_000)).unwrap_err();
        assert!(matches!(err, ExportError::Config(_)));
        assert!(err.to_string().contains("out of range"));

        assert!(bound(Type::INT4, SqlParam::Int(i64::from(i32::MAX) + 1)).is_err());
        assert!(bound(Type::INT4, SqlParam::from("twelve")).is_err());
        assert!(bound(Type::INT2, SqlParam::from("70000")).is_err());
    }

    #[test]
    fn test_bind_temporal_text() {
        assert_eq!(
            bound(Type::TIMESTAMP, SqlParam::from("2019-03-12 13:30:22")).unwrap(),
            "2019-03-12T13:30:22"
        );
        assert_eq!(
            bound(Type::TIMESTAMPTZ, SqlParam::from("2019-03-12 13:30:22")).unwrap(),
            "2019-03-12T13:30:22Z"
        );
        assert_eq!(
            bound(Type::DATE, SqlParam::from("2019-03-12")).unwrap(),
            "2019-03-12"
        );

        assert!(bound(Type::TIMESTAMP, SqlParam::from("2019-03-12")).is_err());
        assert!(bound(Type::DATE, SqlParam::from("12/03/2019")).is_err());
    }

    #[test]
    fn test_bind_text_passthrough() {
        assert_eq!(
            bound(Type::VARCHAR, SqlParam::from("xlstest_1")).unwrap(),
            "\"xlstest_1\""
        );
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2019-03-12 13:30:22").unwrap();
        assert_eq!(ts.to_string(), "2019-03-12 13:30:22");
        assert!(parse_timestamp("2019-03-12T13:30:22").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_connection_slots() {
        assert_eq!(connection_slot(None, 4), 0);
        assert_eq!(connection_slot(Some(2), 4), 2);
        assert_eq!(connection_slot(Some(5), 4), 1);
        assert_eq!(connection_slot(Some(0), 1), 0);
    }

    #[test]
    fn test_executor_needs_a_connection() {
        assert!(matches!(
            PgExecutor::from_clients(Vec::new()),
            Err(ExportError::Config(_))
        ));
    }

    #[test]
    fn test_declared_type_names() {
        assert_eq!(declared_type_name(&Type::BPCHAR), Some("CHAR"));
        assert_eq!(declared_type_name(&Type::UUID), Some("UNIQUEIDENTIFIER"));
        assert_eq!(declared_type_name(&Type::NUMERIC), Some("DECIMAL"));
        assert_eq!(declared_type_name(&Type::TIMESTAMPTZ), Some("TIMESTAMP"));
        assert_eq!(declared_type_name(&Type::MONEY), Some("MONEY"));
        assert_eq!(declared_type_name(&Type::POINT), None);
    }
}

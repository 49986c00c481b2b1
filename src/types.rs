//! Type definitions for query results

use chrono::NaiveDateTime;
use std::fmt;

/// Broad classification of a declared database type name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// CHAR, NCHAR, NVARCHAR, NVARCHAR2
    Character,
    /// DATE, DATETIME, TIMESTAMP
    Temporal,
    /// BINARY (fixed-length, read as a big-endian integer)
    FixedBinary,
    /// MONEY, DECIMAL, FLOAT, DOUBLE
    Numeric,
    /// UNIQUEIDENTIFIER
    UniqueIdentifier,
    /// Anything else
    Other,
}

impl TypeClass {
    /// Classify a declared type name (ASCII case-insensitive)
    pub fn of(type_name: &str) -> Self {
        const CHARACTER: [&str; 4] = ["CHAR", "NCHAR", "NVARCHAR", "NVARCHAR2"];
        const TEMPORAL: [&str; 3] = ["DATE", "DATETIME", "TIMESTAMP"];
        const NUMERIC: [&str; 4] = ["MONEY", "DECIMAL", "FLOAT", "DOUBLE"];

        let name = type_name.trim();
        let is = |names: &[&str]| names.iter().any(|n| n.eq_ignore_ascii_case(name));

        if is(&CHARACTER) {
            TypeClass::Character
        } else if is(&TEMPORAL) {
            TypeClass::Temporal
        } else if name.eq_ignore_ascii_case("BINARY") {
            TypeClass::FixedBinary
        } else if is(&NUMERIC) {
            TypeClass::Numeric
        } else if name.eq_ignore_ascii_case("UNIQUEIDENTIFIER") {
            TypeClass::UniqueIdentifier
        } else {
            TypeClass::Other
        }
    }
}

/// Describes one column of a query result
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnType {
    name: String,
    database_type_name: String,
    nullable: Option<bool>,
}

impl ColumnType {
    /// Create a column descriptor with unknown nullability
    pub fn new(name: impl Into<String>, database_type_name: impl Into<String>) -> Self {
        ColumnType {
            name: name.into(),
            database_type_name: database_type_name.into(),
            nullable: None,
        }
    }

    /// Record whether the column accepts NULL
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    /// Column name as reported by the driver
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared database type name, e.g. `NVARCHAR` or `DATETIME`
    pub fn database_type_name(&self) -> &str {
        &self.database_type_name
    }

    /// Nullability, if the driver reports it
    pub fn nullable(&self) -> Option<bool> {
        self.nullable
    }

    /// Class of the declared type
    pub fn class(&self) -> TypeClass {
        TypeClass::of(&self.database_type_name)
    }
}

/// A single value as decoded by the database client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// SQL NULL
    Null,
    /// Raw payload (text, numeric text, binary)
    Bytes(Vec<u8>),
    /// Decoded date/time value
    Timestamp(NaiveDateTime),
}

impl RawValue {
    /// Check if value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Try to get the byte payload
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RawValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get the timestamp payload
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RawValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("NULL"),
            RawValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            RawValue::Timestamp(ts) => write!(f, "{}", ts),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(b: Vec<u8>) -> Self {
        RawValue::Bytes(b)
    }
}

impl From<&[u8]> for RawValue {
    fn from(b: &[u8]) -> Self {
        RawValue::Bytes(b.to_vec())
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(ts: NaiveDateTime) -> Self {
        RawValue::Timestamp(ts)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(RawValue::Null, Into::into)
    }
}

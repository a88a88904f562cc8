use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::error::LakesqlError;
use crate::escape::Dialect;
use crate::row::{Row, Value};

/// Semantic column types shared by both dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    Text,
    Double,
    Boolean,
    Date,
    Timestamp,
    Decimal,
}

impl SqlType {
    /// The dialect's native column type for a CREATE TABLE definition.
    pub fn native_type(self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (SqlType::BigInt, _) => "BIGINT",
            (SqlType::Text, Dialect::Warehouse) => "STRING",
            (SqlType::Text, Dialect::Postgres) => "TEXT",
            (SqlType::Double, Dialect::Warehouse) => "DOUBLE",
            (SqlType::Double, Dialect::Postgres) => "DOUBLE PRECISION",
            (SqlType::Boolean, _) => "BOOLEAN",
            (SqlType::Date, _) => "DATE",
            (SqlType::Timestamp, Dialect::Warehouse) => "TIMESTAMP",
            (SqlType::Timestamp, Dialect::Postgres) => "TIMESTAMP WITH TIME ZONE",
            (SqlType::Decimal, Dialect::Warehouse) => "DECIMAL(38,18)",
            (SqlType::Decimal, Dialect::Postgres) => "NUMERIC(38,18)",
        }
    }
}

/// One column of a typed record description.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: SqlType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A record type that maps to a table schema.
///
/// The typed seam for `save_table`/`create_table`: a record names its
/// columns, renders itself as a value row, and rebuilds from a fetched row.
pub trait TableRecord: Sized {
    fn columns() -> Vec<ColumnSpec>;
    fn to_values(&self) -> Vec<Value>;
    fn from_row(row: &Row) -> Result<Self, LakesqlError>;
}

/// Parser from a backend's string cell to a typed value.
pub type Converter = fn(&str) -> Option<Value>;

/// Look up the converter for a declared column type name.
///
/// Parameterization suffixes are stripped before lookup, so
/// "DECIMAL(10,2)" resolves the DECIMAL converter.
pub fn get_type_converter(sql_type: &str) -> Option<Converter> {
    let base = sql_type
        .split('(')
        .next()
        .unwrap_or(sql_type)
        .trim()
        .to_ascii_uppercase();
    match base.as_str() {
        "DATE" => Some(parse_date),
        "TIMESTAMP" | "TIMESTAMP_NTZ" => Some(parse_timestamp),
        "DECIMAL" => Some(parse_decimal),
        "DOUBLE" | "FLOAT" => Some(parse_float),
        "INT" | "BIGINT" | "SMALLINT" | "TINYINT" => Some(parse_int),
        "BOOLEAN" => Some(parse_bool),
        _ => None,
    }
}

/// Convert one raw cell, degrading to the uninterpreted string when the
/// parse fails. Conversion is best-effort; it never fails a row.
pub fn convert_cell(converter: Option<Converter>, raw: Option<String>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => match converter.and_then(|c| c(&text)) {
            Some(value) => value,
            None => Value::Text(text),
        },
    }
}

/// Convert a whole raw row against its per-column converters.
pub fn convert_cells(raw_row: Vec<Option<String>>, converters: &[Option<Converter>]) -> Vec<Value> {
    raw_row
        .into_iter()
        .enumerate()
        .map(|(i, raw)| convert_cell(converters.get(i).copied().flatten(), raw))
        .collect()
}

fn parse_date(value: &str) -> Option<Value> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(Value::Date)
}

fn parse_timestamp(value: &str) -> Option<Value> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(Value::Timestamp(ts));
    }
    // Timestamps without an offset are treated as UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Value::Timestamp(naive.and_utc().fixed_offset()));
        }
    }
    None
}

fn parse_decimal(value: &str) -> Option<Value> {
    value.parse::<Decimal>().ok().map(Value::Decimal)
}

fn parse_float(value: &str) -> Option<Value> {
    value.parse::<f64>().ok().map(Value::Float)
}

fn parse_int(value: &str) -> Option<Value> {
    value.parse::<i64>().ok().map(Value::Int)
}

fn parse_bool(value: &str) -> Option<Value> {
    Some(Value::Bool(value.eq_ignore_ascii_case("true")))
}

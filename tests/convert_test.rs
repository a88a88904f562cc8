use chrono::{Datelike, NaiveDate, Timelike};
use lakesql::convert::{convert_cell, convert_cells, get_type_converter, SqlType};
use lakesql::escape::Dialect;
use lakesql::row::Value;
use rust_decimal::Decimal;

fn convert(type_name: &str, raw: &str) -> Value {
    convert_cell(get_type_converter(type_name), Some(raw.to_string()))
}

#[test]
fn test_int_types() {
    assert_eq!(convert("INT", "42"), Value::Int(42));
    assert_eq!(convert("BIGINT", "-7"), Value::Int(-7));
    assert_eq!(convert("SMALLINT", "3"), Value::Int(3));
    assert_eq!(convert("TINYINT", "1"), Value::Int(1));
}

#[test]
fn test_float_types() {
    assert_eq!(convert("DOUBLE", "1.5"), Value::Float(1.5));
    assert_eq!(convert("FLOAT", "-0.25"), Value::Float(-0.25));
}

#[test]
fn test_boolean() {
    assert_eq!(convert("BOOLEAN", "true"), Value::Bool(true));
    assert_eq!(convert("BOOLEAN", "TRUE"), Value::Bool(true));
    assert_eq!(convert("BOOLEAN", "false"), Value::Bool(false));
    // Anything that is not "true" reads as false.
    assert_eq!(convert("BOOLEAN", "yes"), Value::Bool(false));
}

#[test]
fn test_decimal_with_parameterization_suffix() {
    // "DECIMAL(10,2)" resolves the DECIMAL converter.
    assert_eq!(
        convert("DECIMAL(10,2)", "123.45"),
        Value::Decimal(Decimal::new(12345, 2))
    );
}

#[test]
fn test_date() {
    match convert("DATE", "2024-01-15") {
        Value::Date(d) => {
            assert_eq!((d.year(), d.month(), d.day()), (2024, 1, 15));
        }
        other => panic!("expected date, got {:?}", other),
    }
}

#[test]
fn test_timestamp_with_zulu_offset() {
    match convert("TIMESTAMP", "2024-01-15T10:30:00Z") {
        Value::Timestamp(ts) => {
            assert_eq!(ts.hour(), 10);
            assert_eq!(ts.offset().local_minus_utc(), 0);
        }
        other => panic!("expected timestamp, got {:?}", other),
    }
}

#[test]
fn test_timestamp_with_explicit_offset() {
    match convert("TIMESTAMP", "2024-01-15T10:30:00+02:00") {
        Value::Timestamp(ts) => {
            assert_eq!(ts.offset().local_minus_utc(), 2 * 3600);
        }
        other => panic!("expected timestamp, got {:?}", other),
    }
}

#[test]
fn test_timestamp_ntz_without_offset() {
    match convert("TIMESTAMP_NTZ", "2024-01-15 10:30:00.500") {
        Value::Timestamp(ts) => {
            assert_eq!(ts.minute(), 30);
            assert_eq!(ts.offset().local_minus_utc(), 0);
        }
        other => panic!("expected timestamp, got {:?}", other),
    }
}

#[test]
fn test_unknown_type_has_no_converter() {
    assert!(get_type_converter("STRING").is_none());
    assert!(get_type_converter("ARRAY<INT>").is_none());
}

#[test]
fn test_conversion_failure_degrades_to_raw_string() {
    assert_eq!(
        convert("INT", "not-a-number"),
        Value::Text("not-a-number".to_string())
    );
    assert_eq!(convert("DATE", "soon"), Value::Text("soon".to_string()));
}

#[test]
fn test_null_cell_stays_null() {
    assert_eq!(convert_cell(get_type_converter("INT"), None), Value::Null);
}

#[test]
fn test_cell_without_converter_stays_text() {
    assert_eq!(
        convert_cell(None, Some("raw".to_string())),
        Value::Text("raw".to_string())
    );
}

#[test]
fn test_convert_cells_mixed_row() {
    let converters = vec![
        get_type_converter("BIGINT"),
        get_type_converter("STRING"),
        get_type_converter("BOOLEAN"),
    ];
    let values = convert_cells(
        vec![
            Some("10".to_string()),
            Some("hello".to_string()),
            None,
        ],
        &converters,
    );
    assert_eq!(
        values,
        vec![
            Value::Int(10),
            Value::Text("hello".to_string()),
            Value::Null,
        ]
    );
}

#[test]
fn test_native_types_warehouse() {
    assert_eq!(SqlType::BigInt.native_type(Dialect::Warehouse), "BIGINT");
    assert_eq!(SqlType::Text.native_type(Dialect::Warehouse), "STRING");
    assert_eq!(SqlType::Double.native_type(Dialect::Warehouse), "DOUBLE");
    assert_eq!(
        SqlType::Timestamp.native_type(Dialect::Warehouse),
        "TIMESTAMP"
    );
    assert_eq!(
        SqlType::Decimal.native_type(Dialect::Warehouse),
        "DECIMAL(38,18)"
    );
}

#[test]
fn test_native_types_postgres() {
    assert_eq!(SqlType::Text.native_type(Dialect::Postgres), "TEXT");
    assert_eq!(
        SqlType::Double.native_type(Dialect::Postgres),
        "DOUBLE PRECISION"
    );
    assert_eq!(
        SqlType::Timestamp.native_type(Dialect::Postgres),
        "TIMESTAMP WITH TIME ZONE"
    );
    assert_eq!(
        SqlType::Decimal.native_type(Dialect::Postgres),
        "NUMERIC(38,18)"
    );
}

#[test]
fn test_date_parse_matches_chrono() {
    let expected = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
    assert_eq!(convert("DATE", "2023-12-31"), Value::Date(expected));
}

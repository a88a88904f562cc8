use chrono::NaiveDate;
use lakesql::convert::{ColumnSpec, SqlType};
use lakesql::escape::{build_insert_sql, escape_value, Dialect};
use lakesql::row::Value;
use rust_decimal::Decimal;

// --- Warehouse dialect (backticks) ---

#[test]
fn test_warehouse_escape_name() {
    assert_eq!(Dialect::Warehouse.escape_name("my_table"), "`my_table`");
}

#[test]
fn test_warehouse_escape_name_doubles_quote_char() {
    let escaped = Dialect::Warehouse.escape_name("table`name");
    assert_eq!(escaped, "`table``name`");
    assert!(escaped.contains("``"));
    assert!(escaped.starts_with('`') && escaped.ends_with('`'));
}

#[test]
fn test_warehouse_escape_name_strips_existing_quotes() {
    assert_eq!(Dialect::Warehouse.escape_name("`already`"), "`already`");
}

#[test]
fn test_warehouse_full_name_three_segments() {
    assert_eq!(
        Dialect::Warehouse.escape_full_name("catalog.schema.table"),
        "`catalog`.`schema`.`table`"
    );
}

#[test]
fn test_warehouse_full_name_excess_dots_stay_in_last_segment() {
    assert_eq!(
        Dialect::Warehouse.escape_full_name("a.b.c.d"),
        "`a`.`b`.`c.d`"
    );
}

// --- Postgres dialect (double quotes) ---

#[test]
fn test_postgres_escape_name() {
    assert_eq!(Dialect::Postgres.escape_name("my_table"), "\"my_table\"");
}

#[test]
fn test_postgres_escape_name_doubles_quote_char() {
    let escaped = Dialect::Postgres.escape_name("table\"name");
    assert_eq!(escaped, "\"table\"\"name\"");
}

#[test]
fn test_postgres_full_name_two_segments() {
    assert_eq!(
        Dialect::Postgres.escape_full_name("schema.table"),
        "\"schema\".\"table\""
    );
}

#[test]
fn test_postgres_full_name_excess_dots_stay_in_last_segment() {
    assert_eq!(
        Dialect::Postgres.escape_full_name("a.b.c"),
        "\"a\".\"b.c\""
    );
}

// --- Literal values ---

#[test]
fn test_escape_value_null() {
    assert_eq!(escape_value(&Value::Null), "NULL");
}

#[test]
fn test_escape_value_bool() {
    assert_eq!(escape_value(&Value::Bool(true)), "TRUE");
    assert_eq!(escape_value(&Value::Bool(false)), "FALSE");
}

#[test]
fn test_escape_value_numbers() {
    assert_eq!(escape_value(&Value::Int(123)), "123");
    assert_eq!(escape_value(&Value::Float(1.5)), "1.5");
}

#[test]
fn test_escape_value_text_doubles_single_quotes() {
    assert_eq!(
        escape_value(&Value::Text("it's a test".to_string())),
        "'it''s a test'"
    );
}

#[test]
fn test_escape_value_decimal_and_date_are_quoted() {
    assert_eq!(
        escape_value(&Value::Decimal(Decimal::new(12345, 2))),
        "'123.45'"
    );
    let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    assert_eq!(escape_value(&Value::Date(date)), "'2024-01-15'");
}

// --- INSERT builder ---

#[test]
fn test_build_insert_sql_warehouse() {
    let columns = vec![
        ColumnSpec::new("id", SqlType::BigInt),
        ColumnSpec::new("name", SqlType::Text),
    ];
    let rows = vec![
        vec![Value::Int(1), Value::Text("a".to_string())],
        vec![Value::Int(2), Value::Null],
    ];
    let sql = build_insert_sql(Dialect::Warehouse, "cat.sch.t", &columns, &rows);
    assert_eq!(
        sql,
        "INSERT INTO `cat`.`sch`.`t` (`id`, `name`) VALUES (1, 'a'), (2, NULL)"
    );
}

#[test]
fn test_build_insert_sql_postgres() {
    let columns = vec![ColumnSpec::new("id", SqlType::BigInt)];
    let rows = vec![vec![Value::Int(9)]];
    let sql = build_insert_sql(Dialect::Postgres, "sch.t", &columns, &rows);
    assert_eq!(sql, "INSERT INTO \"sch\".\"t\" (\"id\") VALUES (9)");
}

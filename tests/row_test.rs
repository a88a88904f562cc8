use std::sync::Arc;

use lakesql::row::{Row, RowSchema, Value};

fn user_schema() -> Arc<RowSchema> {
    Arc::new(RowSchema::new(vec![
        "id".to_string(),
        "name".to_string(),
        "active".to_string(),
    ]))
}

fn sample_row() -> Row {
    Row::new(
        user_schema(),
        vec![
            Value::Int(1),
            Value::Text("test".to_string()),
            Value::Bool(true),
        ],
    )
}

#[test]
fn test_positional_access() {
    let row = sample_row();
    assert_eq!(row.get(0), Some(&Value::Int(1)));
    assert_eq!(row.get(1), Some(&Value::Text("test".to_string())));
    assert_eq!(row.get(3), None);
}

#[test]
fn test_named_access() {
    let row = sample_row();
    assert_eq!(row.column("id"), Some(&Value::Int(1)));
    assert_eq!(row.column("active"), Some(&Value::Bool(true)));
}

#[test]
fn test_missing_column_is_none() {
    let row = sample_row();
    assert_eq!(row.column("missing"), None);
}

#[test]
fn test_as_map() {
    let row = sample_row();
    let map = row.as_map();
    assert_eq!(map.len(), 3);
    assert_eq!(map["name"], &Value::Text("test".to_string()));
    assert_eq!(map["id"], &Value::Int(1));
}

#[test]
fn test_schema_shared_across_rows() {
    let schema = user_schema();
    let a = Row::new(
        schema.clone(),
        vec![Value::Int(1), Value::Null, Value::Bool(false)],
    );
    let b = Row::new(
        schema.clone(),
        vec![Value::Int(2), Value::Null, Value::Bool(true)],
    );
    assert!(Arc::ptr_eq(a.schema(), b.schema()));
    assert_eq!(a.column_names(), b.column_names());
}

#[test]
fn test_column_order_matches_values() {
    let row = sample_row();
    let names = row.column_names();
    assert_eq!(names, &["id", "name", "active"]);
    assert_eq!(row.len(), 3);
}

#[test]
fn test_null_cells() {
    let schema = Arc::new(RowSchema::new(vec!["v".to_string()]));
    let row = Row::new(schema, vec![Value::Null]);
    assert!(row.get(0).is_some_and(Value::is_null));
}

#[test]
fn test_value_accessors() {
    assert_eq!(Value::Int(7).as_i64(), Some(7));
    assert_eq!(Value::Text("x".to_string()).as_str(), Some("x"));
    assert_eq!(Value::Bool(true).as_bool(), Some(true));
    assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
    assert_eq!(Value::Null.as_i64(), None);
}

#[test]
fn test_into_values() {
    let row = sample_row();
    let values = row.into_values();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0], Value::Int(1));
}

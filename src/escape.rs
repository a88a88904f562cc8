use crate::convert::ColumnSpec;
use crate::row::Value;

/// Which SQL dialect to quote identifiers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Databricks SQL warehouse: backtick-quoted identifiers, up to
    /// catalog.schema.table qualification.
    Warehouse,
    /// PostgreSQL: double-quote-quoted identifiers, up to schema.table
    /// qualification.
    Postgres,
}

impl Dialect {
    fn quote(self) -> char {
        match self {
            Dialect::Warehouse => '`',
            Dialect::Postgres => '"',
        }
    }

    /// Maximum number of dot-separated segments in a qualified name.
    fn max_name_parts(self) -> usize {
        match self {
            Dialect::Warehouse => 3,
            Dialect::Postgres => 2,
        }
    }

    /// Escape a single identifier: strip any existing quotes, double the
    /// ones inside, wrap in the dialect's quote character.
    pub fn escape_name(self, name: &str) -> String {
        let quote = self.quote();
        let stripped = name.trim_matches(quote);
        let doubled = stripped.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{doubled}{quote}")
    }

    /// Escape a qualified name segment by segment.
    ///
    /// The split is capped at the dialect's segment count; any further dots
    /// stay inside the last segment and get escaped there.
    pub fn escape_full_name(self, full_name: &str) -> String {
        full_name
            .splitn(self.max_name_parts(), '.')
            .map(|part| self.escape_name(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Render a value as an inline SQL literal.
///
/// Strings are single-quoted with internal quotes doubled; dates and
/// timestamps render as quoted ISO strings that both dialects coerce.
pub fn escape_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(s) => quote_literal(s),
        Value::Decimal(v) => quote_literal(&v.to_string()),
        Value::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
        Value::Timestamp(ts) => quote_literal(&ts.to_rfc3339()),
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Build one multi-row INSERT with inlined, escaped literal values.
pub fn build_insert_sql(
    dialect: Dialect,
    full_name: &str,
    columns: &[ColumnSpec],
    rows: &[Vec<Value>],
) -> String {
    let table = dialect.escape_full_name(full_name);
    let cols = columns
        .iter()
        .map(|c| dialect.escape_name(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let values = rows
        .iter()
        .map(|row| {
            let cells = row.iter().map(escape_value).collect::<Vec<_>>().join(", ");
            format!("({cells})")
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({cols}) VALUES {values}")
}

use std::sync::Arc;

use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use fallible_iterator::FallibleIterator;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::Decimal;
use tokio_postgres::types::{IsNull, ToSql, Type};
use tracing::{debug, warn};

use crate::backend::{RowIter, SaveMode, SqlBackend};
use crate::config::PostgresConfig;
use crate::convert::ColumnSpec;
use crate::error::LakesqlError;
use crate::escape::Dialect;
use crate::row::{Row, RowSchema, Value};
use crate::token::OAuthTokenManager;

/// Whether an error message reads like a credential failure. The drivers
/// report no structured code for expired tokens, so this substring
/// heuristic drives the reconnect-and-retry protocol.
pub fn is_auth_error_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("authentication") || lower.contains("password")
}

pub(crate) fn connect_error(e: tokio_postgres::Error) -> LakesqlError {
    let message = e.to_string();
    if is_auth_error_message(&message) {
        LakesqlError::Auth { message }
    } else {
        LakesqlError::Connection {
            message: format!("connection failed: {}", message),
        }
    }
}

pub(crate) fn query_error(e: tokio_postgres::Error) -> LakesqlError {
    let message = e.to_string();
    if is_auth_error_message(&message) {
        LakesqlError::Auth { message }
    } else {
        LakesqlError::Query { message }
    }
}

pub(crate) fn tls_connector() -> Result<MakeTlsConnector, LakesqlError> {
    let connector = native_tls::TlsConnector::new().map_err(|e| LakesqlError::Connection {
        message: format!("failed to build TLS connector: {}", e),
    })?;
    Ok(MakeTlsConnector::new(connector))
}

pub(crate) fn schema_from_columns(columns: &[tokio_postgres::Column]) -> Arc<RowSchema> {
    Arc::new(RowSchema::new(
        columns.iter().map(|c| c.name().to_string()).collect(),
    ))
}

/// Decode one driver row into the uniform row model, by declared column
/// type.
pub(crate) fn decode_row(
    row: &tokio_postgres::Row,
    schema: &Arc<RowSchema>,
) -> Result<Row, LakesqlError> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        values.push(decode_value(row, idx, column.type_()).map_err(query_error)?);
    }
    Ok(Row::new(Arc::clone(schema), values))
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<Value, tokio_postgres::Error> {
    let value = match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Int(v as i64)),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Int(v as i64)),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(v as f64)),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        "numeric" => row.try_get::<_, Option<Decimal>>(idx)?.map(Value::Decimal),
        "date" => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<FixedOffset>>>(idx)?
            .map(Value::Timestamp),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|v| Value::Timestamp(v.and_utc().fixed_offset())),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(v) => v.map(Value::Text),
            Err(e) => {
                // No textual representation either; surface the cell as NULL.
                debug!("cannot decode column {} ({}): {}", idx, ty.name(), e);
                None
            }
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int(v) => {
                if *ty == Type::INT2 {
                    (*v as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*v as i32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Decimal(v) => v.to_sql(ty, out),
            Value::Text(v) => v.to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        self.to_sql(ty, out)
    }
}

/// Synchronous Lakebase backend.
///
/// Owns at most one live connection, reused across calls. The connection
/// string is rebuilt from the config plus a fresh OAuth token at connect
/// time; an auth-classified failure triggers one reconnect-and-retry.
pub struct SyncPostgresBackend {
    config: PostgresConfig,
    token_manager: Arc<OAuthTokenManager>,
    client: Option<postgres::Client>,
}

impl SyncPostgresBackend {
    pub fn new(config: PostgresConfig, token_manager: Arc<OAuthTokenManager>) -> Self {
        Self {
            config,
            token_manager,
            client: None,
        }
    }

    /// The live connection, opening one with the current token if needed.
    fn connection(&mut self) -> Result<&mut postgres::Client, LakesqlError> {
        if self.client.is_none() {
            let token = self.token_manager.get_token();
            let conn_string = self.config.connection_string(&token);
            let client =
                postgres::Client::connect(&conn_string, tls_connector()?).map_err(connect_error)?;
            self.client = Some(client);
        }
        match self.client.as_mut() {
            Some(client) => Ok(client),
            None => Err(LakesqlError::Connection {
                message: "connection unavailable".to_string(),
            }),
        }
    }

    /// Drop the connection and force a token refresh on the next connect.
    fn reconnect(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.close();
        }
        self.token_manager.invalidate();
    }

    fn try_execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, LakesqlError> {
        let client = self.connection()?;
        let pg_params = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        client.execute(sql, &pg_params).map_err(query_error)
    }

    fn prepare(&mut self, sql: &str) -> Result<postgres::Statement, LakesqlError> {
        let client = self.connection()?;
        client.prepare(sql).map_err(query_error)
    }

    /// Close the connection, if open.
    pub fn close(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.close();
        }
    }
}

impl SqlBackend for SyncPostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, LakesqlError> {
        match self.try_execute(sql, params) {
            Ok(count) => Ok(count),
            Err(e @ LakesqlError::Auth { .. }) => {
                warn!("auth error, refreshing token and retrying: {}", e);
                self.reconnect();
                self.try_execute(sql, params)
            }
            Err(e) => Err(e),
        }
    }

    fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<RowIter<'_>, LakesqlError> {
        // Auth failures surface while connecting and preparing; retry that
        // stage once, then stream rows off the prepared statement.
        let stmt = match self.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e @ LakesqlError::Auth { .. }) => {
                warn!("auth error, refreshing token and retrying: {}", e);
                self.reconnect();
                self.prepare(sql)?
            }
            Err(e) => return Err(e),
        };

        let schema = schema_from_columns(stmt.columns());
        let client = self.connection()?;
        let rows = client
            .query_raw(&stmt, params.iter().map(|p| p as &(dyn ToSql + Sync)))
            .map_err(query_error)?;

        Ok(Box::new(PgRows { inner: rows, schema }))
    }

    /// Parameterized inserts, one statement per row. The driver binds
    /// values safely, so nothing is inlined.
    fn save_table(
        &mut self,
        full_name: &str,
        columns: &[ColumnSpec],
        rows: &[Vec<Value>],
        mode: SaveMode,
    ) -> Result<(), LakesqlError> {
        if rows.is_empty() {
            return Ok(());
        }
        let table = Dialect::Postgres.escape_full_name(full_name);
        if mode == SaveMode::Overwrite {
            self.execute(&format!("TRUNCATE TABLE {table}"), &[])?;
        }
        let cols = columns
            .iter()
            .map(|c| Dialect::Postgres.escape_name(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO {table} ({cols}) VALUES ({placeholders})");
        for row in rows {
            self.execute(&sql, row)?;
        }
        Ok(())
    }
}

/// Streams rows off the blocking driver's cursor.
struct PgRows<'a> {
    inner: postgres::RowIter<'a>,
    schema: Arc<RowSchema>,
}

impl Iterator for PgRows<'_> {
    type Item = Result<Row, LakesqlError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Ok(Some(row)) => Some(decode_row(&row, &self.schema)),
            Ok(None) => None,
            Err(e) => Some(Err(query_error(e))),
        }
    }
}

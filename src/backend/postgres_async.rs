use std::sync::Arc;

use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tracing::{debug, warn};

use crate::backend::postgres::{
    connect_error, decode_row, query_error, schema_from_columns, tls_connector,
};
use crate::backend::{RowIter, SaveMode, SqlBackend};
use crate::config::PostgresConfig;
use crate::convert::ColumnSpec;
use crate::error::LakesqlError;
use crate::escape::Dialect;
use crate::row::{Row, Value};
use crate::token::OAuthTokenManager;

/// Asynchronous Lakebase backend.
///
/// Borrows a pooled connection per call when a pool is supplied, or opens
/// an ad hoc connection otherwise. `fetch_async` materializes the full
/// result set before returning, because pooled connections must not keep cursors
/// open across suspension points, unlike the sync backend's streaming
/// fetch. The blocking [`SqlBackend`] entry points fail immediately; a
/// cooperative scheduler must never be blocked by this type.
pub struct AsyncPostgresBackend {
    config: Option<PostgresConfig>,
    pool: Option<Pool>,
    token_manager: Arc<OAuthTokenManager>,
}

enum AsyncConn {
    Pooled(deadpool_postgres::Object),
    Adhoc(tokio_postgres::Client),
}

impl AsyncConn {
    fn client(&self) -> &tokio_postgres::Client {
        match self {
            AsyncConn::Pooled(object) => object,
            AsyncConn::Adhoc(client) => client,
        }
    }
}

impl AsyncPostgresBackend {
    /// Backend that opens one ad hoc connection per call.
    pub fn new(config: PostgresConfig, token_manager: Arc<OAuthTokenManager>) -> Self {
        Self {
            config: Some(config),
            pool: None,
            token_manager,
        }
    }

    /// Backend borrowing connections from an externally supplied pool.
    pub fn from_pool(pool: Pool, token_manager: Arc<OAuthTokenManager>) -> Self {
        Self {
            config: None,
            pool: Some(pool),
            token_manager,
        }
    }

    async fn acquire(&self) -> Result<AsyncConn, LakesqlError> {
        if let Some(pool) = &self.pool {
            let object = pool.get().await.map_err(|e| LakesqlError::Connection {
                message: format!("failed to acquire pooled connection: {}", e),
            })?;
            return Ok(AsyncConn::Pooled(object));
        }

        let config = self.config.as_ref().ok_or_else(|| LakesqlError::Config {
            message: "no pool or postgres config supplied".to_string(),
        })?;

        // Token refresh may perform blocking network calls.
        let manager = Arc::clone(&self.token_manager);
        let token = tokio::task::spawn_blocking(move || manager.get_token())
            .await
            .map_err(|e| LakesqlError::Connection {
                message: format!("token refresh task failed: {}", e),
            })?;

        let conn_string = config.connection_string(&token);
        let (client, connection) = tokio_postgres::connect(&conn_string, tls_connector()?)
            .await
            .map_err(connect_error)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("postgres connection closed with error: {}", e);
            }
        });
        Ok(AsyncConn::Adhoc(client))
    }

    async fn try_execute(&self, sql: &str, params: &[Value]) -> Result<u64, LakesqlError> {
        let conn = self.acquire().await?;
        let pg_params = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        conn.client()
            .execute(sql, &pg_params)
            .await
            .map_err(query_error)
    }

    async fn try_fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, LakesqlError> {
        let conn = self.acquire().await?;
        let client = conn.client();
        let stmt = client.prepare(sql).await.map_err(query_error)?;
        let schema = schema_from_columns(stmt.columns());
        let pg_params = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        let rows = client
            .query(&stmt, &pg_params)
            .await
            .map_err(query_error)?;
        rows.iter().map(|row| decode_row(row, &schema)).collect()
    }

    /// Execute a statement with one reconnect-and-retry on auth failure.
    pub async fn execute_async(&self, sql: &str, params: &[Value]) -> Result<u64, LakesqlError> {
        match self.try_execute(sql, params).await {
            Ok(count) => Ok(count),
            Err(e @ LakesqlError::Auth { .. }) => {
                warn!("auth error, refreshing token and retrying: {}", e);
                self.token_manager.invalidate();
                self.try_execute(sql, params).await
            }
            Err(e) => Err(e),
        }
    }

    /// Execute a query and return the materialized result set.
    pub async fn fetch_async(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, LakesqlError> {
        match self.try_fetch(sql, params).await {
            Ok(rows) => Ok(rows),
            Err(e @ LakesqlError::Auth { .. }) => {
                warn!("auth error, refreshing token and retrying: {}", e);
                self.token_manager.invalidate();
                self.try_fetch(sql, params).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn fetch_one_async(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, LakesqlError> {
        let mut rows = self.fetch_async(sql, params).await?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.swap_remove(0)))
        }
    }

    pub async fn fetch_value_async(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Value>, LakesqlError> {
        Ok(self
            .fetch_one_async(sql, params)
            .await?
            .and_then(|row| row.get(0).cloned()))
    }

    /// Parameterized inserts, one statement per row, truncating first in
    /// overwrite mode. An empty row set is a no-op.
    pub async fn save_table_async(
        &self,
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
            self.execute_async(&format!("TRUNCATE TABLE {table}"), &[])
                .await?;
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
            self.execute_async(&sql, row).await?;
        }
        Ok(())
    }

    pub async fn create_table_async(
        &self,
        full_name: &str,
        columns: &[ColumnSpec],
    ) -> Result<(), LakesqlError> {
        let col_defs = columns
            .iter()
            .map(|c| {
                format!(
                    "{} {}",
                    Dialect::Postgres.escape_name(&c.name),
                    c.ty.native_type(Dialect::Postgres)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            Dialect::Postgres.escape_full_name(full_name),
            col_defs
        );
        self.execute_async(&sql, &[]).await?;
        Ok(())
    }

    /// Close the pool, if this backend owns one.
    pub fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close();
        }
    }
}

fn async_only(method: &str, instead: &str) -> LakesqlError {
    LakesqlError::Unsupported {
        message: format!(
            "{} would block the scheduler; use {} on the async backend",
            method, instead
        ),
    }
}

/// Blocking entry points are a programming error here and fail loudly
/// rather than stalling a cooperative scheduler.
impl SqlBackend for AsyncPostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<u64, LakesqlError> {
        Err(async_only("execute", "execute_async"))
    }

    fn fetch(&mut self, _sql: &str, _params: &[Value]) -> Result<RowIter<'_>, LakesqlError> {
        Err(async_only("fetch", "fetch_async"))
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{RowIter, SqlBackend};
use crate::cache::TtlCache;
use crate::convert::{convert_cells, get_type_converter, Converter};
use crate::error::LakesqlError;
use crate::escape::Dialect;
use crate::retry::{retry_blocking, RetryPolicy};
use crate::row::{Row, RowSchema, Value};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_BYTE_LIMIT: u64 = 10_000_000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
/// The API rejects wait-timeout hints above 50s.
const MAX_WAIT_TIMEOUT_SECS: u64 = 50;

/// Transport for result payloads: inline JSON or external links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    ExternalLinks,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "INLINE",
            Disposition::ExternalLinks => "EXTERNAL_LINKS",
        }
    }
}

/// SQL backend driving a warehouse through the statement execution API:
/// submit, poll until terminal, paginate result chunks, convert string
/// cells by declared column type.
pub struct StatementExecutionBackend {
    client: Client,
    host: String,
    token: SecretString,
    warehouse_id: String,
    catalog: Option<String>,
    schema: Option<String>,
    disposition: Disposition,
    byte_limit: u64,
    row_limit: Option<u64>,
    timeout: Duration,
}

/// Warehouse info from the listing endpoint.
#[derive(Debug, Clone)]
pub struct WarehouseInfo {
    pub id: String,
    pub name: String,
    pub state: String,
    pub cluster_size: String,
    pub warehouse_type: Option<String>,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: String,
    on_wait_timeout: &'static str,
    format: &'static str,
    disposition: &'static str,
    byte_limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    row_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
}

#[derive(Deserialize)]
struct StatementResponse {
    statement_id: Option<String>,
    status: StatementStatus,
    manifest: Option<Manifest>,
    result: Option<ResultData>,
}

#[derive(Deserialize)]
struct StatementStatus {
    state: String,
    error: Option<StatementError>,
}

#[derive(Deserialize)]
struct StatementError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct Manifest {
    schema: Option<SchemaInfo>,
}

#[derive(Deserialize)]
struct SchemaInfo {
    columns: Option<Vec<ColumnInfo>>,
}

#[derive(Deserialize)]
struct ColumnInfo {
    name: String,
    type_name: Option<String>,
}

#[derive(Deserialize)]
struct ResultData {
    data_array: Option<Vec<Vec<Option<String>>>>,
    next_chunk_index: Option<u64>,
}

#[derive(Deserialize)]
struct WarehouseListResponse {
    warehouses: Option<Vec<WarehouseEntry>>,
}

#[derive(Deserialize)]
struct WarehouseEntry {
    id: Option<String>,
    name: Option<String>,
    state: Option<String>,
    cluster_size: Option<String>,
    warehouse_type: Option<String>,
}

impl StatementExecutionBackend {
    pub fn new(host: impl Into<String>, token: SecretString, warehouse_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into(),
            token,
            warehouse_id: warehouse_id.into(),
            catalog: None,
            schema: None,
            disposition: Disposition::Inline,
            byte_limit: DEFAULT_BYTE_LIMIT,
            row_limit: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_byte_limit(mut self, byte_limit: u64) -> Self {
        self.byte_limit = byte_limit;
        self
    }

    pub fn with_row_limit(mut self, row_limit: u64) -> Self {
        self.row_limit = Some(row_limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_url(&self) -> String {
        format!("{}/api/2.0/sql", api_root(&self.host))
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    /// Submit a statement and drive it to a terminal state.
    fn execute_statement(&self, sql: &str) -> Result<StatementResponse, LakesqlError> {
        debug!("executing: {}", normalize_sql(sql));
        let start = Instant::now();

        let wait_secs = self.timeout.as_secs().min(MAX_WAIT_TIMEOUT_SECS);
        let request = StatementRequest {
            warehouse_id: &self.warehouse_id,
            statement: sql,
            wait_timeout: format!("{wait_secs}s"),
            on_wait_timeout: "CONTINUE",
            format: "JSON_ARRAY",
            disposition: self.disposition.as_str(),
            byte_limit: self.byte_limit,
            row_limit: self.row_limit,
            catalog: self.catalog.as_deref(),
            schema: self.schema.as_deref(),
        };

        let resp = self
            .client
            .post(format!("{}/statements/", self.base_url()))
            .header("Authorization", self.auth_header())
            .json(&request)
            .send()
            .map_err(|e| LakesqlError::Connection {
                message: format!("failed to submit statement: {}", e),
            })?;
        let response = parse_response::<StatementResponse>(resp, "statement response")?;

        let response = self.wait_for_statement(response, start)?;
        debug!("statement completed in {:.2}s", start.elapsed().as_secs_f64());
        Ok(response)
    }

    /// Poll every half second until the statement leaves pending/running.
    /// Past the configured timeout, cancel best-effort and raise.
    fn wait_for_statement(
        &self,
        mut response: StatementResponse,
        start: Instant,
    ) -> Result<StatementResponse, LakesqlError> {
        loop {
            match response.status.state.as_str() {
                "SUCCEEDED" => return Ok(response),
                "FAILED" => {
                    let message = response
                        .status
                        .error
                        .and_then(|e| e.message)
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(LakesqlError::Query {
                        message: format!("statement failed: {}", message),
                    });
                }
                "CANCELED" => {
                    return Err(LakesqlError::Query {
                        message: "statement was canceled".to_string(),
                    });
                }
                "PENDING" | "RUNNING" => {
                    let statement_id =
                        response
                            .statement_id
                            .clone()
                            .ok_or_else(|| LakesqlError::Query {
                                message: "no statement_id in pending response".to_string(),
                            })?;

                    if start.elapsed() >= self.timeout {
                        self.cancel_execution(&statement_id);
                        return Err(LakesqlError::Timeout {
                            seconds: self.timeout.as_secs(),
                        });
                    }

                    std::thread::sleep(POLL_INTERVAL);
                    response = self.get_statement(&statement_id)?;
                }
                other => {
                    return Err(LakesqlError::Query {
                        message: format!("unexpected statement state: {}", other),
                    });
                }
            }
        }
    }

    fn get_statement(&self, statement_id: &str) -> Result<StatementResponse, LakesqlError> {
        let resp = self
            .client
            .get(format!("{}/statements/{}", self.base_url(), statement_id))
            .header("Authorization", self.auth_header())
            .send()
            .map_err(|e| LakesqlError::Connection {
                message: format!("failed to poll statement: {}", e),
            })?;
        parse_response(resp, "poll response")
    }

    fn get_result_chunk(
        &self,
        statement_id: &str,
        chunk_index: u64,
    ) -> Result<ResultData, LakesqlError> {
        let resp = self
            .client
            .get(format!(
                "{}/statements/{}/result/chunks/{}",
                self.base_url(),
                statement_id,
                chunk_index
            ))
            .header("Authorization", self.auth_header())
            .send()
            .map_err(|e| LakesqlError::Connection {
                message: format!("failed to fetch result chunk {}: {}", chunk_index, e),
            })?;
        parse_response(resp, "result chunk")
    }

    fn cancel_execution(&self, statement_id: &str) {
        let _ = self
            .client
            .post(format!(
                "{}/statements/{}/cancel",
                self.base_url(),
                statement_id
            ))
            .header("Authorization", self.auth_header())
            .send();
    }

    fn reject_params(params: &[Value]) -> Result<(), LakesqlError> {
        if params.is_empty() {
            Ok(())
        } else {
            Err(LakesqlError::Unsupported {
                message: "statement execution API does not support bound parameters".to_string(),
            })
        }
    }
}

impl SqlBackend for StatementExecutionBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Warehouse
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, LakesqlError> {
        Self::reject_params(params)?;
        self.execute_statement(sql)?;
        // The JSON_ARRAY disposition reports no affected-row count.
        Ok(0)
    }

    fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<RowIter<'_>, LakesqlError> {
        Self::reject_params(params)?;
        let response = self.execute_statement(sql)?;

        let columns = response
            .manifest
            .and_then(|m| m.schema)
            .and_then(|s| s.columns)
            .unwrap_or_default();
        let names = columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        let converters = columns
            .iter()
            .map(|c| c.type_name.as_deref().and_then(get_type_converter))
            .collect::<Vec<_>>();
        let schema = Arc::new(RowSchema::new(names));

        let (data, next_chunk) = match response.result {
            Some(result) => (
                result.data_array.unwrap_or_default(),
                result.next_chunk_index,
            ),
            None => (Vec::new(), None),
        };

        Ok(Box::new(WarehouseRows {
            backend: self,
            statement_id: response.statement_id,
            schema,
            converters,
            current: data.into_iter(),
            next_chunk,
            failed: false,
        }))
    }
}

/// Streams converted rows, fetching each next chunk by index until none is
/// reported.
struct WarehouseRows<'a> {
    backend: &'a StatementExecutionBackend,
    statement_id: Option<String>,
    schema: Arc<RowSchema>,
    converters: Vec<Option<Converter>>,
    current: std::vec::IntoIter<Vec<Option<String>>>,
    next_chunk: Option<u64>,
    failed: bool,
}

impl Iterator for WarehouseRows<'_> {
    type Item = Result<Row, LakesqlError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(raw) = self.current.next() {
                let values = convert_cells(raw, &self.converters);
                return Some(Ok(Row::new(self.schema.clone(), values)));
            }
            if self.failed {
                return None;
            }
            let chunk_index = self.next_chunk.take()?;
            let statement_id = self.statement_id.as_deref()?;
            match self.backend.get_result_chunk(statement_id, chunk_index) {
                Ok(chunk) => {
                    self.next_chunk = chunk.next_chunk_index;
                    self.current = chunk.data_array.unwrap_or_default().into_iter();
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn parse_response<T: DeserializeOwned>(
    resp: reqwest::blocking::Response,
    context: &str,
) -> Result<T, LakesqlError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(map_http_error(status.as_u16()));
    }
    resp.json().map_err(|e| LakesqlError::Query {
        message: format!("failed to parse {}: {}", context, e),
    })
}

fn map_http_error(status: u16) -> LakesqlError {
    match status {
        401 => LakesqlError::Auth {
            message: "invalid or expired token".to_string(),
        },
        403 => LakesqlError::Auth {
            message: "insufficient warehouse permissions".to_string(),
        },
        404 => LakesqlError::Config {
            message: "warehouse not found".to_string(),
        },
        _ => LakesqlError::Connection {
            message: format!("HTTP error: {}", status),
        },
    }
}

/// Hosts arrive with or without a scheme; default to https.
fn api_root(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host)
    }
}

fn normalize_sql(sql: &str) -> String {
    let mut normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.len() > 200 {
        let mut cut = 200;
        while !normalized.is_char_boundary(cut) {
            cut -= 1;
        }
        normalized.truncate(cut);
    }
    normalized
}

/// List the host's SQL warehouses.
pub fn list_warehouses(host: &str, token: &SecretString) -> Result<Vec<WarehouseInfo>, LakesqlError> {
    let client = Client::new();
    let resp = client
        .get(format!("{}/api/2.0/sql/warehouses/", api_root(host)))
        .header("Authorization", format!("Bearer {}", token.expose_secret()))
        .send()
        .map_err(|e| LakesqlError::Connection {
            message: format!("failed to list warehouses: {}", e),
        })?;

    let response: WarehouseListResponse = parse_response(resp, "warehouse list")?;

    Ok(response
        .warehouses
        .unwrap_or_default()
        .into_iter()
        .map(|w| WarehouseInfo {
            id: w.id.unwrap_or_default(),
            name: w.name.unwrap_or_default(),
            state: w.state.unwrap_or_default(),
            cluster_size: w.cluster_size.unwrap_or_default(),
            warehouse_type: w.warehouse_type,
        })
        .collect())
}

/// Picks a warehouse when the caller has not pinned one, preferring
/// running shared warehouses, and memoizes the choice per host.
pub struct WarehouseSelector {
    host: String,
    token: SecretString,
    cache: TtlCache<String, String>,
    retry: RetryPolicy,
}

impl WarehouseSelector {
    pub fn new(host: impl Into<String>, token: SecretString) -> Self {
        Self {
            host: host.into(),
            token,
            cache: TtlCache::new(4, Duration::from_secs(300)),
            retry: RetryPolicy::transient(),
        }
    }

    /// The cached selection, or a fresh listing bucketed by
    /// running-shared > running > stopped-shared > stopped.
    pub fn best_warehouse_id(&self) -> Result<String, LakesqlError> {
        if let Some(id) = self.cache.get(&self.host) {
            return Ok(id);
        }

        let warehouses = retry_blocking(
            &self.retry,
            |e| matches!(e, LakesqlError::Connection { .. }),
            || list_warehouses(&self.host, &self.token),
        )?;

        let best = pick_best_warehouse(&warehouses).ok_or_else(|| LakesqlError::Config {
            message: "no SQL warehouse available".to_string(),
        })?;
        info!("auto-selected warehouse: {} ({})", best.name, best.id);
        let id = best.id.clone();
        self.cache.set(self.host.clone(), id.clone());
        Ok(id)
    }
}

fn pick_best_warehouse(warehouses: &[WarehouseInfo]) -> Option<&WarehouseInfo> {
    let bucket = |w: &WarehouseInfo| {
        let running = w.state == "RUNNING";
        let shared = w.name.to_lowercase().contains("shared");
        match (running, shared) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        }
    };
    warehouses.iter().min_by_key(|w| bucket(w))
}

use crate::error::LakesqlError;

/// Database name every managed instance exposes.
pub const DEFAULT_DATABASE: &str = "databricks_postgres";
/// Service principal user for token-authenticated connections.
pub const DEFAULT_USER: &str = "token";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SSLMODE: &str = "require";

/// PostgreSQL connection configuration for a Lakebase instance.
///
/// Immutable once built. The OAuth token is not stored here; it is
/// interpolated into the connection string at connect time.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    host: String,
    port: u16,
    database: String,
    user: String,
    sslmode: String,
    hostaddr: Option<String>,
}

impl PostgresConfig {
    /// Build a config for a host, with Lakebase defaults everywhere else.
    /// Fails when the host is empty, since no connection string could
    /// ever be built from it.
    pub fn new(host: impl Into<String>) -> Result<Self, LakesqlError> {
        let host = host.into();
        if host.is_empty() {
            return Err(LakesqlError::Config {
                message: "postgres host must not be empty".to_string(),
            });
        }
        Ok(Self {
            host,
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            user: DEFAULT_USER.to_string(),
            sslmode: DEFAULT_SSLMODE.to_string(),
            hostaddr: None,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_sslmode(mut self, sslmode: impl Into<String>) -> Self {
        self.sslmode = sslmode.into();
        self
    }

    /// Pre-resolved IP for hosts the local resolver cannot see; appended
    /// as `hostaddr` so the driver skips resolution while TLS still
    /// validates against the hostname.
    pub fn with_hostaddr(mut self, hostaddr: impl Into<String>) -> Self {
        self.hostaddr = Some(hostaddr.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Connection string with the current OAuth token in the password slot.
    pub fn connection_string(&self, password: &str) -> String {
        let mut conn = format!(
            "postgresql://{}:{}@{}:{}/{}?sslmode={}",
            self.user, password, self.host, self.port, self.database, self.sslmode
        );
        if let Some(hostaddr) = &self.hostaddr {
            conn.push_str(&format!("&hostaddr={}", hostaddr));
        }
        conn
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::LakesqlError;

/// Refresh cadence: 50 minutes, inside the 1-hour credential TTL.
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(50 * 60);

/// Environment fallback injected by the hosting platform.
const PGPASSWORD_VAR: &str = "PGPASSWORD";
/// Last-resort environment fallback.
const FALLBACK_TOKEN_VAR: &str = "DATABRICKS_TOKEN";
/// PGPASSWORD values at or below this length are human-typed placeholders,
/// not tokens.
const MIN_ENV_TOKEN_LEN: usize = 20;

/// Credential issued for a named database instance.
#[derive(Debug, Clone)]
pub struct DatabaseCredential {
    pub access_token: String,
}

/// The pre-authenticated workspace identity this layer refreshes tokens
/// through. Supplied by the composition root; treated as opaque here.
pub trait CredentialClient: Send + Sync {
    /// Issue a short-lived credential scoped to the named instances. The
    /// request id is fresh per call, for idempotency and audit.
    fn generate_database_credential(
        &self,
        request_id: &str,
        instance_names: &[String],
    ) -> Result<DatabaseCredential, LakesqlError>;

    /// The workspace identity's own OAuth access token.
    fn oauth_token(&self) -> Result<String, LakesqlError>;

    /// Authorization headers as the identity client would send them.
    fn auth_headers(&self) -> Result<HashMap<String, String>, LakesqlError>;
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<String>,
    last_refresh: Option<Instant>,
}

struct RefreshTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the OAuth token used as the password for every database
/// connection: acquisition, caching, proactive refresh, and
/// invalidation-on-demand.
///
/// `get_token`/`invalidate` are safe from concurrent callers; a single
/// mutex serializes the refresh-and-check so a stale token is refreshed
/// once, not once per caller.
pub struct OAuthTokenManager {
    state: Mutex<TokenState>,
    refresh_interval: Duration,
    credential_client: Option<Arc<dyn CredentialClient>>,
    instance_name: Option<String>,
    use_env_fallback: bool,
    refresh_task: Mutex<Option<RefreshTask>>,
}

impl OAuthTokenManager {
    pub fn new(credential_client: Option<Arc<dyn CredentialClient>>) -> Self {
        Self {
            state: Mutex::new(TokenState::default()),
            refresh_interval: TOKEN_REFRESH_INTERVAL,
            credential_client,
            instance_name: None,
            use_env_fallback: true,
            refresh_task: Mutex::new(None),
        }
    }

    /// A manager that refreshes exclusively through the credential client.
    ///
    /// Environment fallbacks are disabled so stale or wrong-scope values
    /// in the environment never mask the intended flow.
    pub fn from_credential_client(
        credential_client: Arc<dyn CredentialClient>,
        instance_name: Option<String>,
    ) -> Self {
        let mut manager = Self::new(Some(credential_client));
        manager.instance_name = instance_name;
        manager.use_env_fallback = false;
        manager
    }

    pub fn with_instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = Some(instance_name.into());
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// A valid token, refreshing first when the cached one is absent or
    /// past the refresh interval. Returns an empty string when every
    /// refresh strategy fails and no stale value is cached; callers treat
    /// that the same as an explicit auth failure.
    pub fn get_token(&self) -> String {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = matches!(
            (&state.token, state.last_refresh),
            (Some(_), Some(at)) if at.elapsed() <= self.refresh_interval
        );
        if !fresh {
            self.refresh_locked(&mut state);
        }
        state.token.clone().unwrap_or_default()
    }

    /// Force the next `get_token` to refresh. The cached value is kept as
    /// an emergency fallback should that refresh fail.
    pub fn invalidate(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_refresh = None;
    }

    /// Refresh immediately. Returns whether any strategy produced a token.
    pub fn refresh(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refresh_locked(&mut state)
    }

    /// Strategy chain, first success wins:
    /// 1. dedicated per-instance credential issuance
    /// 2. workspace identity OAuth token
    /// 3. bearer token from the identity's authorization headers
    /// 4. PGPASSWORD from the environment (if fallback enabled, token-length only)
    /// 5. DATABRICKS_TOKEN from the environment (if fallback enabled)
    fn refresh_locked(&self, state: &mut TokenState) -> bool {
        debug!("refreshing database OAuth token");

        if let Some(client) = &self.credential_client {
            if let Some(instance) = &self.instance_name {
                let request_id = Uuid::new_v4().to_string();
                match client.generate_database_credential(&request_id, &[instance.clone()]) {
                    Ok(cred) if !cred.access_token.is_empty() => {
                        state.token = Some(cred.access_token);
                        state.last_refresh = Some(Instant::now());
                        info!("token refreshed via database credential API");
                        return true;
                    }
                    Ok(_) => debug!("database credential API returned an empty token"),
                    Err(e) => debug!("database credential API failed: {}", e),
                }
            }

            match client.oauth_token() {
                Ok(token) if !token.is_empty() => {
                    state.token = Some(token);
                    state.last_refresh = Some(Instant::now());
                    info!("token refreshed via workspace OAuth token");
                    return true;
                }
                Ok(_) => debug!("workspace OAuth token was empty"),
                Err(e) => debug!("workspace OAuth token failed: {}", e),
            }

            match client.auth_headers() {
                Ok(headers) => {
                    let bearer = headers
                        .get("Authorization")
                        .and_then(|h| h.strip_prefix("Bearer "));
                    if let Some(token) = bearer {
                        state.token = Some(token.to_string());
                        state.last_refresh = Some(Instant::now());
                        info!("token refreshed via authorization headers");
                        return true;
                    }
                }
                Err(e) => debug!("authorization header lookup failed: {}", e),
            }
        }

        if self.use_env_fallback {
            if let Ok(password) = std::env::var(PGPASSWORD_VAR) {
                if password.len() > MIN_ENV_TOKEN_LEN {
                    state.token = Some(password);
                    state.last_refresh = Some(Instant::now());
                    info!("using {} from environment", PGPASSWORD_VAR);
                    return true;
                }
            }
            if let Ok(token) = std::env::var(FALLBACK_TOKEN_VAR) {
                if !token.is_empty() {
                    state.token = Some(token);
                    state.last_refresh = Some(Instant::now());
                    info!("using {} from environment", FALLBACK_TOKEN_VAR);
                    return true;
                }
            }
        }

        warn!("failed to refresh database OAuth token");
        false
    }

    /// Start the background refresh loop: one synchronous refresh now,
    /// then a refresh every interval until cancelled. No-op if already
    /// running. Takes the shared handle; callers keep their own clone.
    pub fn start_background_refresh(self: Arc<Self>) {
        let mut task = self.refresh_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        self.refresh();

        let manager = Arc::clone(&self);
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let interval = self.refresh_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let mgr = Arc::clone(&manager);
                        if let Err(e) = tokio::task::spawn_blocking(move || mgr.refresh()).await {
                            warn!("background token refresh failed: {}", e);
                        }
                    }
                }
            }
        });

        *task = Some(RefreshTask { cancel, handle });
    }

    /// Request cancellation and await the task's termination, bounded so
    /// shutdown never hangs on it.
    pub async fn stop_background_refresh(&self) {
        let task = {
            let mut slot = self.refresh_task.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(task) = task {
            task.cancel.cancel();
            if tokio::time::timeout(Duration::from_secs(5), task.handle)
                .await
                .is_err()
            {
                warn!("background token refresh did not stop within 5s");
            }
        }
    }
}

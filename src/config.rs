use dotenvy::dotenv;
use humantime::parse_duration;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pager::Pager;
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionStore};

#[derive(Clone)]
pub struct Config {
    pub api_url: String,
    /// TOML session file written by the authorization helper
    pub session_file: String,
    // Fallback session when the file is absent
    pub access_token: Option<String>,
    pub user_id: Option<u64>,
    pub country_code: Option<String>,

    pub http_timeout_secs: u64,

    // Paging
    pub page_size: usize,
    pub max_items: usize,
    pub drift_restarts: u32,

    // Playlist edits
    pub add_chunk_size: usize,
    pub native_move: bool,

    // Retry policy for pages and edit steps
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            api_url: env::var("TIDAL_API_URL")
                .unwrap_or_else(|_| "https://api.tidal.com/v1".to_string()),
            session_file: env::var("TIDAL_SESSION_FILE")
                .unwrap_or_else(|_| "tidal-session.toml".to_string()),
            access_token: env::var("TIDAL_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            user_id: env::var("TIDAL_USER_ID").ok().and_then(|id| id.parse().ok()),
            country_code: env::var("TIDAL_COUNTRY_CODE").ok(),
            http_timeout_secs: env::var("TIDAL_HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            page_size: env::var("TIDAL_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            max_items: env::var("TIDAL_MAX_ITEMS")
                .unwrap_or_else(|_| "100000".to_string())
                .parse()
                .unwrap_or(100_000),
            drift_restarts: env::var("TIDAL_DRIFT_RESTARTS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            add_chunk_size: env::var("TIDAL_ADD_CHUNK_SIZE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            native_move: env::var("TIDAL_NATIVE_MOVE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            retry_attempts: env::var("TIDAL_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            retry_base_delay: Self::duration_var("TIDAL_RETRY_BASE_DELAY", "250ms")?,
            retry_max_delay: Self::duration_var("TIDAL_RETRY_MAX_DELAY", "5s")?,
        })
    }

    fn duration_var(name: &str, default: &str) -> anyhow::Result<Duration> {
        let raw = env::var(name).unwrap_or_else(|_| default.to_string());
        parse_duration(&raw)
            .map_err(|e| anyhow::anyhow!("{} must be a duration like '250ms': {}", name, e))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            self.retry_base_delay,
            self.retry_max_delay,
        )
    }

    /// `page_size` is the adapter's page size; the adapter clamps it further.
    pub fn pager(&self, page_size: usize) -> Pager {
        Pager::new(page_size, self.retry_policy())
            .with_max_items(self.max_items)
            .with_max_restarts(self.drift_restarts)
    }

    /// Session taken from the environment, used when no session file exists.
    pub fn fallback_session(&self) -> Option<Session> {
        let token = self.access_token.as_ref()?;
        let mut session = Session::new(token.clone());
        session.user_id = self.user_id;
        session.country_code = self.country_code.clone();
        Some(session)
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(
            Some(PathBuf::from(&self.session_file)),
            self.fallback_session(),
        )
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("session_file", &self.session_file)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .field("country_code", &self.country_code)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("page_size", &self.page_size)
            .field("max_items", &self.max_items)
            .field("drift_restarts", &self.drift_restarts)
            .field("add_chunk_size", &self.add_chunk_size)
            .field("native_move", &self.native_move)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .finish()
    }
}

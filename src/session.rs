//! Session handle shared by the adapter.
//!
//! A session is acquired at login (from the session file written by the
//! authorization helper, or from the environment), read on every remote call
//! and dropped as soon as TIDAL rejects it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            user_id: None,
            country_code: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("user_id", &self.user_id)
            .field("country_code", &self.country_code)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    current: Arc<RwLock<Option<Session>>>,
    path: Option<PathBuf>,
    fallback: Option<Session>,
}

impl SessionStore {
    /// `fallback` is used when the session file is absent (env-provided token).
    pub fn new(path: Option<PathBuf>, fallback: Option<Session>) -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            path,
            fallback,
        }
    }

    pub fn with_session(session: Session) -> Self {
        let store = Self::new(None, None);
        store.install(session);
        store
    }

    /// The live session, or `Unauthenticated` when there is none or it has
    /// expired.
    pub fn current(&self) -> Result<Session> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(session) if !session.is_expired(Utc::now()) => Ok(session.clone()),
            Some(_) => {
                debug!("Session: token expired");
                Err(Error::Unauthenticated)
            }
            None => Err(Error::Unauthenticated),
        }
    }

    pub fn is_active(&self) -> bool {
        self.current().is_ok()
    }

    pub fn install(&self, session: Session) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(session);
    }

    /// Drops the session after TIDAL rejected it.
    pub fn invalidate(&self) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            warn!("Session: invalidated, a new login is required");
        }
    }

    /// Re-reads the session file (or the env fallback) and installs it.
    pub fn reload(&self) -> Result<Session> {
        let loaded = match &self.path {
            Some(path) => Self::load_file(path)?,
            None => None,
        };
        let session = loaded
            .or_else(|| self.fallback.clone())
            .ok_or(Error::Unauthenticated)?;
        if session.is_expired(Utc::now()) {
            return Err(Error::Unauthenticated);
        }
        self.install(session.clone());
        info!("Session: loaded");
        Ok(session)
    }

    /// Records user and country learned from validating the session, and
    /// writes them back to the session file when there is one.
    pub fn remember_identity(&self, user_id: u64, country_code: &str) -> Result<()> {
        let updated = {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            let Some(session) = guard.as_mut() else {
                return Err(Error::Unauthenticated);
            };
            session.user_id = Some(user_id);
            session.country_code = Some(country_code.to_string());
            session.clone()
        };
        if let Some(path) = &self.path {
            if path.exists() {
                Self::save_file(path, &updated)?;
            }
        }
        Ok(())
    }

    pub fn load_file(path: &Path) -> Result<Option<Session>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::invalid(format!(
                    "cannot read session file {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        toml::from_str(&content).map(Some).map_err(|e| {
            Error::invalid(format!("malformed session file {}: {}", path.display(), e))
        })
    }

    pub fn save_file(path: &Path, session: &Session) -> Result<()> {
        let content = toml::to_string(session)
            .map_err(|e| Error::invalid(format!("cannot encode session: {}", e)))?;
        fs::write(path, content).map_err(|e| {
            Error::invalid(format!(
                "cannot write session file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

use std::time::Duration;

use serde::Serialize;

use crate::planner::MutationReport;

/// Convenient result alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], stable across versions and
/// reported to tool callers as `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    NotFound,
    RateLimited,
    TransientNetwork,
    InvalidRequest,
    RevisionConflict,
    UnexpectedResponse,
    PaginationExhausted,
    PartialMutationFailure,
    Cancelled,
}

/// Errors raised while talking to TIDAL or executing a playlist plan.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The session is missing, expired or was rejected. Never retried here;
    /// the caller has to log in again.
    #[error("not logged in to TIDAL or the session expired")]
    Unauthenticated,
    /// The referenced resource does not exist (or was deleted).
    #[error("{0} not found")]
    NotFound(String),
    /// TIDAL asked us to slow down.
    #[error("rate limited by TIDAL")]
    RateLimited {
        /// Delay requested through `Retry-After`, when present.
        retry_after: Option<Duration>,
    },
    /// Timeout, connection failure or a 5xx from TIDAL.
    #[error("network error talking to TIDAL: {0}")]
    TransientNetwork(String),
    /// The request was malformed; retrying will not help.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The playlist changed underneath a plan (precondition failed).
    #[error("playlist {0} was modified by another client")]
    RevisionConflict(String),
    /// TIDAL answered with something we could not decode.
    #[error("unexpected response from TIDAL: {0}")]
    UnexpectedResponse(String),
    /// The remote kept reporting more pages past the configured cap.
    #[error("pagination did not terminate after {pages} pages")]
    PaginationExhausted { pages: usize },
    /// Some steps of a multi-step edit were applied, the rest were not.
    #[error(
        "{} of {} playlist edits applied to {} before a step failed",
        .0.applied_count(),
        .0.steps.len(),
        .0.playlist_id
    )]
    PartialMutationFailure(Box<MutationReport>),
    /// The request was cancelled before any step was applied.
    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthenticated => ErrorKind::Unauthenticated,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::RevisionConflict(_) => ErrorKind::RevisionConflict,
            Error::UnexpectedResponse(_) => ErrorKind::UnexpectedResponse,
            Error::PaginationExhausted { .. } => ErrorKind::PaginationExhausted,
            Error::PartialMutationFailure(_) => ErrorKind::PartialMutationFailure,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only rate limiting and transport hiccups are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::TransientNetwork
        )
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::UnexpectedResponse(err.to_string())
        } else if err.is_builder() {
            Error::InvalidRequest(err.to_string())
        } else {
            Error::TransientNetwork(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::UnexpectedResponse(err.to_string())
    }
}

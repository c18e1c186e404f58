//! Error types for the queue service

use crate::models::{EntryId, EntryStatus};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid priority {0}: must be between 1 and 5")]
    InvalidPriority(String),

    #[error("Patient {patient_ref} already has an active queue entry")]
    DuplicateActiveEntry {
        patient_ref: String,
        entry_id: Option<EntryId>,
    },

    #[error("Unknown patient: {0}")]
    UnknownPatient(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: EntryStatus, to: EntryStatus },

    #[error("Entry {id} is finalized ({status})")]
    EntryFinalized { id: EntryId, status: EntryStatus },

    #[error("Entry {id} cannot be removed once claimed ({status})")]
    CannotRemoveClaimedEntry { id: EntryId, status: EntryStatus },

    #[error("Entry {id} is no longer waiting ({status})")]
    NotWaiting { id: EntryId, status: EntryStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification callers use to decide between fixing input,
/// re-fetching state, or giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPriority(_)
            | Error::DuplicateActiveEntry { .. }
            | Error::UnknownPatient(_)
            | Error::Validation(_) => ErrorKind::Validation,
            Error::InvalidTransition { .. }
            | Error::EntryFinalized { .. }
            | Error::CannotRemoveClaimedEntry { .. }
            | Error::NotWaiting { .. } => ErrorKind::StateConflict,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Database(_) | Error::Internal(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::Database(_) => "database",
            Error::InvalidPriority(_) => "invalid_priority",
            Error::DuplicateActiveEntry { .. } => "duplicate_active_entry",
            Error::UnknownPatient(_) => "unknown_patient",
            Error::Validation(_) => "validation",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::EntryFinalized { .. } => "entry_finalized",
            Error::CannotRemoveClaimedEntry { .. } => "cannot_remove_claimed_entry",
            Error::NotWaiting { .. } => "not_waiting",
            Error::NotFound(_) => "not_found",
            Error::Internal(_) | Error::Other(_) => "internal",
        }
    }

    pub fn entry_not_found(id: EntryId) -> Self {
        Error::NotFound(format!("queue entry {}", id))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::InvalidPriority(_) | Error::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Error::UnknownPatient(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            Error::DuplicateActiveEntry { .. }
            | Error::InvalidTransition { .. }
            | Error::EntryFinalized { .. }
            | Error::CannotRemoveClaimedEntry { .. }
            | Error::NotWaiting { .. } => (StatusCode::CONFLICT, self.to_string()),
            Error::Database(_) | Error::Internal(_) | Error::Other(_) => {
                tracing::error!("Internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": self.code(),
            "kind": self.kind().as_str(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::InvalidPriority("9".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::InvalidTransition {
                from: EntryStatus::Waiting,
                to: EntryStatus::Completed,
            }
            .kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            Error::entry_not_found(EntryId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::Internal("boom".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_error_status_codes() {
        let id = EntryId::new();
        let cases = vec![
            (Error::InvalidPriority("0".to_string()), StatusCode::BAD_REQUEST),
            (
                Error::UnknownPatient("p-9".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                Error::EntryFinalized {
                    id,
                    status: EntryStatus::Completed,
                },
                StatusCode::CONFLICT,
            ),
            (Error::entry_not_found(id), StatusCode::NOT_FOUND),
            (
                Error::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}

//! # Errors — Caller-Facing Failure Taxonomy
//!
//! Every operation in [`crate::service`] fails with a [`PetnetError`]. The
//! variant decides the machine-readable `kind` and HTTP status the API layer
//! reports; the message is the human-readable half of the response body.
//!
//! Collaborator failures (database driver, blob storage) are carried in
//! [`PetnetError::Database`] and [`PetnetError::Internal`]. Their details are
//! logged, never sent to the caller.

use thiserror::Error;

pub type Result<T, E = PetnetError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PetnetError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    DuplicateAction(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not eligible: {0}")]
    NotEligible(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PetnetError {
    /// Stable machine-readable code for the `kind` field of error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PetnetError::Unauthenticated => "unauthenticated",
            PetnetError::NotFound(_) => "not_found",
            PetnetError::Forbidden(_) => "forbidden",
            PetnetError::InvalidInput(_) => "invalid_input",
            PetnetError::DuplicateAction(_) => "duplicate_action",
            PetnetError::Conflict(_) => "conflict",
            PetnetError::NotEligible(_) => "not_eligible",
            PetnetError::Database(_) | PetnetError::Internal(_) => "internal",
        }
    }

    /// True for failures of a collaborator rather than of the request itself.
    pub fn is_internal(&self) -> bool {
        matches!(self, PetnetError::Database(_) | PetnetError::Internal(_))
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        PetnetError::NotFound(what.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PetnetError::InvalidInput(msg.into())
    }
}

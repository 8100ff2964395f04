//! Domain error taxonomy.
//!
//! Every core operation returns [`RewardsError`]. The API layer maps each
//! variant through [`ErrorKind`] to a status code and a `{kind, message}` body.

use crate::pairing::SessionStatus;
use crate::storage::StorageError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, RewardsError>;

/// Errors surfaced by the ledger, pairing and deposit cores.
#[derive(Debug, thiserror::Error)]
pub enum RewardsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("pairing session has expired")]
    Expired,

    #[error("caller is not the user bound to this session")]
    Forbidden,

    #[error("pairing session is already bound to a user")]
    AlreadyBound,

    #[error("unknown material: {0}")]
    UnknownMaterial(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("insufficient balance: requested {requested} points, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("pairing session is {0}")]
    SessionClosed(SessionStatus),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RewardsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RewardsError::InvalidInput(_) => ErrorKind::InvalidInput,
            RewardsError::NotFound(_) => ErrorKind::NotFound,
            RewardsError::Expired => ErrorKind::Expired,
            RewardsError::Forbidden => ErrorKind::Forbidden,
            RewardsError::AlreadyBound => ErrorKind::AlreadyBound,
            RewardsError::UnknownMaterial(_) => ErrorKind::UnknownMaterial,
            RewardsError::InvalidQuantity(_) => ErrorKind::InvalidQuantity,
            RewardsError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            RewardsError::SessionClosed(_) => ErrorKind::SessionClosed,
            RewardsError::Unauthorized(_) => ErrorKind::Unauthorized,
            RewardsError::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        RewardsError::InvalidInput(msg.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        RewardsError::NotFound(what.into())
    }
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl From<sqlx::Error> for RewardsError {
    fn from(e: sqlx::Error) -> Self {
        RewardsError::Storage(StorageError::Database(e))
    }
}

/// Caller-visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Expired,
    Forbidden,
    AlreadyBound,
    UnknownMaterial,
    InvalidQuantity,
    InsufficientBalance,
    SessionClosed,
    Unauthorized,
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Expired => "expired",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::AlreadyBound => "already_bound",
            ErrorKind::UnknownMaterial => "unknown_material",
            ErrorKind::InvalidQuantity => "invalid_quantity",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::SessionClosed => "session_closed",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::StorageFailure => "storage_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

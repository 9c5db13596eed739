use sled::transaction::TransactionError;
use thiserror::Error;

/// Errors that can arise while interacting with the realm store and game rules.
#[derive(Debug, Error)]
pub enum RealmError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, seed files, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Missing or malformed request fields, or a rule the request violates.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The player cannot cover a gold cost.
    #[error("insufficient gold: need {needed}, have {available}")]
    InsufficientGold { needed: i64, available: i64 },

    /// Bad credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The record already exists (duplicate username, quest already accepted, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal error (task join errors, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl RealmError {
    /// Short machine-readable name used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RealmError::Sled(_)
            | RealmError::Bincode(_)
            | RealmError::Io(_)
            | RealmError::SchemaMismatch { .. }
            | RealmError::Internal(_) => "Internal",
            RealmError::NotFound(_) => "NotFound",
            RealmError::InvalidInput(_) => "InvalidInput",
            RealmError::InsufficientGold { .. } => "InsufficientGold",
            RealmError::Unauthorized(_) => "Unauthorized",
            RealmError::Conflict(_) => "Conflict",
        }
    }
}

impl From<TransactionError<RealmError>> for RealmError {
    fn from(err: TransactionError<RealmError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(inner) => RealmError::Sled(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_abort_unwraps_to_inner_error() {
        let err: RealmError = TransactionError::Abort(RealmError::InsufficientGold {
            needed: 10,
            available: 3,
        })
        .into();
        assert_eq!(err.code(), "InsufficientGold");
        assert!(err.to_string().contains("need 10"));
    }

    #[test]
    fn storage_failures_report_internal() {
        let err = RealmError::SchemaMismatch {
            entity: "player",
            expected: 1,
            found: 7,
        };
        assert_eq!(err.code(), "Internal");
    }
}

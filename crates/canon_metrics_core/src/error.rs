use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonError {
    /// A write-time invariant was violated (one-of value columns, missing
    /// `org_id` grain key, metadata schema under strict policy). Raised
    /// before any mutation is attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A reference to a nonexistent metric, metric version, or result.
    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    /// Re-insertion of an existing primary or composite key.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Database connectivity failure — the caller may retry with backoff;
    /// the core never retries on its own.
    #[error("transient infrastructure error: {0}")]
    Transient(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CanonError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::ForeignKey(_) => 422,
            Self::DuplicateKey(_) => 409,
            Self::NotFound(_) => 404,
            Self::Transient(_) => 503,
            Self::Internal(_) => 500,
        }
    }
}

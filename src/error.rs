use serde_json::{json, Value};

/// Failure of a store operation.
///
/// Everything except `Db`, `Json` and `Internal` is an expected outcome the
/// caller can act on. The persistence variants are surfaced as a generic
/// retryable failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{entity} named {name:?} already exists")]
    DuplicateName { entity: &'static str, name: String },
    #[error("author already commented on this question")]
    DuplicateAuthor,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("only the author may change this comment")]
    NotOwner,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("current password is incorrect")]
    WrongPassword,
    #[error("sign in first")]
    NotAuthenticated,
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("stored payload is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::DuplicateName { .. } => "duplicate_name",
            Self::DuplicateAuthor => "duplicate_author",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidState(_) => "invalid_state",
            Self::ValidationFailed(_) => "validation_failed",
            Self::NotOwner => "not_owner",
            Self::InvalidCredentials => "invalid_credentials",
            Self::WrongPassword => "wrong_password",
            Self::NotAuthenticated => "not_authenticated",
            Self::Db(_) | Self::Json(_) => "db_failed",
            Self::Internal(_) => "internal_failed",
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Db(_) | Self::Json(_) | Self::Internal(_))
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::NotFound(entity) => Some(json!({ "entity": entity })),
            Self::DuplicateName { entity, name } => {
                Some(json!({ "entity": entity, "name": name }))
            }
            Self::Db(_) | Self::Json(_) => Some(json!({ "retryable": true })),
            _ => None,
        }
    }
}

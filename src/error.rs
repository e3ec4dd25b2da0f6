use thiserror::Error;

use crate::identity::IdentityError;
use crate::index::IndexError;
use crate::model::EntityKind;
use crate::objects::ObjectError;
use crate::store::StoreError;

/// Application error taxonomy. Every variant maps onto exactly one
/// HTTP-style status via [`AppError::status`]; the display string is the
/// message surfaced to callers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Required input is missing or malformed.
    #[error("{0}")]
    Validation(String),
    /// A required query parameter is missing or malformed.
    #[error("{0}")]
    BadRequest(String),
    /// The record does not exist or belongs to someone else. The two cases
    /// are deliberately indistinguishable to the caller.
    #[error("{} not found", .0.as_str())]
    NotFound(EntityKind),
    /// The caller is not allowed to touch this resource at all.
    #[error("{0}")]
    Forbidden(String),
    /// The identity provider rejected or failed the operation.
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Objects(#[from] ObjectError),
    /// Serialization glue failed; treated like any other upstream failure.
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn not_found(kind: EntityKind) -> Self {
        AppError::NotFound(kind)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into())
    }

    /// HTTP-style status for the response envelope.
    pub fn status(&self) -> u16 {
        match self {
            AppError::Validation(_) => 422,
            AppError::BadRequest(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Forbidden(_) => 403,
            AppError::Unauthorized(_) => 401,
            AppError::Store(_) | AppError::Index(_) | AppError::Objects(_) => 500,
            AppError::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

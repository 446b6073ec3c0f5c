use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error;
use std::fmt;

/// The primary error type for the application.
///
/// Every handler returns [`AppResult`]; the variant decides the HTTP status and the
/// `code` field of the JSON error envelope.
#[derive(Debug)]
pub enum AppError {
    /// Unexpected failures. The client only sees an error id.
    Internal(anyhow::Error),
    /// Client errors due to invalid requests.
    BadRequest(String),
    /// A requested entity does not exist (or is soft-deleted).
    NotFound(String),
    /// The database is temporarily unreachable.
    ServiceUnavailable(String),
    /// Unexpected persistence failures.
    Database(String),
    /// Malformed user input such as an empty search query.
    InvalidInput(String),
    /// A write was rejected by a database integrity rule (exclusion, foreign key, unique).
    Constraint(String),
    /// Missing or invalid bearer token.
    Unauthorized(String),
    /// Valid token without the required role.
    Forbidden(String),
    RateLimited {
        retry_after_seconds: u64,
    },
    /// A specific request field failed validation.
    ValidationError {
        field: String,
        message: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::Constraint(msg) => write!(f, "Constraint violation: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::RateLimited { retry_after_seconds } => {
                write!(f, "Rate limited. Retry after {} seconds", retry_after_seconds)
            }
            AppError::ValidationError { field, message } => {
                write!(f, "Validation error on field '{}': {}", field, message)
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_)
            | AppError::InvalidInput(_)
            | AppError::Constraint(_)
            | AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, error_message, details) = match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Internal error: {:?}", e);
                (
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::BadRequest(msg) => ("BAD_REQUEST", msg, None),
            AppError::NotFound(msg) => ("NOT_FOUND", msg, None),
            AppError::ServiceUnavailable(msg) => ("SERVICE_UNAVAILABLE", msg, None),
            AppError::Database(msg) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Database error: {}", msg);
                (
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::InvalidInput(msg) => ("INVALID_INPUT", msg, None),
            AppError::Constraint(msg) => ("CONSTRAINT_VIOLATION", msg, None),
            AppError::Unauthorized(msg) => ("UNAUTHORIZED", msg, None),
            AppError::Forbidden(msg) => ("FORBIDDEN", msg, None),
            AppError::RateLimited { retry_after_seconds } => (
                "RATE_LIMITED",
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds),
                Some(json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            AppError::ValidationError { field, message } => (
                "VALIDATION_ERROR",
                format!("Validation failed for field '{}': {}", field, message),
                Some(json!({ "field": field, "message": message })),
            ),
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            sqlx::Error::Database(db_err) => AppError::Database(db_err.message().to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// Converts a missing row into a `NotFound` error naming the entity.
pub trait OptionExt<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Field-level request validation helpers.
pub mod validation {
    use super::*;
    use uuid::Uuid;

    /// Parses a path guid. Unparsable guids are reported as a missing entity, matching
    /// how an unknown guid is reported.
    pub fn parse_guid(raw: &str, entity: &str) -> AppResult<Uuid> {
        Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound(format!("{} not found", entity)))
    }

    /// Parses a body guid; failure is a validation error on `field`.
    pub fn parse_field_guid(raw: &str, field: &str) -> AppResult<Uuid> {
        Uuid::parse_str(raw.trim()).map_err(|_| AppError::ValidationError {
            field: field.to_string(),
            message: format!("'{}' is not a valid guid", raw),
        })
    }

    pub fn require<T>(value: Option<T>, field: &str) -> AppResult<T> {
        value.ok_or_else(|| AppError::ValidationError {
            field: field.to_string(),
            message: "Missing required parameter".to_string(),
        })
    }

    pub fn require_non_empty(value: Option<String>, field: &str) -> AppResult<String> {
        match value {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(AppError::ValidationError {
                field: field.to_string(),
                message: "Missing required parameter".to_string(),
            }),
        }
    }
}

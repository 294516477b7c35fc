use std::error::Error;
use std::fmt::{self, Display};

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;

/// Result alias used across the service
pub type AppResult<T> = Result<T, AppError>;

/// A single rejected input field
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    /// Name of the offending field
    pub field: String,
    /// Human readable reason
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Error type for every service operation
#[derive(Debug)]
pub enum AppError {
    /// The request is missing data or breaks a business rule
    BadRequest(String),
    /// One or more fields failed validation
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },
    /// No valid session, or the session lacks the required role
    Unauthorized(String),
    /// The referenced record does not exist
    NotFound(String),
    /// A rate limit or cooldown is active
    TooManyRequests(String),
    /// The database rejected an operation
    Storage(String),
    /// Anything else that went wrong on our side
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    /// Message shown to the client
    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::NotFound(msg)
            | AppError::TooManyRequests(msg)
            | AppError::Storage(msg)
            | AppError::Internal(msg) => msg,
            AppError::Validation { message, .. } => message,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Validation { message, errors } => {
                write!(f, "Validation error: {} ({} field(s))", message, errors.len())
            }
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::TooManyRequests(msg) => write!(f, "Too many requests: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error for AppError {}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {}", err))
    }
}

impl From<BlockingError> for AppError {
    fn from(err: BlockingError) -> Self {
        AppError::Internal(format!("blocking task failed: {}", err))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Storage details stay in the log
        let message = match self {
            AppError::Storage(_) => "database operation failed",
            other => other.message(),
        };
        let errors = match self {
            AppError::Validation { errors, .. } => errors.clone(),
            _ => Vec::new(),
        };

        HttpResponse::build(status).json(json!({
            "success": false,
            "statusCode": status.as_u16(),
            "message": message,
            "errors": errors,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::TooManyRequests("x".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Storage("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_keeps_field_errors() {
        let err = AppError::Validation {
            message: "entered wrong value".to_string(),
            errors: vec![FieldError::new("password", "password must contain a number")],
        };
        assert_eq!(err.message(), "entered wrong value");
        assert_eq!(err.error_response().status(), StatusCode::BAD_REQUEST);
    }
}

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use sqlx::Error as SqlxError;
use std::env::VarError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Cannot move from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Phone number must be verified before checkout")]
    VerificationRequired,

    #[error("Password error: {0}")]
    PasswordError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Identity error: {0}")]
    IdentityError(String),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("SMS delivery failed: {0}")]
    SmsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] VarError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) | AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::VerificationRequired => StatusCode::PRECONDITION_REQUIRED,
            AppError::SmsError(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseError(_)
            | AppError::MigrationError(_)
            | AppError::PasswordError(_)
            | AppError::SessionError(_)
            | AppError::IdentityError(_)
            | AppError::TemplateError(_)
            | AppError::ConfigError(_)
            | AppError::IoError(_)
            | AppError::EnvVarError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // internals stay in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("{}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({ "success": false, "error": message }))
    }
}

impl From<AppError> for std::io::Error {
    fn from(err: AppError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}

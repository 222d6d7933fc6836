use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Uniform outcome for every credential failure (absent, malformed,
    /// expired, bad signature). Callers must not learn which check failed.
    #[error("invalid credential")]
    InvalidCredential,

    #[error("room access denied: {0}")]
    RoomAccessDenied(String),

    /// Covers both missing ids and notifications owned by someone else,
    /// so requesters cannot enumerate other users' notification ids.
    #[error("notification not found")]
    NotificationNotFound,

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(e.to_string())
    }
}

// NOTE: No need to implement From<AppError> for actix_web::Error
// because actix-web provides a blanket impl for all ResponseError types:
// impl<T: ResponseError + 'static> From<T> for actix_web::Error

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::InvalidCredential => 401,
            AppError::RoomAccessDenied(_) => 403,
            AppError::NotificationNotFound => 404,
            AppError::Config(_) | AppError::Database(_) | AppError::Internal => 500,
        }
    }

    /// Stable machine-readable code carried on WebSocket error events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidCredential => "invalid_credential",
            AppError::RoomAccessDenied(_) => "room_access_denied",
            AppError::NotificationNotFound => "not_found",
            AppError::Config(_) | AppError::Database(_) | AppError::Internal => "internal",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(ResponseError::status_code(self)).json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}

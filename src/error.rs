//! Единый тип ошибок HTTP-слоя.
//!
//! Каждый вид отказа (не найдено, валидация, конфликт мест, нехватка средств,
//! авторизация) имеет свой вариант и свой `error_type` в JSON-ответе, вместо
//! одной общей строки с текстом исключения.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Тело ответа с ошибкой: `{success: false, message, error_type}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    pub error_type: &'static str,
}

impl AppError {
    pub fn not_found(entity: &'static str) -> Self {
        AppError::NotFound { entity }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::InsufficientFunds(_) => "insufficient_funds",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Database(sqlx::Error::RowNotFound) => "not_found",
            AppError::Database(_) | AppError::Internal(_) => "internal",
        }
    }

    /// Сообщение для пользователя. Детали ошибок БД наружу не отдаются.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(sqlx::Error::RowNotFound) => "Resource not found".to_string(),
            AppError::Database(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            message: self.user_message(),
            error_type: self.error_type(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(err) => tracing::error!(error = %err, "database error"),
            AppError::Internal(msg) => tracing::error!(error = %msg, "internal error"),
            other => tracing::debug!(error = %other, "request rejected"),
        }

        (self.status(), Json(self.body())).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{field} {detail}")
            })
            .collect();
        fields.sort();
        AppError::Validation(fields.join("; "))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("password hashing failed: {err}"))
    }
}

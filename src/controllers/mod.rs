pub mod account;
pub mod admin;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod chat;
pub mod notifications;

use axum::{
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{AppError, AppResult};

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(catalog::routes())
        .merge(bookings::routes())
        .merge(account::routes())
        .merge(notifications::routes())
        .merge(chat::routes())
        .merge(admin::routes())
}

/* ---------- helpers ---------- */

/// AJAX-запрос: `X-Requested-With: XMLHttpRequest` или `Accept: application/json`.
pub fn wants_json(headers: &HeaderMap) -> bool {
    let xhr = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    xhr || accepts_json
}

/// Redirect (303) с flash-сообщением в query: `?success=...` или `?error=...`.
pub fn flash_redirect(path: &str, kind: &str, message: &str) -> Response {
    let query = serde_urlencoded::to_string([(kind, message)]).unwrap_or_default();
    let sep = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{path}{sep}{query}")).into_response()
}

/// Ответ формы: JSON для AJAX, иначе redirect с flash.
/// При успехе JSON дополняется полями `success` и `message`.
pub fn form_response(
    headers: &HeaderMap,
    back: &str,
    outcome: AppResult<(String, Value)>,
) -> Response {
    match (wants_json(headers), outcome) {
        (true, Ok((message, extra))) => {
            let mut body = json!({ "success": true, "message": message });
            if let (Some(body), Value::Object(extra)) = (body.as_object_mut(), extra) {
                body.extend(extra);
            }
            Json(body).into_response()
        }
        (true, Err(e)) => e.into_response(),
        (false, Ok((message, _))) => flash_redirect(back, "success", &message),
        (false, Err(e)) => {
            // Внутренние ошибки пишем в лог, пользователю - общий текст
            let message = e.user_message();
            if matches!(e, AppError::Database(_) | AppError::Internal(_)) {
                tracing::error!("form request failed: {}", e);
            }
            flash_redirect(back, "error", &message)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
}

impl ListQuery {
    pub fn filter(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1) as i64
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        Page {
            items,
            page,
            per_page,
            total,
            total_pages: ((total + per_page - 1) / per_page).max(1),
        }
    }
}

pub fn offset(page: i64, per_page: i64) -> i64 {
    (page.max(1) - 1) * per_page
}

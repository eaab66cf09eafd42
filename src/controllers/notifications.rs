use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::Notification,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/mark-read/{notification_id}", post(mark_read))
}

#[derive(Debug, Serialize)]
pub struct NotificationView {
    pub id: i64,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        NotificationView {
            id: n.id,
            message: n.message,
            is_read: n.is_read,
            created_at: n.created_at.format("%Y-%m-%d %H:%M").to_string(),
            kind: n.notification_type,
        }
    }
}

// GET /api/notifications
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let notifications: Vec<NotificationView> =
        Notification::list_for_user(&state.db.pool, user.user_id)
            .await?
            .into_iter()
            .map(NotificationView::from)
            .collect();
    Ok(Json(json!({ "notifications": notifications })))
}

// POST /api/notifications/mark-read/{id}
async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(notification_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    if !Notification::mark_read(&state.db.pool, notification_id, user.user_id).await? {
        return Err(AppError::not_found("Notification"));
    }
    Ok(Json(json!({ "success": true })))
}

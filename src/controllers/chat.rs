use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::{AuthUser, RequireAdvisor},
    models::{ChatMessage, User},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/support/advisors", get(advisors))
        .route("/api/advisors", get(advisors))
        .route("/support/chat", get(support_chat))
        .route("/support/chat/{advisor_id}", get(support_chat_with))
        .route("/api/chat/send", post(send_message))
        .route("/api/chat/get/{other_id}", get(get_messages))
        .route("/api/chat/unread", get(unread_count))
        .route("/advisor/dashboard", get(advisor_dashboard))
        .route("/advisor/chat/{user_id}", get(advisor_chat))
}

#[derive(Debug, Serialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_advisor: bool,
    pub last_seen: Option<NaiveDateTime>,
}

impl From<&User> for Contact {
    fn from(user: &User) -> Self {
        Contact {
            id: user.id,
            name: user.display_name(),
            email: user.email.clone(),
            is_advisor: user.is_advisor,
            last_seen: user.last_seen,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub text: String,
    pub timestamp: String,
    pub sender_id: i64,
    pub is_mine: bool,
}

fn message_view(message: ChatMessage, viewer_id: i64) -> MessageView {
    MessageView {
        id: message.id,
        timestamp: message.created_at.format("%H:%M").to_string(),
        is_mine: message.sender_id == viewer_id,
        sender_id: message.sender_id,
        text: message.message,
    }
}

/// Переписка с точки зрения `viewer_id`. Входящие от `other_id` помечаются прочитанными.
async fn read_conversation(
    state: &AppState,
    viewer_id: i64,
    other_id: i64,
) -> AppResult<Vec<MessageView>> {
    let messages = ChatMessage::conversation(&state.db.pool, viewer_id, other_id).await?;
    ChatMessage::mark_read_from(&state.db.pool, other_id, viewer_id).await?;
    Ok(messages.into_iter().map(|m| message_view(m, viewer_id)).collect())
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub partner: Contact,
    pub messages: Vec<MessageView>,
}

/* ---------- USER SIDE ---------- */

// GET /support/advisors
async fn advisors(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let advisors: Vec<Contact> = User::advisors(&state.db.pool)
        .await?
        .iter()
        .map(Contact::from)
        .collect();
    Ok(Json(json!({ "advisors": advisors })))
}

// GET /support/chat: консультант из последней переписки, иначе первый доступный
async fn support_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<Json<ChatResponse>> {
    let advisor = match ChatMessage::last_advisor_partner(&state.db.pool, user.user_id).await? {
        Some(id) => User::find_by_id(&state.db.pool, id).await?,
        None => User::advisors(&state.db.pool).await?.into_iter().next(),
    }
    .ok_or_else(|| AppError::not_found("Advisor"))?;

    let messages = read_conversation(&state, user.user_id, advisor.id).await?;
    Ok(Json(ChatResponse { partner: Contact::from(&advisor), messages }))
}

// GET /support/chat/{advisor_id}
async fn support_chat_with(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(advisor_id): Path<i64>,
) -> AppResult<Json<ChatResponse>> {
    let advisor = User::find_by_id(&state.db.pool, advisor_id)
        .await?
        .filter(|u| u.is_advisor || u.is_superuser)
        .ok_or_else(|| AppError::not_found("Advisor"))?;

    let messages = read_conversation(&state, user.user_id, advisor.id).await?;
    Ok(Json(ChatResponse { partner: Contact::from(&advisor), messages }))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: Option<i64>,
    pub message: Option<String>,
}

// POST /api/chat/send
async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<impl IntoResponse> {
    let text = req.message.as_deref().map(str::trim).unwrap_or_default();
    let receiver_id = match req.receiver_id {
        Some(id) if !text.is_empty() => id,
        _ => return Err(AppError::Validation("Missing data".to_string())),
    };

    let receiver = User::find_by_id(&state.db.pool, receiver_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let message = ChatMessage::create(&state.db.pool, user.user_id, receiver.id, text).await?;
    tracing::debug!("Message {} from {} to {}", message.id, user.user_id, receiver.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": message_view(message, user.user_id),
        })),
    ))
}

// GET /api/chat/get/{other_id}
async fn get_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(other_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let messages = read_conversation(&state, user.user_id, other_id).await?;
    Ok(Json(json!({ "messages": messages })))
}

// GET /api/chat/unread
async fn unread_count(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let count = ChatMessage::unread_count(&state.db.pool, user.user_id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

/* ---------- ADVISOR SIDE ---------- */

// GET /advisor/dashboard
async fn advisor_dashboard(
    State(state): State<Arc<AppState>>,
    RequireAdvisor(advisor): RequireAdvisor,
) -> AppResult<impl IntoResponse> {
    let users: Vec<Contact> = ChatMessage::chat_participants(&state.db.pool, advisor.user_id)
        .await?
        .iter()
        .map(Contact::from)
        .collect();
    let unread = ChatMessage::unread_count(&state.db.pool, advisor.user_id).await?;
    Ok(Json(json!({ "users": users, "unread_count": unread })))
}

// GET /advisor/chat/{user_id}
async fn advisor_chat(
    State(state): State<Arc<AppState>>,
    RequireAdvisor(advisor): RequireAdvisor,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ChatResponse>> {
    let user = User::find_by_id(&state.db.pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let messages = read_conversation(&state, advisor.user_id, user.id).await?;
    Ok(Json(ChatResponse { partner: Contact::from(&user), messages }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn message_view_marks_own_messages() {
        let msg = ChatMessage {
            id: 5,
            sender_id: 2,
            receiver_id: 9,
            message: "Hello".into(),
            is_read: false,
            created_at: NaiveDate::from_ymd_opt(2026, 3, 4)
                .unwrap()
                .and_hms_opt(14, 7, 59)
                .unwrap(),
        };
        let mine = message_view(msg.clone(), 2);
        assert!(mine.is_mine);
        assert_eq!(mine.timestamp, "14:07");
        assert!(!message_view(msg, 9).is_mine);
    }
}

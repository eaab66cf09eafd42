use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use super::user::User;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

impl ChatMessage {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        sender_id: i64,
        receiver_id: i64,
        message: &str,
    ) -> Result<ChatMessage, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(
            "INSERT INTO chat_messages (sender_id, receiver_id, message) \
             VALUES ($1, $2, $3) \
             RETURNING id, sender_id, receiver_id, message, is_read, created_at",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(message)
        .fetch_one(executor)
        .await
    }

    /// Переписка двух пользователей в хронологическом порядке.
    pub async fn conversation<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        other_id: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(
            "SELECT id, sender_id, receiver_id, message, is_read, created_at \
             FROM chat_messages \
             WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
             ORDER BY created_at, id",
        )
        .bind(user_id)
        .bind(other_id)
        .fetch_all(executor)
        .await
    }

    /// Помечает входящие от `sender_id` сообщения прочитанными.
    pub async fn mark_read_from<'e, E: PgExecutor<'e>>(
        executor: E,
        sender_id: i64,
        receiver_id: i64,
    ) -> Result<u64, sqlx::Error> {
        sqlx::query(
            "UPDATE chat_messages SET is_read = TRUE \
             WHERE sender_id = $1 AND receiver_id = $2 AND is_read = FALSE",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .execute(executor)
        .await
        .map(|r| r.rows_affected())
    }

    pub async fn unread_count<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chat_messages WHERE receiver_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(executor)
        .await
    }

    /// Пользователи, участвовавшие хоть в одной переписке, кроме `exclude_id`.
    pub async fn chat_participants<'e, E: PgExecutor<'e>>(
        executor: E,
        exclude_id: i64,
    ) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT u.id, u.customer_id, u.email, u.password_hash, u.first_name, u.last_name, \
                    u.address, u.city, u.zip_code, u.phone, u.balance, u.is_active, \
                    u.is_superuser, u.is_advisor, u.date_joined, u.last_seen \
             FROM users u \
             WHERE u.id <> $1 \
               AND EXISTS (SELECT 1 FROM chat_messages m \
                           WHERE m.sender_id = u.id OR m.receiver_id = u.id) \
             ORDER BY u.id",
        )
        .bind(exclude_id)
        .fetch_all(executor)
        .await
    }

    /// Собеседник-консультант из последней переписки пользователя.
    pub async fn last_advisor_partner<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT CASE WHEN m.sender_id = $1 THEN m.receiver_id ELSE m.sender_id END
            FROM chat_messages m
            JOIN users s ON s.id = m.sender_id
            JOIN users r ON r.id = m.receiver_id
            WHERE (m.sender_id = $1 OR m.receiver_id = $1)
              AND (s.is_advisor OR r.is_advisor)
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }
}

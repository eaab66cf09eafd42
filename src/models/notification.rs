use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

pub const BOOKING_SUCCESS: &str = "booking_success";
pub const BOOKING_CANCELLED: &str = "booking_cancelled";
pub const DEPOSIT: &str = "deposit";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub is_read: bool,
    pub notification_type: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Notification {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        message: &str,
        notification_type: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO notifications (user_id, message, notification_type) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id)
        .bind(message)
        .bind(notification_type)
        .fetch_one(executor)
        .await
    }

    pub async fn list_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Vec<Notification>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, message, is_read, notification_type, created_at \
             FROM notifications WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// false, если уведомление не найдено или принадлежит другому пользователю.
    pub async fn mark_read<'e, E: PgExecutor<'e>>(
        executor: E,
        notification_id: i64,
        user_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(executor)
            .await
            .map(|r| r.rows_affected() > 0)
    }
}

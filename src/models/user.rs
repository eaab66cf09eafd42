use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

const USER_COLUMNS: &str = "id, customer_id, email, password_hash, first_name, last_name, \
     address, city, zip_code, phone, balance, is_active, is_superuser, is_advisor, \
     date_joined, last_seen";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub customer_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub phone: Option<String>,
    pub balance: Decimal,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_advisor: bool,
    pub date_joined: NaiveDateTime,
    pub last_seen: Option<NaiveDateTime>,
}

/// Данные для создания пользователя (регистрация, создание консультанта).
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub is_advisor: bool,
}

/// Изменяемые поля профиля.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }

    // Найти пользователя по id
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }

    // Найти пользователя по email (без учета регистра)
    pub async fn find_by_email<'e, E: PgExecutor<'e>>(
        executor: E,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    /// Блокирует строку пользователя до конца транзакции. Все изменения
    /// баланса проходят через эту блокировку.
    pub async fn lock_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn email_taken<'e, E: PgExecutor<'e>>(
        executor: E,
        email: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND id <> COALESCE($2, 0))",
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(executor)
        .await
    }

    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        new: &NewUser,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (customer_id, email, password_hash, first_name, last_name, \
                 address, city, zip_code, phone, is_active, is_advisor) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(generate_customer_id())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.address)
        .bind(&new.city)
        .bind(&new.zip_code)
        .bind(&new.phone)
        .bind(new.is_active)
        .bind(new.is_advisor)
        .fetch_one(executor)
        .await
    }

    pub async fn update_profile<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET first_name = $2, last_name = $3, email = $4, phone = $5, \
                 city = $6, address = $7, zip_code = $8 \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.email)
        .bind(&update.phone)
        .bind(&update.city)
        .bind(&update.address)
        .bind(&update.zip_code)
        .fetch_one(executor)
        .await
    }

    pub async fn set_password<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Возвращает true, если аккаунт был неактивен и теперь активирован.
    pub async fn activate<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query("UPDATE users SET is_active = TRUE WHERE id = $1 AND is_active = FALSE")
            .bind(user_id)
            .execute(executor)
            .await
            .map(|r| r.rows_affected() > 0)
    }

    pub async fn touch_last_seen<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_seen = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Изменяет баланс на `delta` (отрицательное значение - списание)
    /// и возвращает новый баланс.
    pub async fn adjust_balance<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        delta: Decimal,
    ) -> Result<Decimal, sqlx::Error> {
        sqlx::query_scalar::<_, Decimal>(
            "UPDATE users SET balance = balance + $2 WHERE id = $1 RETURNING balance",
        )
        .bind(user_id)
        .bind(delta)
        .fetch_one(executor)
        .await
    }

    /// Удаляет пользователя. Брони, уведомления и сообщения удаляются каскадно.
    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(executor)
            .await
            .map(|r| r.rows_affected() > 0)
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        email_filter: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE ($1::text IS NULL OR email ILIKE '%' || $1 || '%')",
        )
        .bind(email_filter)
        .fetch_one(executor)
        .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        email_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::text IS NULL OR email ILIKE '%' || $1 || '%') \
             ORDER BY id \
             LIMIT $2 OFFSET $3"
        ))
        .bind(email_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
    }

    /// Консультанты поддержки. Если их нет - суперпользователи.
    pub async fn advisors<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE is_advisor \
                OR (is_superuser AND NOT EXISTS (SELECT 1 FROM users WHERE is_advisor)) \
             ORDER BY id"
        ))
        .fetch_all(executor)
        .await
    }
}

// Публичный идентификатор клиента: 10 символов A-Z0-9
fn generate_customer_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .to_uppercase()
        .chars()
        .take(10)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_id_is_ten_uppercase_alphanumerics() {
        let id = generate_customer_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}

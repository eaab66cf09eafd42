use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};

use super::catalog::Showing;

// Места собираются из booking_seats в строку "A1,A2" в порядке выбора
const BOOKING_SELECT: &str = r#"
    SELECT b.id, b.user_id, b.catalog_item_id, b.item_title, b.show_date, b.show_time,
           COALESCE(string_agg(s.seat_label, ',' ORDER BY s.position), '') AS seats,
           b.created_at
    FROM bookings b
    LEFT JOIN booking_seats s ON s.booking_id = b.id
"#;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub catalog_item_id: Option<i64>,
    pub item_title: String,
    pub show_date: NaiveDate,
    pub show_time: String,
    pub seats: String,
    pub created_at: NaiveDateTime,
}

impl Booking {
    pub fn seat_labels(&self) -> Vec<&str> {
        self.seats
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn seat_count(&self) -> usize {
        self.seat_labels().len()
    }
}

/// Строка бронирования для админских таблиц.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BookingWithUser {
    pub id: i64,
    pub user_id: i64,
    pub user_email: String,
    pub catalog_item_id: Option<i64>,
    pub item_title: String,
    pub show_date: NaiveDate,
    pub show_time: String,
    pub seats: String,
    pub created_at: NaiveDateTime,
}

/// Факт бронирования для отчетов: текущая цена позиции и число мест.
#[derive(Debug, Clone, FromRow)]
pub struct BookingFact {
    pub booking_id: i64,
    pub user_id: i64,
    pub user_email: String,
    pub user_name: String,
    pub catalog_item_id: Option<i64>,
    pub item_title: String,
    pub current_price: Option<Decimal>,
    pub seat_count: i64,
    pub created_at: NaiveDateTime,
}

impl Booking {
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        booking_id: i64,
    ) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(&format!(
            "{BOOKING_SELECT} WHERE b.id = $1 GROUP BY b.id"
        ))
        .bind(booking_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        booking_id: i64,
        user_id: i64,
    ) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(&format!(
            "{BOOKING_SELECT} WHERE b.id = $1 AND b.user_id = $2 GROUP BY b.id"
        ))
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Блокирует бронь пользователя до конца транзакции.
    pub async fn lock_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        booking_id: i64,
        user_id: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM bookings WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
    ) -> Result<Vec<Booking>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(&format!(
            "{BOOKING_SELECT} WHERE b.user_id = $1 GROUP BY b.id ORDER BY b.created_at DESC, b.id DESC"
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Занятые места на сеансе позиции каталога.
    pub async fn booked_seats<'e, E: PgExecutor<'e>>(
        executor: E,
        item_id: i64,
        showing: &Showing,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT seat_label FROM booking_seats \
             WHERE catalog_item_id = $1 AND show_date = $2 AND show_time = $3 \
             ORDER BY booking_id, position",
        )
        .bind(item_id)
        .bind(showing.date)
        .bind(&showing.time)
        .fetch_all(executor)
        .await
    }

    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: i64,
        item_id: i64,
        item_title: &str,
        showing: &Showing,
    ) -> Result<(i64, NaiveDateTime), sqlx::Error> {
        sqlx::query_as::<_, (i64, NaiveDateTime)>(
            "INSERT INTO bookings (user_id, catalog_item_id, item_title, show_date, show_time) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, created_at",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(item_title)
        .bind(showing.date)
        .bind(&showing.time)
        .fetch_one(executor)
        .await
    }

    /// Занимает одно место. Уникальный индекс сеанса отклоняет повтор.
    pub async fn insert_seat<'e, E: PgExecutor<'e>>(
        executor: E,
        booking_id: i64,
        item_id: i64,
        showing: &Showing,
        seat_label: &str,
        position: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO booking_seats \
                 (booking_id, catalog_item_id, show_date, show_time, seat_label, position) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(booking_id)
        .bind(item_id)
        .bind(showing.date)
        .bind(&showing.time)
        .bind(seat_label)
        .bind(position)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        booking_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(executor)
            .await
            .map(|r| r.rows_affected() > 0)
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        title_filter: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings \
             WHERE ($1::text IS NULL OR item_title ILIKE '%' || $1 || '%')",
        )
        .bind(title_filter)
        .fetch_one(executor)
        .await
    }

    pub async fn list_with_users<'e, E: PgExecutor<'e>>(
        executor: E,
        title_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BookingWithUser>, sqlx::Error> {
        sqlx::query_as::<_, BookingWithUser>(
            r#"
            SELECT b.id, b.user_id, u.email AS user_email, b.catalog_item_id, b.item_title,
                   b.show_date, b.show_time,
                   COALESCE(string_agg(s.seat_label, ',' ORDER BY s.position), '') AS seats,
                   b.created_at
            FROM bookings b
            JOIN users u ON u.id = b.user_id
            LEFT JOIN booking_seats s ON s.booking_id = b.id
            WHERE ($1::text IS NULL OR b.item_title ILIKE '%' || $1 || '%')
            GROUP BY b.id, u.email
            ORDER BY b.created_at DESC, b.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(title_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
    }

    /// Все брони с текущей ценой позиции - основа для отчетов.
    pub async fn facts<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<BookingFact>, sqlx::Error> {
        sqlx::query_as::<_, BookingFact>(
            r#"
            SELECT b.id AS booking_id,
                   b.user_id,
                   u.email AS user_email,
                   TRIM(u.first_name || ' ' || u.last_name) AS user_name,
                   b.catalog_item_id,
                   b.item_title,
                   c.price AS current_price,
                   (SELECT COUNT(*) FROM booking_seats s WHERE s.booking_id = b.id) AS seat_count,
                   b.created_at
            FROM bookings b
            JOIN users u ON u.id = b.user_id
            LEFT JOIN catalog_items c ON c.id = b.catalog_item_id
            ORDER BY b.created_at, b.id
            "#,
        )
        .fetch_all(executor)
        .await
    }

    /// Все проданные места по позициям каталога: (item_id, seat_label).
    pub async fn seats_by_item<'e, E: PgExecutor<'e>>(
        executor: E,
    ) -> Result<Vec<(i64, String)>, sqlx::Error> {
        sqlx::query_as::<_, (i64, String)>(
            "SELECT catalog_item_id, seat_label FROM booking_seats \
             WHERE catalog_item_id IS NOT NULL \
             ORDER BY booking_id, position",
        )
        .fetch_all(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn seat_count_ignores_blank_labels() {
        let booking = Booking {
            id: 1,
            user_id: 1,
            catalog_item_id: Some(1),
            item_title: "Cold Play".into(),
            show_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            show_time: "20:00".into(),
            seats: "A1, A2,,".into(),
            created_at: NaiveDate::from_ymd_opt(2026, 4, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
        };
        assert_eq!(booking.seat_labels(), vec!["A1", "A2"]);
        assert_eq!(booking.seat_count(), 2);
    }
}

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use validator::{Validate, ValidationError};

const ITEM_COLUMNS: &str =
    "id, title, genre, duration, category, description, poster, price, scheduled_at";

/// Фильм, концерт или спектакль с единственным сеансом.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub title: String,
    pub genre: Option<String>,
    pub duration: String,
    pub category: String,
    pub description: Option<String>,
    pub poster: Option<String>,
    pub price: Decimal,
    pub scheduled_at: NaiveDateTime,
}

/// Сеанс: дата и время показа в формате `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Showing {
    pub date: NaiveDate,
    pub time: String,
}

impl CatalogItem {
    pub fn showing(&self) -> Showing {
        Showing {
            date: self.scheduled_at.date(),
            time: self.scheduled_at.format("%H:%M").to_string(),
        }
    }
}

/// Форма создания/редактирования позиции каталога.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CatalogItemInput {
    #[validate(length(min = 1, max = 255, message = "must not be empty"))]
    pub title: String,
    #[validate(length(max = 100))]
    pub genre: Option<String>,
    #[serde(default)]
    #[validate(length(max = 50))]
    pub duration: String,
    #[validate(length(min = 1, max = 100, message = "must not be empty"))]
    pub category: String,
    pub description: Option<String>,
    #[validate(length(max = 500))]
    pub poster: Option<String>,
    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,
    pub scheduled_at: NaiveDateTime,
}

/// Верхняя граница `NUMERIC(8,2)`.
pub const MAX_PRICE: Decimal = Decimal::from_parts(99_999_999, 0, 0, false, 2);

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    let (code, message) = if price.is_sign_negative() && !price.is_zero() {
        ("negative_price", "must not be negative")
    } else if *price > MAX_PRICE {
        ("price_too_large", "must not exceed 999999.99")
    } else if price.normalize().scale() > 2 {
        ("price_precision", "must have at most two decimal places")
    } else {
        return Ok(());
    };
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    Err(err)
}

impl CatalogItem {
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        item_id: i64,
    ) -> Result<Option<CatalogItem>, sqlx::Error> {
        sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items WHERE id = $1"
        ))
        .bind(item_id)
        .fetch_optional(executor)
        .await
    }

    /// Как `find`, но держит разделяемую блокировку до конца транзакции,
    /// чтобы цена и расписание не поменялись посреди бронирования.
    pub async fn find_for_share<'e, E: PgExecutor<'e>>(
        executor: E,
        item_id: i64,
    ) -> Result<Option<CatalogItem>, sqlx::Error> {
        sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items WHERE id = $1 FOR SHARE"
        ))
        .bind(item_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn all<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<CatalogItem>, sqlx::Error> {
        sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items ORDER BY scheduled_at DESC, id DESC"
        ))
        .fetch_all(executor)
        .await
    }

    /// Позиции одной категории без учета регистра, новые первыми.
    pub async fn by_category<'e, E: PgExecutor<'e>>(
        executor: E,
        category: &str,
        limit: Option<i64>,
    ) -> Result<Vec<CatalogItem>, sqlx::Error> {
        sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items \
             WHERE LOWER(category) = LOWER($1) \
             ORDER BY id DESC \
             LIMIT $2"
        ))
        .bind(category)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    pub async fn count<'e, E: PgExecutor<'e>>(
        executor: E,
        title_filter: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM catalog_items \
             WHERE ($1::text IS NULL OR title ILIKE '%' || $1 || '%')",
        )
        .bind(title_filter)
        .fetch_one(executor)
        .await
    }

    pub async fn list<'e, E: PgExecutor<'e>>(
        executor: E,
        title_filter: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CatalogItem>, sqlx::Error> {
        sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM catalog_items \
             WHERE ($1::text IS NULL OR title ILIKE '%' || $1 || '%') \
             ORDER BY id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(title_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(executor)
        .await
    }

    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CatalogItemInput,
    ) -> Result<CatalogItem, sqlx::Error> {
        sqlx::query_as::<_, CatalogItem>(&format!(
            "INSERT INTO catalog_items \
                 (title, genre, duration, category, description, poster, price, scheduled_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(input.title.trim())
        .bind(&input.genre)
        .bind(&input.duration)
        .bind(input.category.trim())
        .bind(&input.description)
        .bind(&input.poster)
        .bind(input.price)
        .bind(input.scheduled_at)
        .fetch_one(executor)
        .await
    }

    pub async fn update<'e, E: PgExecutor<'e>>(
        executor: E,
        item_id: i64,
        input: &CatalogItemInput,
    ) -> Result<Option<CatalogItem>, sqlx::Error> {
        sqlx::query_as::<_, CatalogItem>(&format!(
            "UPDATE catalog_items SET title = $2, genre = $3, duration = $4, category = $5, \
                 description = $6, poster = $7, price = $8, scheduled_at = $9 \
             WHERE id = $1 \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item_id)
        .bind(input.title.trim())
        .bind(&input.genre)
        .bind(&input.duration)
        .bind(input.category.trim())
        .bind(&input.description)
        .bind(&input.poster)
        .bind(input.price)
        .bind(input.scheduled_at)
        .fetch_optional(executor)
        .await
    }

    /// Удаляет позицию. Брони остаются, ссылка на позицию обнуляется.
    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        item_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query("DELETE FROM catalog_items WHERE id = $1")
            .bind(item_id)
            .execute(executor)
            .await
            .map(|r| r.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn input(price: Decimal) -> CatalogItemInput {
        CatalogItemInput {
            title: "Echoes of Light".into(),
            genre: Some("Drama".into()),
            duration: "1h 55m".into(),
            category: "Movie".into(),
            description: None,
            poster: None,
            price,
            scheduled_at: NaiveDate::from_ymd_opt(2026, 11, 2)
                .unwrap()
                .and_hms_opt(19, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn showing_uses_hours_and_minutes() {
        let i = input(Decimal::from(500));
        let item = CatalogItem {
            id: 1,
            title: i.title,
            genre: i.genre,
            duration: i.duration,
            category: i.category,
            description: None,
            poster: None,
            price: i.price,
            scheduled_at: i.scheduled_at,
        };
        let showing = item.showing();
        assert_eq!(showing.date, NaiveDate::from_ymd_opt(2026, 11, 2).unwrap());
        assert_eq!(showing.time, "19:30");
    }

    #[test]
    fn negative_price_is_rejected() {
        assert!(input(Decimal::new(-1, 2)).validate().is_err());
        assert!(input(Decimal::ZERO).validate().is_ok());
        assert!(input(Decimal::from(1500)).validate().is_ok());
    }

    #[test]
    fn price_must_fit_the_column() {
        assert!(input(Decimal::new(999_999_99, 2)).validate().is_ok());
        assert!(input(Decimal::from(1_000_000)).validate().is_err());
        assert!(input(Decimal::new(10_005, 3)).validate().is_err());
        assert!(input(Decimal::new(10_500, 3)).validate().is_ok());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut i = input(Decimal::from(10));
        i.title = String::new();
        let errors = i.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("title"));
    }
}

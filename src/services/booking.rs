//! booking.rs
//!
//! Бронирование мест и отмена брони.
//!
//! Проверка конфликтов мест, проверка баланса и все записи выполняются в
//! одной транзакции:
//! - строка пользователя блокируется `FOR UPDATE`, поэтому списания одного
//!   пользователя идут строго по очереди;
//! - каждое место - отдельная строка `booking_seats` с уникальным индексом
//!   по сеансу, поэтому два параллельных запроса на одно место не пройдут
//!   оба: второй получит нарушение уникальности и откатится;
//! - любой ранний выход (`?` или `return Err`) роняет транзакцию, sqlx
//!   откатывает ее в `Drop`.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::{
    database::{is_numeric_overflow, is_unique_violation},
    error::{AppError, AppResult},
    models::{notification, Booking, CatalogItem, Notification, User},
};

/// Длина `booking_seats.seat_label`.
pub const MAX_SEAT_LABEL_LEN: usize = 20;

/// Непустой набор мест без повторов, в порядке выбора.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatSelection(Vec<String>);

impl SeatSelection {
    /// Разбирает строку вида "A1, A2": запятая - разделитель, пробелы
    /// по краям обрезаются, пустые метки отбрасываются.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let labels: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        if labels.is_empty() {
            return Err(AppError::Validation("Please select at least one seat.".to_string()));
        }

        if let Some(long) = labels.iter().find(|l| l.chars().count() > MAX_SEAT_LABEL_LEN) {
            return Err(AppError::Validation(format!(
                "Seat label is too long (max {} characters): {}",
                MAX_SEAT_LABEL_LEN, long
            )));
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = labels
            .iter()
            .filter(|label| !seen.insert(label.as_str()))
            .map(String::as_str)
            .collect();
        if !duplicates.is_empty() {
            return Err(AppError::Validation(format!(
                "Seat(s) selected more than once: {}",
                duplicates.join(", ")
            )));
        }

        Ok(SeatSelection(labels))
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn joined(&self) -> String {
        self.0.join(",")
    }

    /// Места из выбора, уже занятые на сеансе, в порядке выбора.
    pub fn conflicts_with(&self, occupied: &HashSet<String>) -> Vec<String> {
        self.0
            .iter()
            .filter(|label| occupied.contains(label.as_str()))
            .cloned()
            .collect()
    }
}

pub fn total_cost(price: Decimal, seat_count: usize) -> Decimal {
    price * Decimal::from(seat_count as u64)
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub booking_id: i64,
    pub item_id: i64,
    pub item_title: String,
    pub show_date: NaiveDate,
    pub show_time: String,
    pub seats: String,
    pub total_cost: Decimal,
    pub new_balance: Decimal,
}

impl BookingReceipt {
    pub fn message(&self) -> String {
        format!("Booking successful! KSH {} deducted.", self.total_cost)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationReceipt {
    pub booking_id: i64,
    pub item_id: Option<i64>,
    pub item_title: String,
    pub seats: String,
    pub refund: Decimal,
    pub new_balance: Decimal,
}

impl CancellationReceipt {
    pub fn message(&self) -> String {
        format!(
            "Booking cancelled. KSH {} has been refunded to your account.",
            self.refund
        )
    }
}

/// Бронирует места на единственный сеанс позиции каталога.
pub async fn create_booking(
    pool: &PgPool,
    user_id: i64,
    item_id: i64,
    raw_seats: &str,
) -> AppResult<BookingReceipt> {
    let mut tx = pool.begin().await?;

    // 1. Позиция каталога
    let item = CatalogItem::find_for_share(&mut *tx, item_id)
        .await?
        .ok_or_else(|| AppError::not_found("Catalog item"))?;

    // 2. Сеанс
    let showing = item.showing();

    let seats = SeatSelection::parse(raw_seats)?;

    let user = User::lock_for_update(&mut *tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    // 3-4. Конфликты с уже занятыми местами
    let occupied: HashSet<String> = Booking::booked_seats(&mut *tx, item.id, &showing)
        .await?
        .into_iter()
        .collect();
    let conflicts = seats.conflicts_with(&occupied);
    if !conflicts.is_empty() {
        return Err(AppError::Conflict(format!(
            "Seat(s) already booked: {}",
            conflicts.join(", ")
        )));
    }

    // 5-6. Стоимость и баланс
    let total = total_cost(item.price, seats.len());
    if user.balance < total {
        return Err(AppError::InsufficientFunds(format!(
            "Insufficient funds. Cost: KSH {}, Balance: KSH {}",
            total, user.balance
        )));
    }

    // 7. Списание
    let new_balance = User::adjust_balance(&mut *tx, user.id, -total).await?;

    // 8. Бронь и места
    let (booking_id, _created_at) =
        Booking::insert(&mut *tx, user.id, item.id, &item.title, &showing).await?;

    // Вставка в порядке меток: встречные брони ждут друг друга, а не дедлочат
    let mut ordered: Vec<(usize, &String)> = seats.labels().iter().enumerate().collect();
    ordered.sort_by(|a, b| a.1.cmp(b.1));
    for (position, label) in ordered {
        let inserted =
            Booking::insert_seat(&mut *tx, booking_id, item.id, &showing, label, position as i32)
                .await;
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                warn!(
                    "Seat {} for item {} was taken concurrently, booking rolled back",
                    label, item.id
                );
                return Err(AppError::Conflict(format!("Seat(s) already booked: {}", label)));
            }
            return Err(e.into());
        }
    }

    // 9. Уведомление
    let joined = seats.joined();
    Notification::create(
        &mut *tx,
        user.id,
        &format!(
            "Booking confirmed for {} on {} at {}. Seats: {}",
            item.title, showing.date, showing.time, joined
        ),
        notification::BOOKING_SUCCESS,
    )
    .await?;

    tx.commit().await?;

    info!(
        "Booking {} created: user {} item {} seats [{}] total {}",
        booking_id, user.id, item.id, joined, total
    );

    Ok(BookingReceipt {
        booking_id,
        item_id: item.id,
        item_title: item.title,
        show_date: showing.date,
        show_time: showing.time,
        seats: joined,
        total_cost: total,
        new_balance,
    })
}

/// Отменяет бронь владельца и возвращает деньги по ТЕКУЩЕЙ цене позиции.
/// Если позиция удалена, возврат нулевой.
pub async fn cancel_booking(
    pool: &PgPool,
    user_id: i64,
    booking_id: i64,
) -> AppResult<CancellationReceipt> {
    let mut tx = pool.begin().await?;

    Booking::lock_for_user(&mut *tx, booking_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking"))?;
    let booking = Booking::find(&mut *tx, booking_id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking"))?;

    let user = User::lock_for_update(&mut *tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let current_price = match booking.catalog_item_id {
        Some(item_id) => CatalogItem::find(&mut *tx, item_id).await?.map(|item| item.price),
        None => None,
    };
    let refund = current_price
        .map(|price| total_cost(price, booking.seat_count()))
        .unwrap_or(Decimal::ZERO);

    let new_balance = if refund.is_zero() {
        user.balance
    } else {
        User::adjust_balance(&mut *tx, user.id, refund).await?
    };

    Booking::delete(&mut *tx, booking.id).await?;

    Notification::create(
        &mut *tx,
        user.id,
        &format!(
            "Booking for {} on {} at {} cancelled. KSH {} refunded.",
            booking.item_title, booking.show_date, booking.show_time, refund
        ),
        notification::BOOKING_CANCELLED,
    )
    .await?;

    tx.commit().await?;

    info!(
        "Booking {} cancelled by user {}, refund {}",
        booking.id, user.id, refund
    );

    Ok(CancellationReceipt {
        booking_id: booking.id,
        item_id: booking.catalog_item_id,
        item_title: booking.item_title,
        seats: booking.seats,
        refund,
        new_balance,
    })
}

/// Снятие брони администратором: без возврата денег. При `notify_owner`
/// владельцу пишется уведомление в той же транзакции.
pub async fn remove_booking(
    pool: &PgPool,
    booking_id: i64,
    notify_owner: bool,
) -> AppResult<Booking> {
    let mut tx = pool.begin().await?;

    let booking = Booking::find(&mut *tx, booking_id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking"))?;
    // Параллельное удаление уже забрало бронь
    if !Booking::delete(&mut *tx, booking.id).await? {
        return Err(AppError::not_found("Booking"));
    }

    if notify_owner {
        Notification::create(
            &mut *tx,
            booking.user_id,
            &format!(
                "Your booking for {} on {} at {} was cancelled by an administrator.",
                booking.item_title, booking.show_date, booking.show_time
            ),
            notification::BOOKING_CANCELLED,
        )
        .await?;
    }

    tx.commit().await?;
    Ok(booking)
}

/// Сумма пополнения: положительная, не больше двух знаков после запятой
/// (баланс хранится в `NUMERIC(10,2)`).
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount.normalize().scale() <= 2
}

/// Пополнение баланса.
pub async fn deposit(pool: &PgPool, user_id: i64, amount: Decimal) -> AppResult<Decimal> {
    if !is_valid_amount(amount) {
        return Err(AppError::Validation("Invalid amount.".to_string()));
    }

    let mut tx = pool.begin().await?;
    User::lock_for_update(&mut *tx, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let new_balance = User::adjust_balance(&mut *tx, user_id, amount)
        .await
        .map_err(|e| {
            if is_numeric_overflow(&e) {
                AppError::Validation("Deposit exceeds the maximum account balance.".to_string())
            } else {
                e.into()
            }
        })?;
    Notification::create(
        &mut *tx,
        user_id,
        &format!("KSH {} deposited to your balance.", amount),
        notification::DEPOSIT,
    )
    .await?;
    tx.commit().await?;

    info!("User {} deposited {}, balance {}", user_id, amount, new_balance);
    Ok(new_balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_trims_and_drops_blanks() {
        let seats = SeatSelection::parse(" A1 , A2,, ").unwrap();
        assert_eq!(seats.labels(), ["A1", "A2"]);
        assert_eq!(seats.joined(), "A1,A2");
        assert_eq!(seats.len(), 2);
    }

    #[test]
    fn empty_selection_is_rejected() {
        for raw in ["", "   ", ",,", " , "] {
            assert!(matches!(
                SeatSelection::parse(raw),
                Err(AppError::Validation(msg)) if msg == "Please select at least one seat."
            ));
        }
    }

    #[test]
    fn repeated_seat_is_rejected() {
        assert!(matches!(
            SeatSelection::parse("A1,B2,A1"),
            Err(AppError::Validation(msg)) if msg.ends_with("A1")
        ));
    }

    #[test]
    fn overlong_label_is_rejected() {
        assert!(matches!(
            SeatSelection::parse("A1,BALCONY-LEFT-ROW-12-SEAT-4"),
            Err(AppError::Validation(msg)) if msg.ends_with("BALCONY-LEFT-ROW-12-SEAT-4")
        ));
        let edge = "X".repeat(MAX_SEAT_LABEL_LEN);
        assert_eq!(SeatSelection::parse(&edge).unwrap().labels(), [edge.as_str()]);
    }

    #[test]
    fn conflicts_keep_request_order() {
        let seats = SeatSelection::parse("C3,A2,B1").unwrap();
        let occupied: HashSet<String> = ["A2", "C3", "Z9"].iter().map(|s| s.to_string()).collect();
        assert_eq!(seats.conflicts_with(&occupied), vec!["C3", "A2"]);
    }

    #[test]
    fn total_is_price_times_seats() {
        assert_eq!(total_cost(Decimal::from(500), 2), Decimal::from(1000));
        assert_eq!(total_cost(Decimal::new(12_50, 2), 3), Decimal::new(37_50, 2));
        assert_eq!(total_cost(Decimal::from(500), 0), Decimal::ZERO);
    }

    #[test]
    fn amount_fits_balance_column() {
        assert!(is_valid_amount(Decimal::new(250_50, 2)));
        assert!(is_valid_amount(Decimal::new(1_000, 3)));
        assert!(!is_valid_amount(Decimal::new(1, 3)));
        assert!(!is_valid_amount(Decimal::ZERO));
        assert!(!is_valid_amount(Decimal::from(-5)));
    }

    #[test]
    fn receipt_messages() {
        let receipt = CancellationReceipt {
            booking_id: 1,
            item_id: Some(1),
            item_title: "X".into(),
            seats: "A1,A2".into(),
            refund: Decimal::from(1000),
            new_balance: Decimal::from(1000),
        };
        assert_eq!(
            receipt.message(),
            "Booking cancelled. KSH 1000 has been refunded to your account."
        );
    }

    proptest! {
        #[test]
        fn parsed_labels_are_unique_and_trimmed(raw in "[A-D][1-9]( *, *[A-D][1-9]){0,8}") {
            match SeatSelection::parse(&raw) {
                Ok(seats) => {
                    let unique: HashSet<&String> = seats.labels().iter().collect();
                    prop_assert_eq!(unique.len(), seats.len());
                    prop_assert!(seats.labels().iter().all(|l| l.trim() == l && !l.is_empty()));
                }
                Err(AppError::Validation(msg)) => prop_assert!(msg.contains("more than once")),
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }

        #[test]
        fn conflicts_are_exactly_the_intersection(
            requested in proptest::collection::hash_set("[A-C][1-4]", 1..8),
            occupied in proptest::collection::hash_set("[A-C][1-4]", 0..8),
        ) {
            let raw = requested.iter().cloned().collect::<Vec<_>>().join(",");
            let seats = SeatSelection::parse(&raw).unwrap();
            let conflicts: HashSet<String> = seats.conflicts_with(&occupied).into_iter().collect();
            let expected: HashSet<String> = requested.intersection(&occupied).cloned().collect();
            prop_assert_eq!(conflicts, expected);
        }
    }
}

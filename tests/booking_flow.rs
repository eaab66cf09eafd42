//! Бронирование, отмена и пополнение на уровне сервиса, против настоящего Postgres.

mod common;

use std::collections::HashSet;

use box_office::{
    error::AppError,
    models::{notification, Booking, CatalogItem, Notification},
    services::booking::{cancel_booking, create_booking, deposit, remove_booking},
};
use common::{balance_of, create_item, create_user, dec, item_input};
use rust_decimal::Decimal;
use sqlx::PgPool;

#[sqlx::test(migrations = "src/migrations")]
async fn booking_two_seats_charges_price_times_seats(pool: PgPool) {
    let item = create_item(&pool, "X", 500).await;
    let user = create_user(&pool, 1000).await;

    let receipt = create_booking(&pool, user.id, item.id, "A1,A2").await.unwrap();

    assert_eq!(receipt.new_balance, Decimal::ZERO);
    assert_eq!(receipt.total_cost, Decimal::from(1000));
    assert_eq!(receipt.seats, "A1,A2");
    assert_eq!(balance_of(&pool, user.id).await, Decimal::ZERO);

    let bookings = Booking::list_for_user(&pool, user.id).await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].seats, "A1,A2");
    assert_eq!(bookings[0].show_time, "19:30");
    assert_eq!(bookings[0].item_title, "X");

    let notes = Notification::list_for_user(&pool, user.id).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].notification_type.as_deref(), Some(notification::BOOKING_SUCCESS));
}

#[sqlx::test(migrations = "src/migrations")]
async fn overlapping_seat_is_rejected_without_mutation(pool: PgPool) {
    let item = create_item(&pool, "X", 500).await;
    let first = create_user(&pool, 1000).await;
    let second = create_user(&pool, 1000).await;
    create_booking(&pool, first.id, item.id, "A1,A2").await.unwrap();

    let err = create_booking(&pool, second.id, item.id, "A2,A3").await.unwrap_err();

    match err {
        AppError::Conflict(msg) => assert_eq!(msg, "Seat(s) already booked: A2"),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(balance_of(&pool, second.id).await, Decimal::from(1000));
    assert!(Booking::list_for_user(&pool, second.id).await.unwrap().is_empty());
    assert!(Notification::list_for_user(&pool, second.id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "src/migrations")]
async fn insufficient_funds_creates_nothing(pool: PgPool) {
    let item = create_item(&pool, "X", 500).await;
    let user = create_user(&pool, 400).await;

    let err = create_booking(&pool, user.id, item.id, "A1").await.unwrap_err();

    assert!(matches!(err, AppError::InsufficientFunds(ref msg) if msg.starts_with("Insufficient funds")));
    assert_eq!(balance_of(&pool, user.id).await, Decimal::from(400));
    assert!(Booking::list_for_user(&pool, user.id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "src/migrations")]
async fn cancelling_two_seats_refunds_current_price(pool: PgPool) {
    let item = create_item(&pool, "X", 500).await;
    let user = create_user(&pool, 1000).await;
    let receipt = create_booking(&pool, user.id, item.id, "A1,A2").await.unwrap();

    let cancelled = cancel_booking(&pool, user.id, receipt.booking_id).await.unwrap();

    assert_eq!(cancelled.refund, Decimal::from(1000));
    assert_eq!(balance_of(&pool, user.id).await, Decimal::from(1000));
    assert!(Booking::find(&pool, receipt.booking_id).await.unwrap().is_none());

    // Места снова свободны
    let seats = Booking::booked_seats(&pool, item.id, &item.showing()).await.unwrap();
    assert!(seats.is_empty());
}

#[sqlx::test(migrations = "src/migrations")]
async fn book_then_cancel_restores_balance_exactly(pool: PgPool) {
    let mut input = item_input("Fractional", 0);
    input.price = dec("12.75");
    let item = CatalogItem::create(&pool, &input).await.unwrap();
    let user = create_user(&pool, 1000).await;
    let before = balance_of(&pool, user.id).await;

    let receipt = create_booking(&pool, user.id, item.id, "B1, B2, B3").await.unwrap();
    assert_eq!(receipt.new_balance, before - dec("38.25"));

    cancel_booking(&pool, user.id, receipt.booking_id).await.unwrap();
    assert_eq!(balance_of(&pool, user.id).await, before);
}

#[sqlx::test(migrations = "src/migrations")]
async fn refund_follows_price_change(pool: PgPool) {
    let item = create_item(&pool, "X", 500).await;
    let user = create_user(&pool, 1000).await;
    let receipt = create_booking(&pool, user.id, item.id, "A1,A2").await.unwrap();

    let mut input = item_input("X", 700);
    input.scheduled_at = item.scheduled_at;
    CatalogItem::update(&pool, item.id, &input).await.unwrap();

    let cancelled = cancel_booking(&pool, user.id, receipt.booking_id).await.unwrap();
    assert_eq!(cancelled.refund, Decimal::from(1400));
    assert_eq!(balance_of(&pool, user.id).await, Decimal::from(1400));
}

#[sqlx::test(migrations = "src/migrations")]
async fn booking_survives_item_deletion_with_zero_refund(pool: PgPool) {
    let item = create_item(&pool, "Gone", 300).await;
    let user = create_user(&pool, 1000).await;
    let receipt = create_booking(&pool, user.id, item.id, "C1").await.unwrap();

    assert!(CatalogItem::delete(&pool, item.id).await.unwrap());
    let kept = Booking::find(&pool, receipt.booking_id).await.unwrap().unwrap();
    assert_eq!(kept.catalog_item_id, None);
    assert_eq!(kept.item_title, "Gone");

    let cancelled = cancel_booking(&pool, user.id, receipt.booking_id).await.unwrap();
    assert_eq!(cancelled.refund, Decimal::ZERO);
    assert_eq!(balance_of(&pool, user.id).await, Decimal::from(700));
}

#[sqlx::test(migrations = "src/migrations")]
async fn cannot_cancel_someone_elses_booking(pool: PgPool) {
    let item = create_item(&pool, "X", 100).await;
    let owner = create_user(&pool, 1000).await;
    let other = create_user(&pool, 1000).await;
    let receipt = create_booking(&pool, owner.id, item.id, "A1").await.unwrap();

    let err = cancel_booking(&pool, other.id, receipt.booking_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "Booking" }));
    assert!(Booking::find(&pool, receipt.booking_id).await.unwrap().is_some());
}

#[sqlx::test(migrations = "src/migrations")]
async fn unknown_item_and_empty_selection(pool: PgPool) {
    let item = create_item(&pool, "X", 100).await;
    let user = create_user(&pool, 1000).await;

    let err = create_booking(&pool, user.id, item.id + 1000, "A1").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "Catalog item" }));

    let err = create_booking(&pool, user.id, item.id, " , ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = create_booking(&pool, user.id, item.id, "A1,A1").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(balance_of(&pool, user.id).await, Decimal::from(1000));
}

#[sqlx::test(migrations = "src/migrations")]
async fn concurrent_requests_never_double_book(pool: PgPool) {
    let item = create_item(&pool, "Hot Ticket", 100).await;
    let mut users = Vec::new();
    for _ in 0..6 {
        users.push(create_user(&pool, 1000).await);
    }

    // Все запросы претендуют на A2
    let requests = ["A1,A2", "A2,A3", "A2", "A3,A2,A4", "A2,A5", "A6,A2"];
    let handles: Vec<_> = users
        .iter()
        .zip(requests)
        .map(|(user, seats)| {
            let pool = pool.clone();
            let (user_id, item_id) = (user.id, item.id);
            tokio::spawn(async move { create_booking(&pool, user_id, item_id, seats).await })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let mut winners = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => winners += 1,
            Err(AppError::Conflict(msg)) => assert!(msg.contains("A2"), "{msg}"),
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(winners, 1);

    let seats = Booking::booked_seats(&pool, item.id, &item.showing()).await.unwrap();
    let distinct: HashSet<&String> = seats.iter().collect();
    assert_eq!(distinct.len(), seats.len());
    assert_eq!(seats.iter().filter(|s| *s == "A2").count(), 1);

    // Деньги списаны только у победителя
    let mut charged = 0;
    for user in &users {
        if balance_of(&pool, user.id).await < Decimal::from(1000) {
            charged += 1;
        }
    }
    assert_eq!(charged, 1);
}

#[sqlx::test(migrations = "src/migrations")]
async fn concurrent_bookings_by_one_user_never_overdraw(pool: PgPool) {
    let item = create_item(&pool, "X", 600).await;
    let user = create_user(&pool, 1000).await;

    let handles: Vec<_> = ["B1", "B2", "B3"]
        .into_iter()
        .map(|seat| {
            let pool = pool.clone();
            let (user_id, item_id) = (user.id, item.id);
            tokio::spawn(async move { create_booking(&pool, user_id, item_id, seat).await })
        })
        .collect();

    let ok = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(ok, 1);
    assert_eq!(balance_of(&pool, user.id).await, Decimal::from(400));
}

#[sqlx::test(migrations = "src/migrations")]
async fn deposit_increases_balance_and_notifies(pool: PgPool) {
    let user = create_user(&pool, 1000).await;

    let balance = deposit(&pool, user.id, dec("250.50")).await.unwrap();
    assert_eq!(balance, dec("1250.50"));

    let err = deposit(&pool, user.id, dec("-1")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "Invalid amount."));
    assert_eq!(balance_of(&pool, user.id).await, dec("1250.50"));

    let notes = Notification::list_for_user(&pool, user.id).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].notification_type.as_deref(), Some(notification::DEPOSIT));
}

#[sqlx::test(migrations = "src/migrations")]
async fn deposit_rejects_amounts_the_balance_cannot_hold(pool: PgPool) {
    let user = create_user(&pool, 1000).await;

    let err = deposit(&pool, user.id, dec("0.001")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "Invalid amount."));

    let err = deposit(&pool, user.id, dec("100000000")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("maximum")));

    assert_eq!(balance_of(&pool, user.id).await, dec("1000.00"));
    assert!(Notification::list_for_user(&pool, user.id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "src/migrations")]
async fn overlong_seat_label_is_a_validation_error(pool: PgPool) {
    let item = create_item(&pool, "X", 100).await;
    let user = create_user(&pool, 1000).await;

    let err = create_booking(&pool, user.id, item.id, "BALCONY-LEFT-ROW-12-SEAT-4")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(balance_of(&pool, user.id).await, Decimal::from(1000));
}

#[sqlx::test(migrations = "src/migrations")]
async fn admin_removal_frees_seats_and_notifies_in_one_step(pool: PgPool) {
    let item = create_item(&pool, "X", 100).await;
    let user = create_user(&pool, 1000).await;
    let receipt = create_booking(&pool, user.id, item.id, "A1").await.unwrap();

    let removed = remove_booking(&pool, receipt.booking_id, true).await.unwrap();
    assert_eq!(removed.user_id, user.id);
    assert!(Booking::find(&pool, receipt.booking_id).await.unwrap().is_none());
    assert!(Booking::booked_seats(&pool, item.id, &item.showing()).await.unwrap().is_empty());
    // Без возврата
    assert_eq!(balance_of(&pool, user.id).await, Decimal::from(900));

    let notes = Notification::list_for_user(&pool, user.id).await.unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().any(|n| n.message.contains("cancelled by an administrator")));

    // Повторное снятие ничего не пишет
    let err = remove_booking(&pool, receipt.booking_id, true).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "Booking" }));
    assert_eq!(Notification::list_for_user(&pool, user.id).await.unwrap().len(), 2);
}

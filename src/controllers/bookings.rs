use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::{
    controllers::form_response,
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{Booking, User},
    services::{
        booking::{self, BookingReceipt, CancellationReceipt},
        mailer,
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create-booking", post(create_booking_form))
        .route("/api/bookings", get(list_bookings).post(create_booking_json))
        .route("/my-bookings", get(list_bookings))
        .route("/cancel-my-booking/{booking_id}", post(cancel_booking))
        .route("/download-ticket/{booking_id}", get(download_ticket))
}

/* ---------- helpers ---------- */

async fn notify_booked(state: &AppState, receipt: &BookingReceipt, user_id: i64) {
    state.cache.invalidate_seats(receipt.item_id).await;
    if let Ok(Some(user)) = User::find_by_id(&state.db.pool, user_id).await {
        mailer::send(
            state.mailer.as_ref(),
            &state.config.mail.from_address,
            mailer::booking_confirmation(&user, receipt),
        );
    }
}

async fn notify_cancelled(state: &AppState, receipt: &CancellationReceipt, user_id: i64) {
    if let Some(item_id) = receipt.item_id {
        state.cache.invalidate_seats(item_id).await;
    }
    if let Ok(Some(user)) = User::find_by_id(&state.db.pool, user_id).await {
        mailer::send(
            state.mailer.as_ref(),
            &state.config.mail.from_address,
            mailer::booking_cancellation(&user, receipt),
        );
    }
}

/* ---------- CREATE ---------- */

#[derive(Debug, Deserialize)]
pub struct BookingForm {
    pub item_id: i64,
    #[serde(default)]
    pub selected_seats: String,
}

// POST /create-booking (форма или AJAX)
async fn create_booking_form(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: HeaderMap,
    Form(form): Form<BookingForm>,
) -> Response {
    let outcome = booking::create_booking(
        &state.db.pool,
        user.user_id,
        form.item_id,
        &form.selected_seats,
    )
    .await;

    if let Ok(receipt) = &outcome {
        notify_booked(&state, receipt, user.user_id).await;
    }

    let back = format!("/book/{}", form.item_id);
    form_response(
        &headers,
        &back,
        outcome.map(|r| (r.message(), json!({ "new_balance": r.new_balance }))),
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub item_id: i64,
    pub seats: String,
}

// POST /api/bookings
async fn create_booking_json(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateBookingRequest>,
) -> AppResult<impl IntoResponse> {
    let receipt = booking::create_booking(&state.db.pool, user.user_id, req.item_id, &req.seats)
        .await?;
    notify_booked(&state, &receipt, user.user_id).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": receipt.message(),
            "new_balance": receipt.new_balance,
            "booking": receipt,
        })),
    ))
}

/* ---------- LIST ---------- */

#[derive(Debug, Serialize)]
pub struct BookingView {
    #[serde(rename = "bookingId")]
    pub booking_id: i64,
    pub item_id: Option<i64>,
    pub movie_name: String,
    pub date: String,
    pub time: String,
    pub seats: String,
}

impl From<Booking> for BookingView {
    fn from(b: Booking) -> Self {
        BookingView {
            booking_id: b.id,
            item_id: b.catalog_item_id,
            movie_name: b.item_title,
            date: b.show_date.format("%Y-%m-%d").to_string(),
            time: b.show_time,
            seats: b.seats,
        }
    }
}

// GET /api/bookings
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let bookings: Vec<BookingView> = Booking::list_for_user(&state.db.pool, user.user_id)
        .await?
        .into_iter()
        .map(BookingView::from)
        .collect();
    Ok(Json(json!({ "bookings": bookings })))
}

/* ---------- CANCEL ---------- */

// POST /cancel-my-booking/{booking_id}
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: HeaderMap,
    Path(booking_id): Path<i64>,
) -> Response {
    let outcome = booking::cancel_booking(&state.db.pool, user.user_id, booking_id).await;

    if let Ok(receipt) = &outcome {
        notify_cancelled(&state, receipt, user.user_id).await;
    }

    form_response(
        &headers,
        "/my-bookings",
        outcome.map(|r| (r.message(), json!({ "new_balance": r.new_balance, "refund": r.refund }))),
    )
}

/* ---------- TICKET ---------- */

pub fn render_ticket(booking: &Booking, holder: &str) -> String {
    format!(
        "BOX OFFICE TICKET\n\
         =================\n\
         Booking ID: {}\n\
         Holder: {}\n\
         Title: {}\n\
         Date: {}\n\
         Time: {}\n\
         Seats: {}\n\
         Booked at: {}\n",
        booking.id,
        holder,
        booking.item_title,
        booking.show_date,
        booking.show_time,
        booking.seat_labels().join(", "),
        booking.created_at.format("%Y-%m-%d %H:%M"),
    )
}

// GET /download-ticket/{booking_id}
async fn download_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let booking = Booking::find_for_user(&state.db.pool, booking_id, user.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking"))?;

    let holder = format!("{} {}", user.first_name, user.last_name);
    let holder = if holder.trim().is_empty() { user.email.clone() } else { holder.trim().to_string() };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"ticket_{}.txt\"", booking.id),
            ),
        ],
        render_ticket(&booking, &holder),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn ticket_lists_seats() {
        let booking = Booking {
            id: 42,
            user_id: 1,
            catalog_item_id: Some(3),
            item_title: "Cold Play".into(),
            show_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            show_time: "19:30".into(),
            seats: "A1,A2".into(),
            created_at: NaiveDate::from_ymd_opt(2026, 11, 1)
                .unwrap()
                .and_hms_opt(9, 5, 0)
                .unwrap(),
        };
        let ticket = render_ticket(&booking, "Jane Doe");
        assert!(ticket.contains("Booking ID: 42"));
        assert!(ticket.contains("Seats: A1, A2"));
        assert!(ticket.contains("Date: 2026-12-01"));
        assert!(ticket.contains("Booked at: 2026-11-01 09:05"));
    }

    #[test]
    fn booking_view_uses_client_field_names() {
        let view = BookingView {
            booking_id: 1,
            item_id: None,
            movie_name: "X".into(),
            date: "2026-01-01".into(),
            time: "20:00".into(),
            seats: "A1".into(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["bookingId"], 1);
        assert_eq!(json["movie_name"], "X");
    }
}

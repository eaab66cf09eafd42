use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::{
    controllers::{bookings::BookingView, offset, ListQuery, Page},
    database::is_unique_violation,
    error::{AppError, AppResult},
    middleware::RequireAdmin,
    models::{
        booking::BookingWithUser,
        catalog::CatalogItemInput,
        user::NewUser,
        Booking, CatalogItem, User,
    },
    services::{
        auth::{hash_password, MIN_PASSWORD_LENGTH},
        booking,
        reports::{self, DashboardReport, HistoryEntry},
    },
    AppState,
};

const ITEMS_PER_PAGE: i64 = 20;
const USERS_PER_PAGE: i64 = 10;
const BOOKINGS_PER_PAGE: i64 = 12;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin-dashboard", get(dashboard))
        .route("/admin-dashboard/movies", get(list_items))
        .route("/admin-dashboard/movies/add", post(add_item))
        .route("/admin-dashboard/movies/edit/{item_id}", post(edit_item))
        .route("/admin-dashboard/movies/delete/{item_id}", post(delete_item))
        .route("/admin-dashboard/users", get(list_users))
        .route("/admin-dashboard/users/{user_id}", get(user_detail))
        .route("/admin-dashboard/users/{user_id}/delete", post(delete_user))
        .route("/admin-dashboard/bookings", get(list_bookings))
        .route("/admin-dashboard/booking/delete/{booking_id}", post(delete_booking))
        .route("/admin-dashboard/booking/cancel/{booking_id}", post(cancel_booking))
        .route("/admin-dashboard/history", get(history))
        .route("/admin-dashboard/create-advisor", post(create_advisor))
}

/* ---------- DASHBOARD ---------- */

// GET /admin-dashboard
async fn dashboard(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> AppResult<Json<DashboardReport>> {
    let total_users = User::count(&state.db.pool, None).await?;
    let facts = Booking::facts(&state.db.pool).await?;
    Ok(Json(reports::dashboard(total_users, &facts)))
}

// GET /admin-dashboard/history
async fn history(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    let items = CatalogItem::all(&state.db.pool).await?;
    let sold = Booking::seats_by_item(&state.db.pool).await?;
    Ok(Json(reports::history(&items, &sold)))
}

/* ---------- CATALOG ---------- */

// GET /admin-dashboard/movies?q=&page=
async fn list_items(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<Page<CatalogItem>>> {
    let page = params.page();
    let total = CatalogItem::count(&state.db.pool, params.filter()).await?;
    let items = CatalogItem::list(
        &state.db.pool,
        params.filter(),
        ITEMS_PER_PAGE,
        offset(page, ITEMS_PER_PAGE),
    )
    .await?;
    Ok(Json(Page::new(items, page, ITEMS_PER_PAGE, total)))
}

fn check_item_input(input: &CatalogItemInput) -> AppResult<()> {
    input.validate()?;
    if input.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }
    if input.category.trim().is_empty() {
        return Err(AppError::Validation("category must not be empty".to_string()));
    }
    Ok(())
}

// POST /admin-dashboard/movies/add
async fn add_item(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Json(input): Json<CatalogItemInput>,
) -> AppResult<impl IntoResponse> {
    check_item_input(&input)?;
    let item = CatalogItem::create(&state.db.pool, &input).await?;
    info!("Admin {} added catalog item {} '{}'", admin.user_id, item.id, item.title);
    Ok((StatusCode::CREATED, Json(item)))
}

// POST /admin-dashboard/movies/edit/{item_id}
async fn edit_item(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(item_id): Path<i64>,
    Json(input): Json<CatalogItemInput>,
) -> AppResult<Json<CatalogItem>> {
    check_item_input(&input)?;
    let item = CatalogItem::update(&state.db.pool, item_id, &input)
        .await?
        .ok_or_else(|| AppError::not_found("Catalog item"))?;

    // Сеанс мог сдвинуться, карта мест устарела
    state.cache.invalidate_seats(item.id).await;
    info!("Admin {} updated catalog item {}", admin.user_id, item.id);
    Ok(Json(item))
}

// POST /admin-dashboard/movies/delete/{item_id}
async fn delete_item(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(item_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    if !CatalogItem::delete(&state.db.pool, item_id).await? {
        return Err(AppError::not_found("Catalog item"));
    }
    state.cache.invalidate_seats(item_id).await;
    info!("Admin {} deleted catalog item {}", admin.user_id, item_id);
    Ok(Json(json!({ "success": true, "message": "Item deleted successfully." })))
}

/* ---------- USERS ---------- */

// GET /admin-dashboard/users?q=&page=
async fn list_users(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<Page<User>>> {
    let page = params.page();
    let total = User::count(&state.db.pool, params.filter()).await?;
    let users = User::list(
        &state.db.pool,
        params.filter(),
        USERS_PER_PAGE,
        offset(page, USERS_PER_PAGE),
    )
    .await?;
    Ok(Json(Page::new(users, page, USERS_PER_PAGE, total)))
}

#[derive(Debug, Serialize)]
pub struct UserDetail {
    pub user: User,
    pub bookings: Vec<BookingView>,
}

// GET /admin-dashboard/users/{user_id}
async fn user_detail(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Path(user_id): Path<i64>,
) -> AppResult<Json<UserDetail>> {
    let user = User::find_by_id(&state.db.pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let bookings = Booking::list_for_user(&state.db.pool, user.id)
        .await?
        .into_iter()
        .map(BookingView::from)
        .collect();
    Ok(Json(UserDetail { user, bookings }))
}

// POST /admin-dashboard/users/{user_id}/delete
async fn delete_user(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(user_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let user = User::find_by_id(&state.db.pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    if user.is_superuser {
        return Err(AppError::Forbidden("Cannot delete a superuser account.".to_string()));
    }

    let bookings = Booking::list_for_user(&state.db.pool, user.id).await?;
    User::delete(&state.db.pool, user.id).await?;
    state.cache.invalidate_user_auth(&user.email).await;
    for item_id in bookings.iter().filter_map(|b| b.catalog_item_id) {
        state.cache.invalidate_seats(item_id).await;
    }

    info!("Admin {} deleted user {}", admin.user_id, user.id);
    Ok(Json(json!({
        "success": true,
        "message": format!("User {} deleted successfully.", user.email),
    })))
}

#[derive(Debug, Deserialize)]
pub struct NewAdvisorRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

// POST /admin-dashboard/create-advisor
async fn create_advisor(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Json(req): Json<NewAdvisorRequest>,
) -> AppResult<impl IntoResponse> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("email must be a valid email address".to_string()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }

    let new_user = NewUser {
        email: email.to_string(),
        password_hash: hash_password(&req.password, state.config.auth.bcrypt_cost)?,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        is_active: true,
        is_advisor: true,
        ..NewUser::default()
    };

    let advisor = match User::create(&state.db.pool, &new_user).await {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict("A user with that email already exists.".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    info!("Admin {} created advisor {}", admin.user_id, advisor.id);
    Ok((StatusCode::CREATED, Json(advisor)))
}

/* ---------- BOOKINGS ---------- */

// GET /admin-dashboard/bookings?q=&page=
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Query(params): Query<ListQuery>,
) -> AppResult<Json<Page<BookingWithUser>>> {
    let page = params.page();
    let total = Booking::count(&state.db.pool, params.filter()).await?;
    let bookings = Booking::list_with_users(
        &state.db.pool,
        params.filter(),
        BOOKINGS_PER_PAGE,
        offset(page, BOOKINGS_PER_PAGE),
    )
    .await?;
    Ok(Json(Page::new(bookings, page, BOOKINGS_PER_PAGE, total)))
}

/// Удаляет бронь без возврата денег и освобождает места.
async fn remove_booking(
    state: &AppState,
    booking_id: i64,
    notify_owner: bool,
) -> AppResult<Booking> {
    let removed = booking::remove_booking(&state.db.pool, booking_id, notify_owner).await?;
    if let Some(item_id) = removed.catalog_item_id {
        state.cache.invalidate_seats(item_id).await;
    }
    Ok(removed)
}

// POST /admin-dashboard/booking/delete/{booking_id}
async fn delete_booking(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(booking_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let booking = remove_booking(&state, booking_id, false).await?;
    info!("Admin {} deleted booking {}", admin.user_id, booking.id);
    Ok(Json(json!({ "success": true, "message": "Booking deleted successfully." })))
}

// POST /admin-dashboard/booking/cancel/{booking_id}
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    Path(booking_id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let booking = remove_booking(&state, booking_id, true).await?;
    info!("Admin {} cancelled booking {}", admin.user_id, booking.id);
    Ok(Json(json!({ "success": true, "message": "Booking cancelled successfully." })))
}

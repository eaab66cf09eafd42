use axum::{
    extract::State,
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Form, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{str::FromStr, sync::Arc};
use tracing::info;
use validator::Validate;

use crate::{
    controllers::{auth::email_conflict, bookings::BookingView, form_response},
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{user::ProfileUpdate, Booking, ChatMessage, User},
    services::{
        auth::{hash_password, validate_new_password, verify_password},
        booking, mailer,
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/account", get(account))
        .route("/users/update-profile", post(update_profile))
        .route("/users/change-password", post(change_password))
        .route("/users/delete-account", post(delete_account))
        .route("/deposit", post(deposit))
}

fn empty_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/* ---------- PROFILE ---------- */

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user: User,
    pub bookings: Vec<BookingView>,
    pub unread_messages: i64,
}

// GET /account
async fn account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> AppResult<Json<AccountResponse>> {
    let pool = &state.db.pool;
    let user = User::find_by_id(pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    let bookings = Booking::list_for_user(pool, auth.user_id)
        .await?
        .into_iter()
        .map(BookingView::from)
        .collect();
    let unread_messages = ChatMessage::unread_count(pool, auth.user_id).await?;

    Ok(Json(AccountResponse { user, bookings, unread_messages }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileForm {
    #[validate(length(min = 1, max = 150, message = "is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150, message = "is required"))]
    pub last_name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
}

async fn apply_profile_update(
    state: &AppState,
    auth: &AuthUser,
    form: ProfileForm,
) -> AppResult<(String, Value)> {
    form.validate()?;
    let email = form.email.trim().to_string();
    if User::email_taken(&state.db.pool, &email, Some(auth.user_id)).await? {
        return Err(AppError::Conflict("A user with that email already exists.".to_string()));
    }

    let update = ProfileUpdate {
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        email,
        phone: empty_to_none(form.phone),
        city: empty_to_none(form.city),
        address: empty_to_none(form.address),
        zip_code: empty_to_none(form.zip_code),
    };
    // Проверка выше не спасает от гонки, ее ловит уникальный индекс
    let user = User::update_profile(&state.db.pool, auth.user_id, &update)
        .await
        .map_err(email_conflict)?;

    // Кеш Basic Auth привязан к email
    if !user.email.eq_ignore_ascii_case(&auth.email) {
        state.cache.invalidate_user_auth(&auth.email).await;
    }

    info!("User {} updated profile", user.id);
    Ok(("Profile updated successfully.".to_string(), json!({ "user": user })))
}

// POST /users/update-profile
async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Form(form): Form<ProfileForm>,
) -> Response {
    let outcome = apply_profile_update(&state, &auth, form).await;
    form_response(&headers, "/account", outcome)
}

/* ---------- PASSWORD ---------- */

#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

async fn apply_password_change(
    state: &AppState,
    auth: &AuthUser,
    form: ChangePasswordForm,
) -> AppResult<(String, Value)> {
    let user = User::find_by_id(&state.db.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    if !verify_password(&form.old_password, &user.password_hash) {
        return Err(AppError::Validation("Your old password was entered incorrectly.".to_string()));
    }
    validate_new_password(&form.new_password1, &form.new_password2)?;

    let hash = hash_password(&form.new_password1, state.config.auth.bcrypt_cost)?;
    User::set_password(&state.db.pool, user.id, &hash).await?;
    state.cache.invalidate_user_auth(&user.email).await;

    info!("User {} changed password", user.id);
    Ok(("Your password was successfully updated!".to_string(), Value::Null))
}

// POST /users/change-password
async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Form(form): Form<ChangePasswordForm>,
) -> Response {
    let outcome = apply_password_change(&state, &auth, form).await;
    form_response(&headers, "/account", outcome)
}

/* ---------- DELETE ---------- */

#[derive(Debug, Deserialize)]
pub struct DeleteAccountForm {
    pub password: String,
}

async fn apply_account_deletion(
    state: &AppState,
    auth: &AuthUser,
    form: DeleteAccountForm,
) -> AppResult<(String, Value)> {
    let user = User::find_by_id(&state.db.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    if !verify_password(&form.password, &user.password_hash) {
        return Err(AppError::Validation("Incorrect password.".to_string()));
    }

    // Места удаленных броней освобождаются, карты мест надо сбросить
    let bookings = Booking::list_for_user(&state.db.pool, user.id).await?;

    User::delete(&state.db.pool, user.id).await?;
    state.cache.invalidate_user_auth(&user.email).await;
    for item_id in bookings.iter().filter_map(|b| b.catalog_item_id) {
        state.cache.invalidate_seats(item_id).await;
    }

    mailer::send(
        state.mailer.as_ref(),
        &state.config.mail.from_address,
        mailer::account_deletion(&user),
    );

    info!("User {} deleted own account", user.id);
    Ok(("Your account has been deleted.".to_string(), Value::Null))
}

// POST /users/delete-account
async fn delete_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Form(form): Form<DeleteAccountForm>,
) -> Response {
    let outcome = apply_account_deletion(&state, &auth, form).await;
    let back = if outcome.is_ok() { "/" } else { "/account" };
    form_response(&headers, back, outcome)
}

/* ---------- DEPOSIT ---------- */

#[derive(Debug, Deserialize)]
pub struct DepositForm {
    #[serde(default)]
    pub amount: String,
}

/// Сумма пополнения: положительное десятичное число.
pub fn parse_amount(raw: &str) -> AppResult<Decimal> {
    Decimal::from_str(raw.trim())
        .ok()
        .filter(|amount| booking::is_valid_amount(*amount))
        .ok_or_else(|| AppError::Validation("Invalid amount.".to_string()))
}

// POST /deposit
async fn deposit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Form(form): Form<DepositForm>,
) -> Response {
    let outcome = async {
        let amount = parse_amount(&form.amount)?;
        let new_balance = booking::deposit(&state.db.pool, auth.user_id, amount).await?;
        Ok::<_, AppError>((
            format!("Successfully deposited KSH {amount}."),
            json!({ "new_balance": new_balance }),
        ))
    }
    .await;
    form_response(&headers, "/account", outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_must_be_positive_decimal() {
        assert_eq!(parse_amount(" 250.50 ").unwrap(), Decimal::new(250_50, 2));
        assert_eq!(parse_amount("10.500").unwrap(), Decimal::new(10_50, 2));
        for raw in ["", "0", "-5", "abc", "1e", "0.001"] {
            assert!(matches!(parse_amount(raw), Err(AppError::Validation(_))), "{raw}");
        }
    }

    #[test]
    fn blank_optional_fields_become_none() {
        assert_eq!(empty_to_none(Some("  ".into())), None);
        assert_eq!(empty_to_none(Some(" Nairobi ".into())), Some("Nairobi".into()));
        assert_eq!(empty_to_none(None), None);
    }
}

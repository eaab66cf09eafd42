use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
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
    database::is_unique_violation,
    error::{AppError, AppResult},
    middleware::{bearer_token, verify_access_token, AuthUser},
    models::{user::NewUser, User},
    services::{
        auth::{
            hash_password, password_fingerprint, validate_new_password, verify_password,
            TokenPurpose,
        },
        mailer,
    },
    AppState,
};

/// Нарушение `uq_users_email` при записи пользователя -> Conflict.
pub fn email_conflict(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict("A user with that email already exists.".to_string())
    } else {
        err.into()
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/logout", post(logout))
        .route("/activate/{token}", get(activate))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/{token}", post(reset_password))
}

/* ---------- REGISTRATION ---------- */

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 150, message = "is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150, message = "is required"))]
    pub last_name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub password1: String,
    pub password2: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub phone: Option<String>,
}

// POST /users/register
async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    validate_new_password(&req.password1, &req.password2)?;

    let email = req.email.trim().to_string();
    if User::email_taken(&state.db.pool, &email, None).await? {
        return Err(AppError::Conflict("A user with that email already exists.".to_string()));
    }

    let require_activation = state.config.features.require_activation;
    let new_user = NewUser {
        email,
        password_hash: hash_password(&req.password1, state.config.auth.bcrypt_cost)?,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        address: req.address,
        city: req.city,
        zip_code: req.zip_code,
        phone: req.phone,
        is_active: !require_activation,
        is_advisor: false,
    };

    // Гонка двух регистраций с одним email ловится уникальным индексом
    let user = User::create(&state.db.pool, &new_user)
        .await
        .map_err(email_conflict)?;

    let message = if require_activation {
        let token = state
            .tokens
            .issue(user.id, &user.email, TokenPurpose::Activate, None)?;
        let link = format!("{}/activate/{}", state.config.app.public_url, token);
        mailer::send(
            state.mailer.as_ref(),
            &state.config.mail.from_address,
            mailer::registration(&user, &link),
        );
        "Please check your email to activate your account."
    } else {
        "Registration successful. You can now log in."
    };

    info!("User {} registered ({})", user.id, user.email);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message, "user_id": user.id })),
    ))
}

// GET /activate/{token}
async fn activate(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> AppResult<impl IntoResponse> {
    let claims = state
        .tokens
        .verify(&token, TokenPurpose::Activate)
        .map_err(|_| AppError::Validation("Activation link is invalid or has expired.".to_string()))?;

    let user = User::find_by_id(&state.db.pool, claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let message = if User::activate(&state.db.pool, user.id).await? {
        info!("User {} activated", user.id);
        "Your account has been activated. You can now log in."
    } else {
        "Your account is already active."
    };

    Ok(Json(json!({ "success": true, "message": message })))
}

/* ---------- LOGIN / LOGOUT ---------- */

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: AuthUser,
}

// POST /users/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db.pool, req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::Unauthorized(
            "Account is not activated. Please check your email.".to_string(),
        ));
    }

    let token = state
        .tokens
        .issue(user.id, &user.email, TokenPurpose::Access, None)?;
    User::touch_last_seen(&state.db.pool, user.id).await?;

    info!("User {} logged in", user.id);

    Ok(Json(LoginResponse {
        success: true,
        token,
        token_type: "Bearer",
        expires_in: state.tokens.access_ttl_seconds(),
        user: AuthUser::from(&user),
    }))
}

// POST /logout
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    // Basic Auth не хранит сессию, отзывать нечего
    if let Some(token) = bearer_token(&headers) {
        let claims = verify_access_token(&state, token).await?;
        state
            .cache
            .revoke_token(&claims.jti, claims.remaining_seconds())
            .await;
        info!("User {} logged out", claims.sub);
    }

    Ok(Json(json!({ "success": true, "message": "You have been logged out." })))
}

/* ---------- PASSWORD RESET ---------- */

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

// POST /forgot-password
async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    // Ответ одинаковый, есть аккаунт или нет
    if let Some(user) = User::find_by_email(&state.db.pool, req.email.trim()).await? {
        let token = state.tokens.issue(
            user.id,
            &user.email,
            TokenPurpose::Reset,
            Some(password_fingerprint(&user.password_hash)),
        )?;
        let link = format!("{}/reset-password/{}", state.config.app.public_url, token);
        mailer::send(
            state.mailer.as_ref(),
            &state.config.mail.from_address,
            mailer::password_reset(&user, &link),
        );
        info!("Password reset requested for user {}", user.id);
    }

    Ok(Json(json!({
        "success": true,
        "message": "If an account with that email exists, a password reset link has been sent."
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password1: String,
    pub new_password2: String,
}

// POST /reset-password/{token}
async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    let invalid_link =
        || AppError::Validation("Password reset link is invalid or has expired.".to_string());

    let claims = state
        .tokens
        .verify(&token, TokenPurpose::Reset)
        .map_err(|_| invalid_link())?;

    let user = User::find_by_id(&state.db.pool, claims.sub)
        .await?
        .ok_or_else(invalid_link)?;

    // Ссылка одноразовая: после смены пароля отпечаток не совпадет
    if claims.fp.as_deref() != Some(password_fingerprint(&user.password_hash).as_str()) {
        return Err(invalid_link());
    }

    validate_new_password(&req.new_password1, &req.new_password2)?;
    let hash = hash_password(&req.new_password1, state.config.auth.bcrypt_cost)?;
    User::set_password(&state.db.pool, user.id, &hash).await?;
    state.cache.invalidate_user_auth(&user.email).await;

    info!("Password reset for user {}", user.id);

    Ok(Json(json!({
        "success": true,
        "message": "Your password has been reset. You can now log in."
    })))
}

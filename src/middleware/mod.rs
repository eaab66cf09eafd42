use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::{
    error::AppError,
    models::User,
    services::auth::{verify_password, Claims, TokenPurpose},
    AppState,
};

pub mod rbac;

pub use rbac::{RequireAdmin, RequireAdvisor};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    pub is_advisor: bool,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        AuthUser {
            user_id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_superuser: user.is_superuser,
            is_advisor: user.is_advisor,
        }
    }
}

fn unauthorized() -> AppError {
    AppError::Unauthorized("Authentication required".to_string())
}

/// Значение `Authorization: Bearer ...`, если оно есть.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Проверяет bearer-токен доступа: подпись, срок, назначение и отзыв.
pub async fn verify_access_token(state: &AppState, token: &str) -> Result<Claims, AppError> {
    let claims = state.tokens.verify(token, TokenPurpose::Access)?;
    if state.cache.is_token_revoked(&claims.jti).await {
        return Err(AppError::Unauthorized("Token has been revoked".to_string()));
    }
    Ok(claims)
}

// Bearer JWT или Basic Auth
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers) {
            let claims = verify_access_token(state, token).await?;
            let user = User::find_by_id(&state.db.pool, claims.sub)
                .await?
                .filter(|u| u.is_active)
                .ok_or_else(unauthorized)?;
            return Ok(AuthUser::from(&user));
        }

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(unauthorized)?;

        let encoded = auth_header.strip_prefix("Basic ").ok_or_else(unauthorized)?;

        let decoded = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| unauthorized())?;
        let credentials = String::from_utf8(decoded).map_err(|_| unauthorized())?;

        // email:password
        let (email, password) = credentials.split_once(':').ok_or_else(unauthorized)?;

        // Сначала кеш, чтобы не гонять bcrypt на каждый запрос
        if let Some(cached) = state.cache.get_cached_auth_user(email, password).await {
            match serde_json::from_str::<AuthUser>(&cached) {
                Ok(user) => return Ok(user),
                Err(e) => warn!("Broken auth cache entry for {}: {:?}", email, e),
            }
        }

        let user = User::find_by_email(&state.db.pool, email)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

        if !verify_password(password, &user.password_hash) {
            return Err(AppError::Unauthorized("Invalid email or password".to_string()));
        }

        let auth_user = AuthUser::from(&user);
        if let Ok(json) = serde_json::to_string(&auth_user) {
            state
                .cache
                .cache_auth_user(email, password, &json, state.config.auth.basic_cache_ttl_seconds)
                .await;
        }

        // Ошибку обновления last_seen игнорируем
        User::touch_last_seen(&state.db.pool, user.id).await.ok();

        Ok(auth_user)
    }
}

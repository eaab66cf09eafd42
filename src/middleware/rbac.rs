//! Проверка ролей поверх [`AuthUser`].

use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

use super::AuthUser;
use crate::{error::AppError, AppState};

/// Только суперпользователь. Иначе 403.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_superuser {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(RequireAdmin(user))
    }
}

/// Консультант поддержки или суперпользователь.
pub struct RequireAdvisor(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for RequireAdvisor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_advisor && !user.is_superuser {
            return Err(AppError::Forbidden("Advisor access required".to_string()));
        }
        Ok(RequireAdvisor(user))
    }
}

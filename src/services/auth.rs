//! Пароли и подписанные токены.
//!
//! Один формат JWT обслуживает три сценария: токен доступа, ссылку
//! активации аккаунта и ссылку сброса пароля. Сценарий записан в `purpose`
//! и проверяется при декодировании, так что ссылку активации нельзя
//! использовать как токен доступа.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{config::AuthConfig, error::AppError};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Access,
    Activate,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub purpose: TokenPurpose,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    /// Отпечаток хеша пароля: ссылка сброса перестает работать после смены пароля.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fp: Option<String>,
}

impl Claims {
    /// Сколько секунд токен еще действителен.
    pub fn remaining_seconds(&self) -> u64 {
        (self.exp - Utc::now().timestamp()).max(0) as u64
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_seconds: i64,
    link_ttl_seconds: i64,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl_seconds: config.token_ttl_hours * 3600,
            link_ttl_seconds: config.link_ttl_hours * 3600,
        }
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub fn issue(
        &self,
        user_id: i64,
        email: &str,
        purpose: TokenPurpose,
        fingerprint: Option<String>,
    ) -> Result<String, AppError> {
        let ttl = match purpose {
            TokenPurpose::Access => self.access_ttl_seconds,
            TokenPurpose::Activate | TokenPurpose::Reset => self.link_ttl_seconds,
        };
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            purpose,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl,
            fp: fingerprint,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))
    }

    /// Декодирует токен и проверяет подпись, срок и назначение.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
        if data.claims.purpose != purpose {
            return Err(AppError::Unauthorized("Invalid or expired token".to_string()));
        }
        Ok(data.claims)
    }
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Неверный или битый хеш трактуется как несовпадение.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub fn password_fingerprint(password_hash: &str) -> String {
    format!("{:x}", Sha256::digest(password_hash.as_bytes()))
}

/// Проверка нового пароля: совпадение с подтверждением и минимальная длина.
pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), AppError> {
    if password != confirm {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }
    Ok(())
}

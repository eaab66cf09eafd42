use crate::cache::CacheService;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

// Пароль в ключ не попадает, только его SHA-256
fn auth_key(email: &str, password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    format!("auth:{}:{:x}", email.to_lowercase(), digest)
}

fn revoked_key(jti: &str) -> String {
    format!("revoked:{}", jti)
}

impl CacheService {
    /// Сохранить данные авторизованного пользователя в кеш
    pub async fn cache_auth_user(
        &self,
        email: &str,
        password: &str,
        user_data: &str, // JSON сериализованный AuthUser
        ttl_seconds: u64,
    ) {
        let Some(mut conn) = self.conn() else { return };
        let result: Result<(), _> = conn.set_ex(auth_key(email, password), user_data, ttl_seconds).await;
        if let Err(e) = result {
            warn!("Failed to cache auth for {}: {:?}", email, e);
        }
    }

    /// Получить данные пользователя из кеша авторизации
    pub async fn get_cached_auth_user(&self, email: &str, password: &str) -> Option<String> {
        let mut conn = self.conn()?;
        conn.get(auth_key(email, password)).await.unwrap_or(None)
    }

    /// Инвалидировать все закешированные входы пользователя по email
    pub async fn invalidate_user_auth(&self, email: &str) {
        let Some(mut conn) = self.conn() else { return };
        let pattern = format!("auth:{}:*", email.to_lowercase());
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .unwrap_or_default();
        if keys.is_empty() {
            return;
        }
        let result: Result<(), _> = conn.del(keys).await;
        match result {
            Ok(()) => info!("Invalidated cached auth for user {}", email),
            Err(e) => warn!("Failed to invalidate cached auth for {}: {:?}", email, e),
        }
    }

    /// Отозвать JWT до истечения его срока (logout)
    pub async fn revoke_token(&self, jti: &str, ttl_seconds: u64) {
        let Some(mut conn) = self.conn() else { return };
        let result: Result<(), _> = conn.set_ex(revoked_key(jti), 1, ttl_seconds.max(1)).await;
        if let Err(e) = result {
            warn!("Failed to revoke token {}: {:?}", jti, e);
        }
    }

    pub async fn is_token_revoked(&self, jti: &str) -> bool {
        let Some(mut conn) = self.conn() else { return false };
        conn.exists(revoked_key(jti)).await.unwrap_or(false)
    }
}

use crate::redis_client::RedisClient;
use tracing::info;

pub mod auth;
pub mod seats;

/// Кеш поверх Redis. Без Redis все операции - no-op: промах при чтении,
/// тихий пропуск при записи. Ошибки Redis никогда не ломают запрос.
#[derive(Clone)]
pub struct CacheService {
    redis: Option<RedisClient>,
}

impl CacheService {
    pub fn new(redis: Option<RedisClient>) -> Self {
        if redis.is_none() {
            info!("Redis is not configured, cache disabled");
        }
        Self { redis }
    }

    pub fn disabled() -> Self {
        Self { redis: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.redis.is_some()
    }

    fn conn(&self) -> Option<redis::aio::MultiplexedConnection> {
        self.redis.as_ref().map(|r| r.conn.clone())
    }
}

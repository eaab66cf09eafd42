use crate::cache::CacheService;
use redis::AsyncCommands;
use tracing::{debug, warn};

// Старые версии карты никто не читает, они просто истекают
const SEATS_TTL_SECONDS: u64 = 86_400;

fn seats_version_key(item_id: i64) -> String {
    format!("seats:ver:{}", item_id)
}

fn seats_key(item_id: i64, version: u64) -> String {
    format!("seats:{}:v{}", item_id, version)
}

/// Результат чтения карты мест из кеша.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatsLookup {
    Hit(Vec<String>),
    /// Промах. Снимок из БД записывается под этой версией: если бронь
    /// успела сменить версию, запись уйдет в ключ, который уже никто не читает.
    Miss { version: u64 },
    /// Redis не настроен или недоступен.
    Unavailable,
}

impl CacheService {
    /// Версию читаем ДО похода в БД, иначе устаревший снимок может
    /// перезаписать свежую инвалидацию.
    pub async fn get_booked_seats(&self, item_id: i64) -> SeatsLookup {
        let Some(mut conn) = self.conn() else { return SeatsLookup::Unavailable };

        let version: Option<u64> = match conn.get(seats_version_key(item_id)).await {
            Ok(version) => version,
            Err(e) => {
                warn!("Failed to read seats version for item {}: {:?}", item_id, e);
                return SeatsLookup::Unavailable;
            }
        };
        let version = version.unwrap_or(0);

        let data: Option<String> = match conn.get(seats_key(item_id, version)).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read seats cache for item {}: {:?}", item_id, e);
                return SeatsLookup::Miss { version };
            }
        };
        match data.and_then(|json| serde_json::from_str(&json).ok()) {
            Some(seats) => SeatsLookup::Hit(seats),
            None => SeatsLookup::Miss { version },
        }
    }

    pub async fn cache_booked_seats(&self, item_id: i64, version: u64, seats: &[String]) {
        let Some(mut conn) = self.conn() else { return };
        let Ok(data) = serde_json::to_string(seats) else { return };
        let result: Result<(), _> = conn
            .set_ex(seats_key(item_id, version), data, SEATS_TTL_SECONDS)
            .await;
        if let Err(e) = result {
            warn!("Failed to cache seats for item {}: {:?}", item_id, e);
        }
    }

    // Инвалидация = новая версия карты
    pub async fn invalidate_seats(&self, item_id: i64) {
        let Some(mut conn) = self.conn() else { return };
        let result: Result<u64, _> = conn.incr(seats_version_key(item_id), 1).await;
        match result {
            Ok(version) => debug!("Seats cache for item {} moved to version {}", item_id, version),
            Err(e) => warn!("Failed to invalidate seats cache for item {}: {:?}", item_id, e),
        }
    }
}

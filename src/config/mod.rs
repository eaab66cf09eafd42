use serde::Deserialize;
use std::env;
use std::str::FromStr;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub mail: MailConfig,
    pub features: FeatureFlags,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
    /// Базовый URL для ссылок в письмах (активация, сброс пароля)
    pub public_url: String,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis. Без URL кеш отключен
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Настройки JWT и паролей
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub link_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub basic_cache_ttl_seconds: u64,
}

// Настройки почты
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from_address: String,
}

// Feature flags для включения/выключения функциональности
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    pub require_activation: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника переменных.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        Ok(Config {
            app: AppConfig {
                host: vars.string_or("HOST", "0.0.0.0"),
                port: vars.parse_or("PORT", 8000)?,
                environment: vars.string_or("ENVIRONMENT", "development"),
                rust_log: vars.string_or("RUST_LOG", "box_office=debug,tower_http=debug"),
                log_format: vars.parse_or("LOG_FORMAT", LogFormat::Pretty)?,
                public_url: vars.string_or("PUBLIC_URL", "http://localhost:8000"),
                cors_origins: vars
                    .string_or("CORS_ALLOWED_ORIGINS", "")
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            },
            database: DatabaseConfig {
                url: vars.required("DATABASE_URL")?,
                pool_size: vars.parse_or("DB_POOL_SIZE", 20)?,
            },
            redis: RedisConfig {
                url: vars.optional("REDIS_URL"),
            },
            auth: AuthConfig {
                jwt_secret: vars.required("JWT_SECRET")?,
                token_ttl_hours: vars.parse_or("JWT_EXPIRES_IN_HOURS", 24)?,
                link_ttl_hours: vars.parse_or("EMAIL_LINK_EXPIRES_IN_HOURS", 72)?,
                bcrypt_cost: vars.parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
                basic_cache_ttl_seconds: vars.parse_or("AUTH_CACHE_TTL_SECONDS", 300)?,
            },
            mail: MailConfig {
                from_address: vars
                    .string_or("DEFAULT_FROM_EMAIL", "Box Office <no-reply@box-office.local>"),
            },
            features: FeatureFlags {
                require_activation: vars.parse_or("REQUIRE_ACTIVATION", true)?,
            },
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &'static str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn string_or(&self, key: &'static str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(default),
        }
    }
}

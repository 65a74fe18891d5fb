use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub validation: ValidationConfig,
    pub persistence: PersistenceConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// 校验参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// 缺省币种 (payload 未携带 currency 时填充)
    pub default_currency: String,
    /// 金额比较容差
    pub amount_tolerance: BigDecimal,
}

/// 持久化重试策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub max_attempts: u32,
    /// 指数退避基准, 每次重试翻倍
    pub backoff_base_ms: u64,
    /// 单次保存事务的截止时间
    pub save_deadline_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// page_size 上限, 超出则钳制
    pub max_page_size: u32,
    pub search_deadline_secs: u64,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_tolerance() -> BigDecimal {
    BigDecimal::from(1) / BigDecimal::from(100)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/invoice_pipeline".to_string(),
                max_connections: 20,
            },
            validation: ValidationConfig {
                default_currency: "USD".to_string(),
                amount_tolerance: default_tolerance(),
            },
            persistence: PersistenceConfig {
                max_attempts: 3,
                backoff_base_ms: 50,
                save_deadline_secs: 10,
            },
            search: SearchConfig {
                max_page_size: 100,
                search_deadline_secs: 10,
            },
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let defaults = AppConfig::default();
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env_parse("SERVER_PORT", defaults.server.port),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                ),
            },
            validation: ValidationConfig {
                default_currency: std::env::var("DEFAULT_CURRENCY")
                    .unwrap_or(defaults.validation.default_currency),
                amount_tolerance: std::env::var("AMOUNT_TOLERANCE")
                    .ok()
                    .and_then(|v| BigDecimal::from_str(&v).ok())
                    .unwrap_or(defaults.validation.amount_tolerance),
            },
            persistence: PersistenceConfig {
                max_attempts: env_parse("SAVE_MAX_ATTEMPTS", defaults.persistence.max_attempts),
                backoff_base_ms: env_parse(
                    "SAVE_BACKOFF_BASE_MS",
                    defaults.persistence.backoff_base_ms,
                ),
                save_deadline_secs: env_parse(
                    "SAVE_DEADLINE_SECS",
                    defaults.persistence.save_deadline_secs,
                ),
            },
            search: SearchConfig {
                max_page_size: env_parse("SEARCH_MAX_PAGE_SIZE", defaults.search.max_page_size),
                search_deadline_secs: env_parse(
                    "SEARCH_DEADLINE_SECS",
                    defaults.search.search_deadline_secs,
                ),
            },
        }
    }
}

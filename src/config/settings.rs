use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Конфигурация сервера. Загружается из переменных окружения с префиксом
/// `WGCLOUD_`; значения по умолчанию подходят для локальной разработки,
/// кроме `jwt_secret` — он обязателен.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub listen_addr: String,
    pub jwt_secret: String,
    pub mailbox_capacity: usize,
    pub max_connections: usize,
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: f64,
    pub shutdown_grace_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .set_default("listen_addr", "127.0.0.1:8080")?
            .set_default("mailbox_capacity", 64)?
            .set_default("max_connections", 1024)?
            .set_default("rate_limit_per_sec", 10.0)?
            .set_default("rate_limit_burst", 20.0)?
            .set_default("shutdown_grace_secs", 30)?
            // jwt_secret намеренно без значения по умолчанию
            .add_source(Environment::with_prefix("WGCLOUD"))
            .build()?;

        cfg.try_deserialize()
    }

    /// Льготный период остановки как `Duration`.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

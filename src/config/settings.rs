use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// Настройки каталога каналов.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Ёмкость очередей без явного объявления (0: без ограничения)
    pub default_capacity: usize,
    /// Верхняя граница для объявляемой ёмкости (0: без проверки)
    pub max_capacity: usize,
}

/// Настройки процесса.
///
/// Источники по возрастанию приоритета: значения по умолчанию, TOML-файл,
/// переменные окружения `CHANBUS_*` (вложенные ключи через `__`, например
/// `CHANBUS_LOGGING__FORMAT=json`), аргументы командной строки.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_capacity: usize,
    pub max_capacity: usize,
    /// Шаг проверки остановки в блокирующих вызовах Lua
    pub pop_poll_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Lua-скрипты, запускаемые при старте
    pub scripts: Vec<PathBuf>,
    pub logging: LoggingConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_capacity: 0,
            max_capacity: 1_000_000,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let broker = BrokerConfig::default();
        Self {
            default_capacity: broker.default_capacity,
            max_capacity: broker.max_capacity,
            pop_poll_ms: 50,
            shutdown_timeout_ms: 5_000,
            scripts: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("default_capacity", defaults.default_capacity as u64)?
            .set_default("max_capacity", defaults.max_capacity as u64)?
            .set_default("pop_poll_ms", defaults.pop_poll_ms)?
            .set_default("shutdown_timeout_ms", defaults.shutdown_timeout_ms)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("CHANBUS")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("scripts")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            default_capacity: self.default_capacity,
            max_capacity: self.max_capacity,
        }
    }

    pub fn pop_poll(&self) -> Duration {
        Duration::from_millis(self.pop_poll_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

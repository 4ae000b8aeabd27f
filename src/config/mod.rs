//! Загрузка настроек процесса.

pub mod settings;

pub use settings::{BrokerConfig, Settings};

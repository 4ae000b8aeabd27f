use std::{collections::BTreeMap, env, fs, io, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Формат вывода событий.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Период ротации файла логов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Формат консоли; если не задан, берётся общий `format`
    pub format: Option<LogFormat>,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub filename: String,
    pub rotation: Rotation,
    pub format: LogFormat,
}

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень (`trace`..`error` или `off`)
    pub level: String,
    pub format: LogFormat,
    pub log_dir: PathBuf,
    pub console_enabled: bool,
    pub file_enabled: bool,
    pub console: ConsoleConfig,
    pub file: FileConfig,
    /// Уровни для отдельных целей, например `chanbus::script = "debug"`
    pub targets: BTreeMap<String, String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            format: None,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            filename: "chanbus.log".to_string(),
            rotation: Rotation::Daily,
            format: LogFormat::Json,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            log_dir: PathBuf::from("logs"),
            console_enabled: true,
            file_enabled: false,
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoggingConfig {
    /// Переменные `CHANBUS_LOG_*` поверх файла настроек.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("CHANBUS_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = env::var("CHANBUS_LOG_FORMAT") {
            match format.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("Ignoring CHANBUS_LOG_FORMAT: {e}"),
            }
        }
        if let Ok(dir) = env::var("CHANBUS_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
            self.file_enabled = true;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        check_level(&self.level)?;
        for (target, level) in &self.targets {
            if target.is_empty() {
                return Err("empty log target".to_string());
            }
            check_level(level)?;
        }
        if self.file_enabled && self.file.filename.trim().is_empty() {
            return Err("file logging enabled without a filename".to_string());
        }
        if !self.console_enabled && !self.file_enabled {
            return Err("both console and file logging are disabled".to_string());
        }
        Ok(())
    }

    pub fn ensure_log_dir(&self) -> io::Result<()> {
        if self.file_enabled {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: `info,chanbus::script=debug`.
    pub fn build_filter_directive(&self) -> String {
        let mut directive = self.level.to_ascii_lowercase();
        for (target, level) in &self.targets {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(&level.to_ascii_lowercase());
        }
        directive
    }

    pub fn console_format(&self) -> LogFormat {
        self.console.format.unwrap_or(self.format)
    }
}

fn check_level(level: &str) -> Result<(), String> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
        other => Err(format!("invalid log level '{other}'")),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

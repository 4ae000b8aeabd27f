use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Реестр типов сообщений
/// - 3xxx: Каталог каналов
/// - 4xxx: Очереди (ожидание, закрытие)
/// - 5xxx: Маршалинг между рантаймами
/// - 6xxx: IO / встроенный скриптовый рантайм
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `strum` для `AsRefStr`/`EnumIter` (feature = "strum").
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    NotImplemented = 1005,

    // === 2xxx: Реестр типов ===
    TypeNotFound = 2000,
    DuplicateType = 2001,
    InvalidSchema = 2002,

    // === 3xxx: Каталог каналов ===
    ChannelTypeMismatch = 3000,
    CapacityConfig = 3001,

    // === 4xxx: Очереди ===
    Timeout = 4000,
    Empty = 4001,
    ChannelClosed = 4002,

    // === 5xxx: Маршалинг ===
    MarshalFailed = 5000,
    TypeError = 5001,
    ArityMismatch = 5002,
    UnknownField = 5003,
    UnknownMethod = 5004,
    SerializationFailed = 5005,

    // === 6xxx: IO / скрипты ===
    Io = 6000,
    ScriptError = 6001,
    LockError = 6002,
}

/// Уровень события в логе, с которым сообщается об ошибке.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Возвращает `true`, если операцию с этим кодом имеет смысл повторить.
    ///
    /// Таймаут ожидания и пустая очередь являются ожидаемыми состояниями:
    /// вызывающая сторона повторяет попытку или делает паузу.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Empty | Self::LockError)
    }

    /// Уровень логирования для данного кода.
    ///
    /// Ожидаемые состояния очереди пишутся тише, ошибки скриптов громче.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::Timeout | Self::Empty => LogLevel::Debug,
            Self::TypeNotFound | Self::ChannelClosed => LogLevel::Info,
            Self::DuplicateType
            | Self::InvalidSchema
            | Self::ChannelTypeMismatch
            | Self::CapacityConfig
            | Self::InvalidArgs => LogLevel::Warn,
            Self::Internal | Self::Unexpected | Self::ScriptError => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        // Если включён feature "strum", используем human-readable имя (AsRefStr).
        // Иначе: Debug-имя.
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что retryable-коды помечаются корректно.
    #[test]
    fn test_retryable() {
        assert!(StatusCode::Timeout.is_retryable());
        assert!(StatusCode::Empty.is_retryable());
        assert!(!StatusCode::DuplicateType.is_retryable());
        assert!(!StatusCode::ChannelTypeMismatch.is_retryable());
    }

    #[test]
    fn test_try_from_u32() {
        let n = StatusCode::TypeNotFound.code();
        assert_eq!(StatusCode::try_from(n).unwrap(), StatusCode::TypeNotFound);
        assert!(StatusCode::try_from(99999).is_err());
    }

    #[test]
    fn test_code_and_into() {
        let c = StatusCode::Timeout;
        assert_eq!(c.code(), 4000);
        let n: u32 = c.into();
        assert_eq!(n, 4000);
    }

    /// Тест проверяет отображаемый уровень логирования для разных кодов.
    #[test]
    fn test_log_level_mappings() {
        assert_eq!(StatusCode::Success.log_level(), LogLevel::Trace);
        assert_eq!(StatusCode::Timeout.log_level(), LogLevel::Debug);
        assert_eq!(StatusCode::DuplicateType.log_level(), LogLevel::Warn);
        assert_eq!(StatusCode::Internal.log_level(), LogLevel::Error);
    }

    /// Тест проверяет формат `Display`: строка должна содержать имя варианта и
    /// числовой код.
    #[test]
    fn test_display_contains_name_and_code() {
        let s = format!("{}", StatusCode::ChannelTypeMismatch);
        assert!(
            s.contains("3000"),
            "Display must contain code 3000, got: {s}"
        );
        assert!(
            s.contains("ChannelTypeMismatch"),
            "Display must contain variant name, got: {s}"
        );
    }
}

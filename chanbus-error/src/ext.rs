use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок брокера (object-safe).
///
/// Код статуса определяет, как ошибка видна скрипту и с каким уровнем
/// она попадает в лог.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Код статуса ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any),
    /// чтобы можно было выполнить downcast к конкретному типу.
    fn as_any(&self) -> &dyn Any;

    /// Сообщение, которое отдаётся во встроенный рантайм.
    ///
    /// Для внутренних ошибок возвращает `"internal broker error"`.
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal | StatusCode::Unexpected => {
                "internal broker error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{any::Any, error::Error, fmt};

    use super::*;

    // Вспомогательный тип ошибки без переопределения status_code (использует
    // default = Internal).
    #[derive(Debug)]
    struct DefaultError(pub &'static str);

    impl fmt::Display for DefaultError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "DefaultError: {}", self.0)
        }
    }

    impl Error for DefaultError {}

    impl ErrorExt for DefaultError {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct TimeoutLike(pub &'static str);

    impl fmt::Display for TimeoutLike {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "Timeout: {}", self.0)
        }
    }

    impl Error for TimeoutLike {}

    impl ErrorExt for TimeoutLike {
        fn status_code(&self) -> StatusCode {
            StatusCode::Timeout
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Тест проверяет, что по умолчанию статус ошибки: `Internal`.
    #[test]
    fn test_default_status_code_is_internal() {
        let e = DefaultError("oops");
        assert_eq!(e.status_code(), StatusCode::Internal);
    }

    /// Тест проверяет, что внутренние детали не уходят во встроенный рантайм.
    #[test]
    fn test_client_message_internal() {
        let e = DefaultError("sensitive");
        assert_eq!(e.client_message(), "internal broker error");
    }

    #[test]
    fn test_client_message_non_internal() {
        let e = TimeoutLike("pop");
        assert_eq!(e.client_message(), e.to_string());
    }

    /// Тест проверяет, что `as_any` позволяет выполнить downcast к конкретному
    /// типу.
    #[test]
    fn test_as_any_downcast() {
        let e = TimeoutLike("x");
        let down = e.as_any().downcast_ref::<TimeoutLike>();
        assert_eq!(down.map(|d| d.0), Some("x"));
    }
}

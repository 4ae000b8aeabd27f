use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки преобразования сообщений между рантаймами.
///
/// Возникают при регистрации схемы (неподдерживаемый тип поля, неверный
/// конструктор) или при `push`/`pop` через мост. Не портят содержимое очереди.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// Тип поля неизвестен или ссылается на незарегистрированный тип
    UnsupportedFieldType {
        type_id: String,
        field: String,
        field_type: String,
    },
    /// Схема противоречива (дубликаты полей, конструктор с чужим полем)
    InvalidSchema { type_id: String, reason: String },
    /// Значение содержит поле, которого нет в схеме
    UnknownField { type_id: String, field: String },
    /// В значении отсутствует обязательное поле
    MissingField { type_id: String, field: String },
    /// Значение не совпадает с ожидаемым типом
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    /// Число аргументов не совпадает ни с одной сигнатурой
    ArityMismatch {
        type_id: String,
        target: String,
        expected: String,
        actual: usize,
    },
    /// Метод не зарегистрирован или не имеет обработчика
    UnknownMethod { type_id: String, method: String },
    /// Попытка записи в поле только для чтения
    ReadOnlyField { type_id: String, field: String },
    /// Ошибка serde при построении нативного значения
    Serde { type_id: String, reason: String },
    /// Ошибка на стороне встроенного рантайма
    Runtime { reason: String },
}

impl std::fmt::Display for MarshalError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::UnsupportedFieldType {
                type_id,
                field,
                field_type,
            } => write!(
                f,
                "unsupported field type '{field_type}' for {type_id}.{field}"
            ),
            Self::InvalidSchema { type_id, reason } => {
                write!(f, "invalid schema for '{type_id}': {reason}")
            }
            Self::UnknownField { type_id, field } => {
                write!(f, "'{type_id}' has no field '{field}'")
            }
            Self::MissingField { type_id, field } => {
                write!(f, "missing field '{field}' for '{type_id}'")
            }
            Self::TypeMismatch {
                path,
                expected,
                actual,
            } => write!(f, "type mismatch at '{path}': expected {expected}, got {actual}"),
            Self::ArityMismatch {
                type_id,
                target,
                expected,
                actual,
            } => write!(
                f,
                "{type_id}.{target}: no signature takes {actual} argument(s), expected {expected}"
            ),
            Self::UnknownMethod { type_id, method } => {
                write!(f, "'{type_id}' has no callable method '{method}'")
            }
            Self::ReadOnlyField { type_id, field } => {
                write!(f, "field {type_id}.{field} is read-only")
            }
            Self::Serde { type_id, reason } => {
                write!(f, "cannot convert '{type_id}': {reason}")
            }
            Self::Runtime { reason } => write!(f, "runtime conversion failed: {reason}"),
        }
    }
}

impl std::error::Error for MarshalError {}

impl ErrorExt for MarshalError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedFieldType { .. } | Self::TypeMismatch { .. } => StatusCode::TypeError,
            Self::InvalidSchema { .. } => StatusCode::InvalidSchema,
            Self::UnknownField { .. } | Self::MissingField { .. } | Self::ReadOnlyField { .. } => {
                StatusCode::UnknownField
            }
            Self::ArityMismatch { .. } => StatusCode::ArityMismatch,
            Self::UnknownMethod { .. } => StatusCode::UnknownMethod,
            Self::Serde { .. } => StatusCode::SerializationFailed,
            Self::Runtime { .. } => StatusCode::MarshalFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_mismatch() {
        let err = MarshalError::ArityMismatch {
            type_id: "MSG".to_string(),
            target: "new".to_string(),
            expected: "0 or 2".to_string(),
            actual: 1,
        };
        assert_eq!(err.status_code(), StatusCode::ArityMismatch);
        assert!(err.to_string().contains("MSG.new"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = MarshalError::TypeMismatch {
            path: "MSG.id".to_string(),
            expected: "int".to_string(),
            actual: "string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch at 'MSG.id': expected int, got string"
        );
    }
}

use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки реестра типов сообщений.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Тип уже зарегистрирован с другой формой
    DuplicateType { type_id: String },
    /// Тип не зарегистрирован
    NotFound { type_id: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::DuplicateType { type_id } => {
                write!(f, "payload type '{type_id}' already registered with a different shape")
            }
            Self::NotFound { type_id } => write!(f, "payload type '{type_id}' is not registered"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl ErrorExt for RegistryError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateType { .. } => StatusCode::DuplicateType,
            Self::NotFound { .. } => StatusCode::TypeNotFound,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

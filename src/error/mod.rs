use std::any::Any;

use chanbus_error::{
    ChannelError, ErrorExt, MarshalError, RecvError, RegistryError, StatusCode, TryRecvError,
};
use thiserror::Error;

/// Общая ошибка операций брокера.
///
/// Объединяет ошибки реестра, каталога, очередей и маршалинга, чтобы
/// операции, затрагивающие несколько подсистем, возвращали один тип.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Recv(#[from] RecvError),
    #[error(transparent)]
    TryRecv(#[from] TryRecvError),
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    /// Текст ошибки Lua. Сама `mlua::Error` не `Send`, а ошибки брокера
    /// передаются между потоками.
    #[error("Lua error: {0}")]
    Lua(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

impl BrokerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Registry(e) => e.status_code(),
            Self::Channel(e) => e.status_code(),
            Self::Recv(e) => e.status_code(),
            Self::TryRecv(e) => e.status_code(),
            Self::Marshal(e) => e.status_code(),
            Self::Lua(_) => StatusCode::ScriptError,
        }
    }

    /// Ожидаемое состояние (таймаут, пустая очередь), а не сбой.
    pub fn is_retryable(&self) -> bool {
        self.status_code().is_retryable()
    }
}

impl ErrorExt for BrokerError {
    fn status_code(&self) -> StatusCode {
        BrokerError::status_code(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Registry(e) => e.client_message(),
            Self::Channel(e) => e.client_message(),
            Self::Recv(e) => e.client_message(),
            Self::TryRecv(e) => e.client_message(),
            Self::Marshal(e) => e.client_message(),
            Self::Lua(e) => e.clone(),
        }
    }
}

impl From<mlua::Error> for BrokerError {
    fn from(err: mlua::Error) -> Self {
        Self::Lua(err.to_string())
    }
}

impl From<BrokerError> for mlua::Error {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Lua(message) => mlua::Error::runtime(message),
            other => mlua::Error::external(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use chanbus_error::StackError;

    use super::*;

    #[test]
    fn test_status_codes_pass_through() {
        let err: BrokerError = ChannelError::CapacityConfig {
            requested: -1,
            reason: "negative".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CapacityConfig);

        let err: BrokerError = TryRecvError::Empty.into();
        assert!(err.is_retryable());
        assert_eq!(err.client_message(), "empty");
    }

    #[test]
    fn test_into_stack_error() {
        let err: BrokerError = RegistryError::NotFound {
            type_id: "X".into(),
        }
        .into();
        let stack = StackError::from(err).context("opening channel");
        assert_eq!(stack.status_code(), StatusCode::TypeNotFound);
        assert!(stack.downcast_ref::<BrokerError>().is_some());
    }

    #[test]
    fn test_lua_error_crosses_threads() {
        let err: BrokerError = mlua::Error::runtime("script.lua:3: boom").into();
        let handle = std::thread::spawn(move || err.to_string());
        assert!(handle.join().unwrap().contains("boom"));

        let stack = StackError::from(BrokerError::Lua("bad".into()));
        assert_eq!(stack.status_code(), StatusCode::ScriptError);
    }

    #[test]
    fn test_into_lua_error_keeps_message() {
        let err: BrokerError = RecvError::Timeout { waited_ms: 3 }.into();
        let lua: mlua::Error = err.into();
        assert!(lua.to_string().contains("timed out"));
    }
}

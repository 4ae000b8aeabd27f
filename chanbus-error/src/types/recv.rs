use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки блокирующего получения сообщений.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvError {
    /// Время ожидания истекло, сообщений не появилось
    Timeout { waited_ms: u64 },
    /// Очередь закрыта при остановке и полностью вычитана
    Closed { channel: String },
}

/// Ошибки неблокирующего получения сообщений.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryRecvError {
    /// Нет доступных сообщений
    Empty,
    /// Очередь закрыта и пуста
    Closed { channel: String },
}

impl std::fmt::Display for RecvError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Timeout { waited_ms } => write!(f, "pop timed out after {waited_ms} ms"),
            Self::Closed { channel } => write!(f, "channel '{channel}' is closed"),
        }
    }
}

impl std::error::Error for RecvError {}

impl ErrorExt for RecvError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::Closed { .. } => StatusCode::ChannelClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Timeout { .. } => "timeout".to_string(),
            Self::Closed { .. } => "closed".to_string(),
        }
    }
}

impl std::fmt::Display for TryRecvError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "no messages available"),
            Self::Closed { channel } => write!(f, "channel '{channel}' is closed"),
        }
    }
}

impl std::error::Error for TryRecvError {}

impl ErrorExt for TryRecvError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Empty => StatusCode::Empty,
            Self::Closed { .. } => StatusCode::ChannelClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::Empty => "empty".to_string(),
            Self::Closed { .. } => "closed".to_string(),
        }
    }
}

impl From<TryRecvError> for RecvError {
    fn from(err: TryRecvError) -> Self {
        match err {
            TryRecvError::Empty => RecvError::Timeout { waited_ms: 0 },
            TryRecvError::Closed { channel } => RecvError::Closed { channel },
        }
    }
}

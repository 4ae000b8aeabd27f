use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки каталога каналов.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Канал уже существует с другим типом или другой объявленной ёмкостью
    ChannelTypeMismatch {
        channel: String,
        existing: String,
        requested: String,
    },
    /// Некорректная ёмкость очереди
    CapacityConfig { requested: i64, reason: String },
}

impl std::fmt::Display for ChannelError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::ChannelTypeMismatch {
                channel,
                existing,
                requested,
            } => write!(
                f,
                "channel '{channel}' conflict: existing {existing}, requested {requested}"
            ),
            Self::CapacityConfig { requested, reason } => {
                write!(f, "invalid queue capacity {requested}: {reason}")
            }
        }
    }
}

impl std::error::Error for ChannelError {}

impl ErrorExt for ChannelError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ChannelTypeMismatch { .. } => StatusCode::ChannelTypeMismatch,
            Self::CapacityConfig { .. } => StatusCode::CapacityConfig,
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
    fn test_type_mismatch_display() {
        let err = ChannelError::ChannelTypeMismatch {
            channel: "link_A".to_string(),
            existing: "type 'MSG'".to_string(),
            requested: "type 'int'".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::ChannelTypeMismatch);
        let s = err.to_string();
        assert!(s.contains("link_A") && s.contains("'MSG'") && s.contains("'int'"));
    }

    #[test]
    fn test_capacity_config_display() {
        let err = ChannelError::CapacityConfig {
            requested: -3,
            reason: "must not be negative".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::CapacityConfig);
        assert!(err.to_string().contains("-3"));
    }
}

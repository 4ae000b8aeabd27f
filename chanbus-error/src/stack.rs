use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка брокера вместе с цепочкой контекста, накопленной по пути наверх.
///
/// Корневая ошибка разделяется через `Arc`: `StackError` дёшево клонируется
/// и передаётся из потока скрипта в поток, который о нём отчитывается.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    frames: Vec<Frame>,
}

/// Звено контекста: что делалось и в каком месте кода.
#[derive(Debug, Clone)]
pub struct Frame {
    pub message: String,
    pub location: &'static Location<'static>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            frames: Vec::new(),
        }
    }

    /// Добавляет внешнее звено контекста.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        self.frames.push(Frame {
            message: msg.into(),
            location: Location::caller(),
        });
        self
    }

    /// Код статуса корневой ошибки. Контекст его не меняет.
    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    /// Сообщение для встроенного рантайма, без контекста.
    pub fn client_message(&self) -> String {
        self.root.client_message()
    }

    /// Звенья контекста, от самого внутреннего к внешнему.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    /// Уровень, с которым о такой ошибке пишется событие в лог.
    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("StackError");
        debug.field("root", &self.root.to_string());
        debug.field("status_code", &self.status_code());
        if !self.frames.is_empty() {
            let frames: Vec<String> = self
                .frames
                .iter()
                .map(|fr| format!("{} at {}:{}", fr.message, fr.location.file(), fr.location.line()))
                .collect();
            debug.field("frames", &frames);
        }
        debug.finish()
    }
}

/// Внешний контекст печатается первым: `running script a.lua: reading ...: <ошибка>`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for frame in self.frames.iter().rev() {
            write!(f, "{}: ", frame.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

//! Реестр типов сообщений.
//!
//! - `schema`: декларативное описание формы типа (`PayloadType`).
//! - `payload`: трейт `Payload` для нативных типов и встроенные скаляры.
//! - `registry`: таблица `MessageRegistry` с регистрацией и поиском.
//! - `validate`: проверка значений в нейтральном представлении.

pub mod payload;
#[allow(clippy::module_inception)]
pub mod registry;
pub mod schema;
pub mod validate;

pub use payload::*;
pub use registry::*;
pub use schema::*;
pub use validate::{conform_payload, default_payload};

//! Мост между нативными дескрипторами и встроенным рантаймом.
//!
//! - `erased`: очереди без параметра типа, работающие с нейтральным
//!   представлением сообщений (`serde_json::Value`).
//! - `lua`: установка API брокера в состояние Lua.

pub mod erased;
pub mod lua;

pub use erased::*;
pub use lua::{lua_to_json, LuaBridge};

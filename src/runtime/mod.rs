//! Жизненный цикл рабочих потоков и запуск скриптов.

pub mod lifecycle;
pub mod script;

pub use lifecycle::*;
pub use script::{run_script, spawn_script};

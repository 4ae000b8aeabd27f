//! Именованные объекты, общие для потоков и рантаймов процесса.

pub mod named;
pub mod sync;

pub use named::NamedObjects;
pub use sync::{SyncCell, SyncValue};

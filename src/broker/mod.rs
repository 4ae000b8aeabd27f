//! Каналы и очереди.
//!
//! - `queue`: FIFO-очередь с вытеснением самого старого сообщения.
//! - `directory`: каталог каналов «имя → очередь».
//! - `handle`: дескрипторы `Publisher` и `Subscriber`.
//! - `port`: привязка нативного дескриптора к очереди любого представления.
//! - `broker`: общее состояние процесса (`Broker`).

#[allow(clippy::module_inception)]
pub mod broker;
pub mod directory;
pub mod handle;
pub(crate) mod port;
pub mod queue;

pub use broker::*;
pub use directory::{ChannelDirectory, ChannelInfo};
pub use handle::*;
pub use queue::*;

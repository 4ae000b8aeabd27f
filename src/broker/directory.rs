use std::{
    any::{type_name, Any},
    sync::Arc,
};

use chanbus_error::ChannelError;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{port::Port, ChannelStats, Queue};

/// Очередь без параметра типа: то, что каталог умеет делать с любой
/// очередью, не зная типа сообщений.
pub(crate) trait ChannelQueue: Send + Sync {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn close(&self);
    fn stats(&self) -> ChannelStats;
    fn declare_capacity(
        &self,
        capacity: usize,
    ) -> Result<(), usize>;
    fn element_type(&self) -> &'static str;
}

impl<T: Send + 'static> ChannelQueue for Queue<T> {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn close(&self) {
        Queue::close(self)
    }

    fn stats(&self) -> ChannelStats {
        Queue::stats(self)
    }

    fn declare_capacity(
        &self,
        capacity: usize,
    ) -> Result<(), usize> {
        Queue::declare_capacity(self, capacity)
    }

    fn element_type(&self) -> &'static str {
        type_name::<T>()
    }
}

struct ChannelEntry {
    type_id: Arc<str>,
    queue: Arc<dyn ChannelQueue>,
}

/// Сведения о канале для диагностики.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub type_id: String,
    pub stats: ChannelStats,
}

/// Каталог каналов: имя → единственная очередь.
///
/// Очередь создаётся при первом обращении любого издателя или подписчика и
/// живёт до конца процесса. Конкурентные обращения к одному имени
/// сериализуются на записи `DashMap`, поэтому очередь всегда одна.
pub struct ChannelDirectory {
    channels: DashMap<Arc<str>, ChannelEntry>,
    default_capacity: usize,
    max_capacity: usize,
}

impl ChannelDirectory {
    /// `default_capacity` применяется к очередям без явной ёмкости
    /// (0: без ограничения); `max_capacity` ограничивает объявления сверху.
    pub fn new(
        default_capacity: usize,
        max_capacity: usize,
    ) -> Self {
        Self {
            channels: DashMap::new(),
            default_capacity,
            max_capacity,
        }
    }

    /// Возвращает очередь канала, создавая её при необходимости.
    ///
    /// Ошибка `ChannelTypeMismatch`, если канал уже существует с другим
    /// типом сообщений, другим представлением или с другой явно
    /// объявленной ёмкостью.
    pub fn get_or_create<T: Send + 'static>(
        &self,
        channel: &str,
        type_id: &str,
        capacity: Option<usize>,
    ) -> Result<Arc<Queue<T>>, ChannelError> {
        match self.open::<T>(channel, type_id, capacity, false)? {
            Port::Native(queue) => Ok(queue),
            Port::Neutral { .. } => Err(mismatch(
                channel,
                format!("representation {}", type_name::<Value>()),
                format!("representation {}", type_name::<T>()),
            )),
        }
    }

    /// То же, что [`ChannelDirectory::get_or_create`], но канал, который
    /// уже хранит сообщения в нейтральном представлении, тоже подходит:
    /// дескриптор тогда кодирует значения сам.
    pub(crate) fn get_or_adapt<T: Send + 'static>(
        &self,
        channel: &str,
        type_id: &str,
        capacity: Option<usize>,
    ) -> Result<Port<T>, ChannelError> {
        self.open::<T>(channel, type_id, capacity, true)
    }

    fn open<T: Send + 'static>(
        &self,
        channel: &str,
        type_id: &str,
        capacity: Option<usize>,
        adapt: bool,
    ) -> Result<Port<T>, ChannelError> {
        if let Some(cap) = capacity {
            self.check_capacity(cap as u64)?;
        }

        match self.channels.entry(Arc::from(channel)) {
            Entry::Occupied(entry) => {
                let existing = entry.get();
                if &*existing.type_id != type_id {
                    return Err(mismatch(
                        channel,
                        format!("type '{}'", existing.type_id),
                        format!("type '{type_id}'"),
                    ));
                }
                let element = existing.queue.element_type();
                let port = match existing.queue.clone().as_any().downcast::<Queue<T>>() {
                    Ok(queue) => Port::Native(queue),
                    Err(any) => match any.downcast::<Queue<Value>>() {
                        Ok(queue) if adapt => Port::Neutral {
                            queue,
                            type_id: existing.type_id.clone(),
                        },
                        _ => {
                            return Err(mismatch(
                                channel,
                                format!("representation {element}"),
                                format!("representation {}", type_name::<T>()),
                            ))
                        }
                    },
                };
                if let Some(cap) = capacity {
                    port.declare_capacity(cap).map_err(|declared| {
                        mismatch(
                            channel,
                            format!("capacity {declared}"),
                            format!("capacity {cap}"),
                        )
                    })?;
                }
                Ok(port)
            }
            Entry::Vacant(entry) => {
                let name = entry.key().clone();
                let queue = Arc::new(Queue::<T>::with_default(
                    name,
                    capacity,
                    self.default_capacity,
                ));
                debug!(
                    channel,
                    type_id,
                    capacity = ?queue.capacity(),
                    "channel created"
                );
                entry.insert(ChannelEntry {
                    type_id: Arc::from(type_id),
                    queue: queue.clone(),
                });
                Ok(Port::Native(queue))
            }
        }
    }

    /// Проверяет ёмкость из внешнего источника (Lua, настройки).
    pub fn capacity_from_i64(
        &self,
        requested: i64,
    ) -> Result<usize, ChannelError> {
        if requested < 0 {
            return Err(ChannelError::CapacityConfig {
                requested,
                reason: "capacity must not be negative".to_string(),
            });
        }
        self.check_capacity(requested as u64)?;
        Ok(requested as usize)
    }

    pub fn type_of(
        &self,
        channel: &str,
    ) -> Option<String> {
        self.channels.get(channel).map(|e| e.type_id.to_string())
    }

    pub fn stats(
        &self,
        channel: &str,
    ) -> Option<ChannelStats> {
        self.channels.get(channel).map(|e| e.queue.stats())
    }

    /// Все каналы, отсортированные по имени.
    pub fn channels(&self) -> Vec<ChannelInfo> {
        let mut out: Vec<ChannelInfo> = self
            .channels
            .iter()
            .map(|e| ChannelInfo {
                name: e.key().to_string(),
                type_id: e.type_id.to_string(),
                stats: e.queue.stats(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Закрывает все очереди; заблокированные получатели просыпаются.
    pub fn close_all(&self) {
        let queues: Vec<Arc<dyn ChannelQueue>> =
            self.channels.iter().map(|e| e.queue.clone()).collect();
        for queue in &queues {
            queue.close();
        }
        debug!(channels = queues.len(), "all channels closed");
    }

    fn check_capacity(
        &self,
        requested: u64,
    ) -> Result<(), ChannelError> {
        if self.max_capacity > 0 && requested > self.max_capacity as u64 {
            return Err(ChannelError::CapacityConfig {
                requested: i64::try_from(requested).unwrap_or(i64::MAX),
                reason: format!("exceeds max_capacity {}", self.max_capacity),
            });
        }
        Ok(())
    }
}

fn mismatch(
    channel: &str,
    existing: String,
    requested: String,
) -> ChannelError {
    ChannelError::ChannelTypeMismatch {
        channel: channel.to_string(),
        existing,
        requested,
    }
}

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chanbus_error::{RecvError, TryRecvError};
use serde_json::Value;
use tracing::warn;

use super::{ChannelStats, PushOutcome, Queue};
use crate::registry::{self, Payload};

/// Очередь, к которой привязан нативный дескриптор.
///
/// Канал, впервые открытый из встроенного рантайма, хранит сообщения в
/// нейтральном представлении. Нативный дескриптор такого канала кодирует
/// сообщения при отправке и декодирует при получении.
pub(crate) enum Port<T> {
    Native(Arc<Queue<T>>),
    Neutral {
        queue: Arc<Queue<Value>>,
        type_id: Arc<str>,
    },
}

impl<T> Port<T> {
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Native(q) => q.name(),
            Self::Neutral { queue, .. } => queue.name(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Native(q) => q.len(),
            Self::Neutral { queue, .. } => queue.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn capacity(&self) -> Option<usize> {
        match self {
            Self::Native(q) => q.capacity(),
            Self::Neutral { queue, .. } => queue.capacity(),
        }
    }

    pub(crate) fn stats(&self) -> ChannelStats {
        match self {
            Self::Native(q) => q.stats(),
            Self::Neutral { queue, .. } => queue.stats(),
        }
    }

    pub(crate) fn declare_capacity(
        &self,
        capacity: usize,
    ) -> Result<(), usize> {
        match self {
            Self::Native(q) => q.declare_capacity(capacity),
            Self::Neutral { queue, .. } => queue.declare_capacity(capacity),
        }
    }

    pub(crate) fn same_queue(
        &self,
        other: &Self,
    ) -> bool {
        match (self, other) {
            (Self::Native(a), Self::Native(b)) => Arc::ptr_eq(a, b),
            (Self::Neutral { queue: a, .. }, Self::Neutral { queue: b, .. }) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn is_neutral(&self) -> bool {
        matches!(self, Self::Neutral { .. })
    }
}

impl<T: Payload> Port<T> {
    /// Сообщение, которое не удалось закодировать, отбрасывается: отправка
    /// не возвращает ошибок.
    pub(crate) fn push(
        &self,
        msg: T,
    ) -> PushOutcome {
        match self {
            Self::Native(q) => q.push(msg),
            Self::Neutral { queue, type_id } => match registry::encode(&msg, type_id) {
                Ok(value) => queue.push(value),
                Err(e) => {
                    warn!(channel = queue.name(), error = %e, "message could not be encoded, discarded");
                    PushOutcome::Discarded
                }
            },
        }
    }

    pub(crate) fn pop(&self) -> Result<T, RecvError> {
        match self {
            Self::Native(q) => q.pop(),
            Self::Neutral { queue, type_id } => loop {
                if let Some(msg) = decoded(queue, type_id, queue.pop()?) {
                    return Ok(msg);
                }
            },
        }
    }

    pub(crate) fn pop_for(
        &self,
        timeout: Duration,
    ) -> Result<T, RecvError> {
        match self {
            Self::Native(q) => q.pop_for(timeout),
            Self::Neutral { queue, type_id } => {
                let deadline = Instant::now().checked_add(timeout);
                let mut value = queue.pop_for(timeout)?;
                loop {
                    if let Some(msg) = decoded(queue, type_id, value) {
                        return Ok(msg);
                    }
                    value = match deadline {
                        Some(deadline) => queue.pop_until(deadline)?,
                        None => queue.pop()?,
                    };
                }
            }
        }
    }

    pub(crate) fn pop_until(
        &self,
        deadline: Instant,
    ) -> Result<T, RecvError> {
        match self {
            Self::Native(q) => q.pop_until(deadline),
            Self::Neutral { queue, type_id } => loop {
                if let Some(msg) = decoded(queue, type_id, queue.pop_until(deadline)?) {
                    return Ok(msg);
                }
            },
        }
    }

    pub(crate) fn try_pop(&self) -> Result<T, TryRecvError> {
        match self {
            Self::Native(q) => q.try_pop(),
            Self::Neutral { queue, type_id } => loop {
                if let Some(msg) = decoded(queue, type_id, queue.try_pop()?) {
                    return Ok(msg);
                }
            },
        }
    }
}

impl<T> Clone for Port<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Native(q) => Self::Native(q.clone()),
            Self::Neutral { queue, type_id } => Self::Neutral {
                queue: queue.clone(),
                type_id: type_id.clone(),
            },
        }
    }
}

/// Сообщение уже вынуто из очереди; если его нельзя декодировать, оно
/// теряется, остальное содержимое очереди не затронуто.
fn decoded<T: Payload>(
    queue: &Queue<Value>,
    type_id: &str,
    value: Value,
) -> Option<T> {
    match registry::decode(value, type_id) {
        Ok(msg) => Some(msg),
        Err(e) => {
            warn!(channel = queue.name(), error = %e, "message could not be decoded, dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn neutral(queue: &Arc<Queue<Value>>) -> Port<i64> {
        Port::Neutral {
            queue: queue.clone(),
            type_id: Arc::from("int"),
        }
    }

    #[test]
    fn test_neutral_port_round_trip() {
        let queue = Arc::new(Queue::new("n", None));
        let port = neutral(&queue);
        port.push(7);
        assert_eq!(queue.try_pop().unwrap(), json!(7));

        queue.push(json!(8));
        assert_eq!(port.try_pop().unwrap(), 8);
        assert!(port.is_neutral());
    }

    /// Тест проверяет, что недекодируемое сообщение пропускается, а
    /// следующее доставляется.
    #[test]
    fn test_undecodable_message_skipped() {
        let queue = Arc::new(Queue::new("n", None));
        let port = neutral(&queue);
        queue.push(json!("text"));
        queue.push(json!(3));

        assert_eq!(port.pop_for(Duration::ZERO).unwrap(), 3);
        assert_eq!(port.try_pop(), Err(TryRecvError::Empty));
        assert_eq!(queue.stats().popped, 2);
    }

    #[test]
    fn test_same_queue_by_representation() {
        let queue = Arc::new(Queue::new("n", None));
        let a = neutral(&queue);
        assert!(a.same_queue(&a.clone()));
        let native: Port<i64> = Port::Native(Arc::new(Queue::new("n", None)));
        assert!(!a.same_queue(&native));
    }
}

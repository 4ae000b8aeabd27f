use std::{
    fmt,
    time::{Duration, Instant},
};

use chanbus_error::{RecvError, TryRecvError};

use super::{port::Port, Broker, ChannelStats};
use crate::{error::BrokerResult, registry::Payload};

/// Издатель: ссылка на очередь канала, через которую сообщения только
/// отправляются.
///
/// Копирование дешёвое, все копии пишут в одну очередь.
pub struct Publisher<T> {
    port: Port<T>,
}

/// Подписчик: ссылка на очередь канала для получения сообщений.
///
/// Все подписчики одного канала делят одну очередь и конкурируют за
/// сообщения: каждое сообщение получает ровно один из них.
pub struct Subscriber<T> {
    port: Port<T>,
}

impl<T: Payload> Publisher<T> {
    /// Регистрирует `T` (идемпотентно) и открывает канал без объявления
    /// ёмкости.
    pub fn new(
        broker: &Broker,
        channel: &str,
    ) -> BrokerResult<Self> {
        Ok(Self {
            port: broker.open_port::<T>(channel, None)?,
        })
    }

    /// Отправляет сообщение. Никогда не блокирует; при переполнении
    /// вытесняется самое старое сообщение очереди.
    pub fn push(
        &self,
        msg: T,
    ) {
        self.port.push(msg);
    }
}

impl<T: Payload> Subscriber<T> {
    /// Открывает канал; ёмкость берётся из настроек, пока её никто не
    /// объявил явно.
    pub fn new(
        broker: &Broker,
        channel: &str,
    ) -> BrokerResult<Self> {
        Ok(Self {
            port: broker.open_port::<T>(channel, None)?,
        })
    }

    /// Открывает канал и объявляет его ёмкость (0: без ограничения).
    pub fn with_capacity(
        broker: &Broker,
        channel: &str,
        capacity: usize,
    ) -> BrokerResult<Self> {
        Ok(Self {
            port: broker.open_port::<T>(channel, Some(capacity))?,
        })
    }

    /// Блокирует поток, пока не появится сообщение.
    ///
    /// Ошибка возможна только после закрытия канала при остановке.
    pub fn pop(&self) -> Result<T, RecvError> {
        self.port.pop()
    }

    pub fn pop_for(
        &self,
        timeout: Duration,
    ) -> Result<T, RecvError> {
        self.port.pop_for(timeout)
    }

    /// То же, что `pop_for`, с таймаутом в миллисекундах.
    pub fn pop_for_ms(
        &self,
        timeout_ms: u64,
    ) -> Result<T, RecvError> {
        self.port.pop_for(Duration::from_millis(timeout_ms))
    }

    pub fn pop_until(
        &self,
        deadline: Instant,
    ) -> Result<T, RecvError> {
        self.port.pop_until(deadline)
    }

    pub fn try_pop(&self) -> Result<T, TryRecvError> {
        self.port.try_pop()
    }

    pub fn len(&self) -> usize {
        self.port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.port.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.port.capacity()
    }
}

macro_rules! impl_handle_common {
    ($handle:ident) => {
        impl<T> $handle<T> {
            pub fn channel(&self) -> &str {
                self.port.name()
            }

            pub fn stats(&self) -> ChannelStats {
                self.port.stats()
            }

            /// Указывают ли два дескриптора на одну очередь.
            pub fn same_queue(
                &self,
                other: &Self,
            ) -> bool {
                self.port.same_queue(&other.port)
            }
        }

        impl<T> Clone for $handle<T> {
            fn clone(&self) -> Self {
                Self {
                    port: self.port.clone(),
                }
            }
        }

        impl<T> fmt::Debug for $handle<T> {
            fn fmt(
                &self,
                f: &mut fmt::Formatter<'_>,
            ) -> fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("channel", &self.port.name())
                    .field("neutral", &self.port.is_neutral())
                    .finish()
            }
        }
    };
}

impl_handle_common!(Publisher);
impl_handle_common!(Subscriber);

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::config::BrokerConfig;

    fn broker() -> Broker {
        Broker::new(BrokerConfig::default())
    }

    /// Тест проверяет, что подписчик, созданный раньше издателя, получает
    /// сообщение.
    #[test]
    fn test_subscriber_before_publisher() {
        let broker = broker();
        let sub = Subscriber::<i64>::new(&broker, "link_A").unwrap();
        assert!(sub.pop_for_ms(10).is_err());

        let publisher = Publisher::<i64>::new(&broker, "link_A").unwrap();
        publisher.push(5);
        assert_eq!(sub.pop().unwrap(), 5);
        assert_eq!(sub.channel(), "link_A");
    }

    #[test]
    fn test_clones_share_queue() {
        let broker = broker();
        let publisher = Publisher::<String>::new(&broker, "c").unwrap();
        let copy = publisher.clone();
        let sub = Subscriber::<String>::new(&broker, "c").unwrap();
        let sub2 = sub.clone();
        assert!(sub.same_queue(&sub2));

        publisher.push("a".to_string());
        copy.push("b".to_string());
        assert_eq!(sub2.try_pop().unwrap(), "a");
        assert_eq!(sub.try_pop().unwrap(), "b");
    }

    #[test]
    fn test_competing_subscribers_get_each_message_once() {
        let broker = broker();
        let publisher = Publisher::<i64>::new(&broker, "work").unwrap();
        let subs: Vec<_> = (0..4)
            .map(|_| Subscriber::<i64>::new(&broker, "work").unwrap())
            .collect();

        for i in 0..400 {
            publisher.push(i);
        }

        let workers: Vec<_> = subs
            .into_iter()
            .map(|sub| {
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Ok(v) = sub.try_pop() {
                        got.push(v);
                    }
                    got
                })
            })
            .collect();

        let mut all: Vec<i64> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<_>>());
    }

    #[test]
    fn test_with_capacity_conflict() {
        let broker = broker();
        let sub = Subscriber::<i64>::with_capacity(&broker, "c", 2).unwrap();
        assert_eq!(sub.capacity(), Some(2));
        assert!(Subscriber::<i64>::with_capacity(&broker, "c", 3).is_err());
        assert!(Publisher::<i64>::new(&broker, "c").is_ok());
    }
}

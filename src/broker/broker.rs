use std::sync::Arc;

use chanbus_error::RegistryError;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use super::{port::Port, ChannelDirectory, ChannelInfo, ChannelStats, Publisher, Subscriber};
use crate::{
    bridge::DynQueue,
    config::BrokerConfig,
    error::BrokerResult,
    registry::{MessageRegistry, Payload, PayloadType, Registration},
    shared::NamedObjects,
};

/// Общее состояние процесса, создаётся один раз.
static GLOBAL: OnceCell<Arc<Broker>> = OnceCell::new();

/// Брокер сообщений: реестр типов, каталог каналов и именованные общие
/// объекты.
///
/// Обычно используется один экземпляр на процесс ([`Broker::global`]), но
/// независимые брокеры удобны в тестах.
pub struct Broker {
    registry: MessageRegistry,
    directory: ChannelDirectory,
    objects: NamedObjects,
    config: BrokerConfig,
}

impl Broker {
    /// Создаёт брокер со встроенными скалярными типами.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            registry: MessageRegistry::with_builtins(),
            directory: ChannelDirectory::new(config.default_capacity, config.max_capacity),
            objects: NamedObjects::new(),
            config,
        }
    }

    /// Явная инициализация общего брокера до первого использования.
    ///
    /// Повторный вызов не меняет уже созданный брокер.
    pub fn init_global(config: BrokerConfig) -> Arc<Broker> {
        let mut created = false;
        let broker = GLOBAL.get_or_init(|| {
            created = true;
            Arc::new(Broker::new(config.clone()))
        });
        if created {
            info!(
                default_capacity = config.default_capacity,
                max_capacity = config.max_capacity,
                "global broker initialized"
            );
        } else if broker.config != config {
            warn!("global broker already initialized, new configuration ignored");
        }
        broker.clone()
    }

    /// Общий брокер процесса; без `init_global` создаётся с настройками
    /// по умолчанию.
    pub fn global() -> Arc<Broker> {
        GLOBAL
            .get_or_init(|| Arc::new(Broker::new(BrokerConfig::default())))
            .clone()
    }

    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &ChannelDirectory {
        &self.directory
    }

    pub fn objects(&self) -> &NamedObjects {
        &self.objects
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn register<T: Payload>(&self) -> BrokerResult<Registration> {
        self.registry.register::<T>()
    }

    pub fn register_schema(
        &self,
        schema: PayloadType,
    ) -> BrokerResult<Registration> {
        self.registry.register_dynamic(schema)
    }

    pub fn describe(
        &self,
        type_id: &str,
    ) -> Result<Arc<PayloadType>, RegistryError> {
        self.registry.describe(type_id)
    }

    pub fn publisher<T: Payload>(
        &self,
        channel: &str,
    ) -> BrokerResult<Publisher<T>> {
        Publisher::new(self, channel)
    }

    pub fn subscriber<T: Payload>(
        &self,
        channel: &str,
    ) -> BrokerResult<Subscriber<T>> {
        Subscriber::new(self, channel)
    }

    pub fn subscriber_with_capacity<T: Payload>(
        &self,
        channel: &str,
        capacity: usize,
    ) -> BrokerResult<Subscriber<T>> {
        Subscriber::with_capacity(self, channel, capacity)
    }

    /// Открывает канал со стороны встроенного рантайма по идентификатору
    /// типа. Очередь та же, что и у нативных дескрипторов.
    pub fn open_bridged(
        self: &Arc<Self>,
        type_id: &str,
        channel: &str,
        capacity: Option<usize>,
    ) -> BrokerResult<Arc<dyn DynQueue>> {
        let (schema, binding) = self.registry.binding(type_id)?;
        binding.open(self, schema, channel, capacity)
    }

    pub fn channel_stats(
        &self,
        channel: &str,
    ) -> Option<ChannelStats> {
        self.directory.stats(channel)
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.directory.channels()
    }

    /// Закрывает все каналы: заблокированные `pop` возвращают `Closed`
    /// после того, как очередь опустеет.
    pub fn close_all(&self) {
        self.directory.close_all();
    }

    /// Регистрация `T` фиксируется только после того, как канал открыт.
    pub(crate) fn open_port<T: Payload>(
        &self,
        channel: &str,
        capacity: Option<usize>,
    ) -> BrokerResult<Port<T>> {
        let schema = self.registry.prepare_native::<T>()?;
        let port = self
            .directory
            .get_or_adapt::<T>(channel, schema.type_id(), capacity)?;
        self.registry.commit_native::<T>(schema)?;
        Ok(port)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use chanbus_error::{ErrorExt, StatusCode};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::registry::FieldType;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl Payload for Point {
        fn payload_type() -> PayloadType {
            PayloadType::record("Point")
                .field("x", FieldType::Int)
                .field("y", FieldType::Int)
        }
    }

    #[test]
    fn test_handles_register_type() {
        let broker = Broker::default();
        assert!(!broker.registry().contains("Point"));
        let publisher = broker.publisher::<Point>("points").unwrap();
        assert!(broker.registry().contains("Point"));

        publisher.push(Point { x: 1, y: 2 });
        let sub = broker.subscriber::<Point>("points").unwrap();
        assert_eq!(sub.pop().unwrap(), Point { x: 1, y: 2 });
    }

    #[test]
    fn test_conflicting_shape_blocks_handle() {
        let broker = Broker::default();
        broker
            .register_schema(PayloadType::record("Point").field("x", FieldType::Float))
            .unwrap();
        let err = broker.publisher::<Point>("points").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::DuplicateType);
    }

    #[test]
    fn test_channel_type_mismatch() {
        let broker = Broker::default();
        broker.publisher::<i64>("c").unwrap();
        let err = broker.subscriber::<Point>("c").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::ChannelTypeMismatch);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Segment {
        from: Point,
        to: Point,
    }

    impl Payload for Segment {
        fn payload_type() -> PayloadType {
            PayloadType::record("Segment")
                .field("from", FieldType::Record("Point".into()))
                .field("to", FieldType::Record("Point".into()))
        }

        fn register_nested(registry: &MessageRegistry) -> BrokerResult<()> {
            registry.register::<Point>()?;
            Ok(())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Loose {
        at: Point,
    }

    impl Payload for Loose {
        fn payload_type() -> PayloadType {
            PayloadType::record("Loose").field("at", FieldType::Record("Point".into()))
        }
    }

    #[test]
    fn test_handles_register_nested_types() {
        let broker = Broker::default();
        let publisher = broker.publisher::<Segment>("segments").unwrap();
        assert!(broker.registry().contains("Point"));

        let segment = Segment {
            from: Point { x: 0, y: 0 },
            to: Point { x: 3, y: 4 },
        };
        publisher.push(segment.clone());
        let sub = broker.subscriber::<Segment>("segments").unwrap();
        assert_eq!(sub.try_pop().unwrap(), segment);
    }

    /// Тест проверяет, что без `register_nested` вложенный тип нужно
    /// зарегистрировать заранее.
    #[test]
    fn test_unregistered_nested_type_rejected() {
        let broker = Broker::default();
        let err = broker.publisher::<Loose>("loose").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TypeError);
        assert!(err.to_string().contains("Point"));
        assert!(!broker.registry().contains("Loose"));

        broker.register::<Point>().unwrap();
        assert!(broker.publisher::<Loose>("loose").is_ok());
    }

    /// Тест проверяет, что неудачное открытие канала не оставляет
    /// регистрацию типа.
    #[test]
    fn test_failed_open_does_not_register() {
        let broker = Broker::default();
        broker.publisher::<i64>("c").unwrap();
        let err = broker.subscriber::<Point>("c").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::ChannelTypeMismatch);
        assert!(!broker.registry().contains("Point"));
        assert!(broker.channels().iter().all(|c| c.type_id == "int"));
    }

    #[test]
    fn test_stats_and_close_all() {
        let broker = Broker::default();
        let p = broker.publisher::<i64>("c").unwrap();
        let s = broker.subscriber_with_capacity::<i64>("c", 1).unwrap();
        p.push(1);
        p.push(2);

        let stats = broker.channel_stats("c").unwrap();
        assert_eq!(stats.pushed, 2);
        assert_eq!(stats.evicted, 1);
        assert_eq!(broker.channels().len(), 1);
        assert!(broker.channel_stats("missing").is_none());

        broker.close_all();
        assert_eq!(s.pop().unwrap(), 2);
        assert_eq!(s.pop().unwrap_err().status_code(), StatusCode::ChannelClosed);
    }
}

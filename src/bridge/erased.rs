use std::{fmt, marker::PhantomData, sync::Arc, time::Duration};

use chanbus_error::MarshalError;
use serde_json::Value;
use tracing::warn;

use crate::{
    broker::{port::Port, Broker, ChannelStats, PushOutcome, Queue},
    error::BrokerResult,
    registry::{self, conform_payload, Payload, PayloadType},
};

/// Очередь канала, видимая из встроенного рантайма.
///
/// Сообщения входят и выходят в нейтральном представлении
/// (`serde_json::Value`), проверяются по схеме типа и переводятся в то
/// представление, в котором очередь хранит их на самом деле.
pub trait DynQueue: Send + Sync {
    fn channel(&self) -> &str;
    fn schema(&self) -> &Arc<PayloadType>;
    fn push_value(
        &self,
        value: Value,
    ) -> BrokerResult<PushOutcome>;
    fn pop_value(&self) -> BrokerResult<Value>;
    fn pop_value_for(
        &self,
        timeout: Duration,
    ) -> BrokerResult<Value>;
    fn try_pop_value(&self) -> BrokerResult<Value>;
    fn len(&self) -> usize;
    fn stats(&self) -> ChannelStats;
}

/// Привязка типа сообщения к способу хранения в очереди.
///
/// Нативный тип хранится как есть ([`TypedBinding`]), тип, описанный только
/// схемой, хранится в нейтральном представлении ([`DynamicBinding`]).
pub trait PayloadBinding: Send + Sync {
    fn open(
        &self,
        broker: &Arc<Broker>,
        schema: Arc<PayloadType>,
        channel: &str,
        capacity: Option<usize>,
    ) -> BrokerResult<Arc<dyn DynQueue>>;
}

pub struct TypedBinding<T>(PhantomData<fn() -> T>);

pub struct DynamicBinding;

type Encode<T> = fn(T, &str) -> Result<Value, MarshalError>;
type Decode<T> = fn(Value, &str) -> Result<T, MarshalError>;

struct BridgedQueue<T> {
    broker: Arc<Broker>,
    schema: Arc<PayloadType>,
    queue: Arc<Queue<T>>,
    encode: Encode<T>,
    decode: Decode<T>,
}

impl<T> TypedBinding<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for TypedBinding<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> PayloadBinding for TypedBinding<T> {
    fn open(
        &self,
        broker: &Arc<Broker>,
        schema: Arc<PayloadType>,
        channel: &str,
        capacity: Option<usize>,
    ) -> BrokerResult<Arc<dyn DynQueue>> {
        // Канал мог быть создан до нативной регистрации типа и хранить
        // нейтральные значения.
        let port = broker
            .directory()
            .get_or_adapt::<T>(channel, schema.type_id(), capacity)?;
        Ok(match port {
            Port::Native(queue) => Arc::new(BridgedQueue {
                broker: broker.clone(),
                schema,
                queue,
                encode: |msg, type_id| registry::encode(&msg, type_id),
                decode: registry::decode::<T>,
            }),
            Port::Neutral { queue, .. } => neutral(broker, schema, queue),
        })
    }
}

impl PayloadBinding for DynamicBinding {
    fn open(
        &self,
        broker: &Arc<Broker>,
        schema: Arc<PayloadType>,
        channel: &str,
        capacity: Option<usize>,
    ) -> BrokerResult<Arc<dyn DynQueue>> {
        let queue = broker
            .directory()
            .get_or_create::<Value>(channel, schema.type_id(), capacity)?;
        Ok(neutral(broker, schema, queue))
    }
}

fn neutral(
    broker: &Arc<Broker>,
    schema: Arc<PayloadType>,
    queue: Arc<Queue<Value>>,
) -> Arc<dyn DynQueue> {
    Arc::new(BridgedQueue {
        broker: broker.clone(),
        schema,
        queue,
        encode: |value, _| Ok(value),
        decode: |value, _| Ok(value),
    })
}

impl fmt::Debug for dyn DynQueue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("DynQueue")
            .field("channel", &self.channel())
            .field("type_id", &self.schema().type_id())
            .field("len", &self.len())
            .finish()
    }
}

impl<T> BridgedQueue<T> {
    fn outgoing(
        &self,
        msg: T,
    ) -> BrokerResult<Value> {
        // Сообщение уже вынуто из очереди; остальное содержимое не затронуто.
        (self.encode)(msg, self.schema.type_id()).map_err(|e| {
            warn!(channel = self.queue.name(), error = %e, "popped message could not be encoded");
            e.into()
        })
    }
}

impl<T: Send + 'static> DynQueue for BridgedQueue<T> {
    fn channel(&self) -> &str {
        self.queue.name()
    }

    fn schema(&self) -> &Arc<PayloadType> {
        &self.schema
    }

    fn push_value(
        &self,
        value: Value,
    ) -> BrokerResult<PushOutcome> {
        let value = conform_payload(self.broker.registry(), &self.schema, value)?;
        let msg = (self.decode)(value, self.schema.type_id())?;
        Ok(self.queue.push(msg))
    }

    fn pop_value(&self) -> BrokerResult<Value> {
        let msg = self.queue.pop()?;
        self.outgoing(msg)
    }

    fn pop_value_for(
        &self,
        timeout: Duration,
    ) -> BrokerResult<Value> {
        let msg = self.queue.pop_for(timeout)?;
        self.outgoing(msg)
    }

    fn try_pop_value(&self) -> BrokerResult<Value> {
        let msg = self.queue.try_pop()?;
        self.outgoing(msg)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn stats(&self) -> ChannelStats {
        self.queue.stats()
    }
}

#[cfg(test)]
mod tests {
    use chanbus_error::StatusCode;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::registry::FieldType;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Msg {
        id: i64,
        msg: String,
    }

    impl Payload for Msg {
        fn payload_type() -> PayloadType {
            PayloadType::record("MSG")
                .field("id", FieldType::Int)
                .field("msg", FieldType::Str)
        }
    }

    /// Тест проверяет, что нативный и мостовой дескрипторы видят одну
    /// очередь в обе стороны.
    #[test]
    fn test_native_and_bridged_share_queue() {
        let broker = Arc::new(Broker::default());
        let publisher = broker.publisher::<Msg>("link").unwrap();
        let bridged = broker.open_bridged("MSG", "link", None).unwrap();

        publisher.push(Msg {
            id: 1,
            msg: "hello".into(),
        });
        assert_eq!(
            bridged.pop_value().unwrap(),
            json!({"id": 1, "msg": "hello"})
        );

        bridged.push_value(json!({"id": 2.0, "msg": "back"})).unwrap();
        let sub = broker.subscriber::<Msg>("link").unwrap();
        assert_eq!(
            sub.pop().unwrap(),
            Msg {
                id: 2,
                msg: "back".into()
            }
        );
    }

    /// Тест проверяет, что канал, открытый по схеме до нативной
    /// регистрации типа, доступен обоим рантаймам и после неё.
    #[test]
    fn test_schema_channel_survives_native_registration() {
        let broker = Arc::new(Broker::default());
        broker.register_schema(Msg::payload_type()).unwrap();
        let early = broker.open_bridged("MSG", "link", None).unwrap();
        early.push_value(json!({"id": 1, "msg": "first"})).unwrap();

        let sub = broker.subscriber::<Msg>("link").unwrap();
        assert_eq!(
            sub.try_pop().unwrap(),
            Msg {
                id: 1,
                msg: "first".into()
            }
        );

        let late = broker.open_bridged("MSG", "link", None).unwrap();
        broker.publisher::<Msg>("link").unwrap().push(Msg {
            id: 2,
            msg: "second".into(),
        });
        assert_eq!(
            late.try_pop_value().unwrap(),
            json!({"id": 2, "msg": "second"})
        );
        assert_eq!(broker.channels().len(), 1);
    }

    #[test]
    fn test_invalid_push_leaves_queue_intact() {
        let broker = Arc::new(Broker::default());
        let bridged = broker.open_bridged("int", "numbers", None).unwrap();
        bridged.push_value(json!(1)).unwrap();

        let err = bridged.push_value(json!("two")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TypeError);
        assert_eq!(bridged.len(), 1);
        assert_eq!(bridged.try_pop_value().unwrap(), json!(1));
    }

    #[test]
    fn test_dynamic_type_roundtrip() {
        let broker = Arc::new(Broker::default());
        broker
            .register_schema(
                PayloadType::record("Tick")
                    .field("seq", FieldType::Int)
                    .field("tags", FieldType::List(Box::new(FieldType::Str))),
            )
            .unwrap();
        let q = broker.open_bridged("Tick", "ticks", Some(2)).unwrap();
        for seq in 0..3 {
            q.push_value(json!({"seq": seq, "tags": []})).unwrap();
        }
        assert_eq!(q.stats().evicted, 1);
        assert_eq!(q.pop_value().unwrap()["seq"], json!(1));

        assert_eq!(q.pop_value_for(Duration::ZERO).unwrap()["seq"], json!(2));
        assert_eq!(
            q.pop_value_for(Duration::ZERO).unwrap_err().status_code(),
            StatusCode::Timeout
        );
    }

    #[test]
    fn test_unregistered_type() {
        let broker = Arc::new(Broker::default());
        let err = broker.open_bridged("Nope", "c", None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TypeNotFound);
    }
}

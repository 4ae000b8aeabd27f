use chanbus_error::MarshalError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{FieldType, MessageRegistry, PayloadType};
use crate::error::BrokerResult;

/// Нативный тип сообщения, который можно передавать через каналы.
///
/// Реализация описывает форму типа один раз; реестр использует её для
/// проверки значений из встроенного рантайма, а `serde` переводит
/// значения в нейтральное представление и обратно.
///
/// Поле типа `FieldType::Record` ссылается на другой тип по
/// идентификатору. Такой тип должен быть зарегистрирован раньше; проще
/// всего сделать это в [`Payload::register_nested`], тогда дескрипторы
/// регистрируют его сами.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Msg {
///     id: i64,
///     msg: String,
///     at: Point,
/// }
///
/// impl Payload for Msg {
///     fn payload_type() -> PayloadType {
///         PayloadType::record("MSG")
///             .field("id", FieldType::Int)
///             .field("msg", FieldType::Str)
///             .field("at", FieldType::Record("Point".into()))
///             .constructor(&[])
///             .constructor(&["id", "msg"])
///     }
///
///     fn register_nested(registry: &MessageRegistry) -> BrokerResult<()> {
///         registry.register::<Point>()?;
///         Ok(())
///     }
/// }
/// ```
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + 'static {
    fn payload_type() -> PayloadType;

    /// Регистрирует составные типы, на которые ссылаются поля.
    fn register_nested(_registry: &MessageRegistry) -> BrokerResult<()> {
        Ok(())
    }
}

/// Переводит нативное значение в нейтральное представление.
pub fn encode<T: Serialize>(
    msg: &T,
    type_id: &str,
) -> Result<Value, MarshalError> {
    serde_json::to_value(msg).map_err(|e| MarshalError::Serde {
        type_id: type_id.to_string(),
        reason: e.to_string(),
    })
}

/// Строит нативное значение из нейтрального представления.
pub fn decode<T: DeserializeOwned>(
    value: Value,
    type_id: &str,
) -> Result<T, MarshalError> {
    serde_json::from_value(value).map_err(|e| MarshalError::Serde {
        type_id: type_id.to_string(),
        reason: e.to_string(),
    })
}

////////////////////////////////////////////////////////////////////////////////
// Встроенные скалярные типы
////////////////////////////////////////////////////////////////////////////////

impl Payload for i64 {
    fn payload_type() -> PayloadType {
        PayloadType::scalar("int", FieldType::Int)
    }
}

impl Payload for f64 {
    fn payload_type() -> PayloadType {
        PayloadType::scalar("float", FieldType::Float)
    }
}

impl Payload for bool {
    fn payload_type() -> PayloadType {
        PayloadType::scalar("bool", FieldType::Bool)
    }
}

impl Payload for String {
    fn payload_type() -> PayloadType {
        PayloadType::scalar("string", FieldType::Str)
    }
}

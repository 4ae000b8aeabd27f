//! Общие типы сообщений для интеграционных тестов.

#![allow(dead_code)]

use chanbus::{BrokerResult, FieldType, MarshalError, MessageRegistry, Payload, PayloadType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub item: String,
    pub qty: i64,
    pub tags: Vec<String>,
    pub at: Point,
}

impl Payload for Point {
    fn payload_type() -> PayloadType {
        PayloadType::record("Point")
            .field("x", FieldType::Float)
            .field("y", FieldType::Float)
            .constructor(&[])
            .constructor(&["x", "y"])
    }
}

impl Payload for Order {
    fn payload_type() -> PayloadType {
        PayloadType::record("Order")
            .readonly_field("id", FieldType::Int)
            .field("item", FieldType::Str)
            .field("qty", FieldType::Int)
            .field("tags", FieldType::List(Box::new(FieldType::Str)))
            .field("at", FieldType::Record("Point".into()))
            .constructor(&["id", "item", "qty"])
            .typed_method::<Order, _>("total", 1, |order, args| {
                let price = args.first().and_then(Value::as_f64).ok_or_else(|| {
                    MarshalError::Runtime {
                        reason: "price must be a number".to_string(),
                    }
                })?;
                Ok(json!(price * order.qty as f64))
            })
    }

    fn register_nested(registry: &MessageRegistry) -> BrokerResult<()> {
        registry.register::<Point>()?;
        Ok(())
    }
}

pub fn order(id: i64) -> Order {
    Order {
        id,
        item: format!("item-{id}"),
        qty: id % 5 + 1,
        tags: vec!["test".to_string()],
        at: Point { x: 1.5, y: -2.0 },
    }
}

//! Проверка и нормализация значений в нейтральном представлении.
//!
//! Значение сообщения в мосте между рантаймами хранится как
//! `serde_json::Value`. Перед тем как попасть в очередь, оно приводится к
//! форме зарегистрированного типа: целые числа из `1.0` превращаются в `1`,
//! пустая таблица становится пустым списком, лишние и отсутствующие поля
//! отклоняются.

use chanbus_error::MarshalError;
use serde_json::{Map, Value};

use super::{FieldType, MessageRegistry, PayloadType, Shape};

/// Приводит значение к форме типа `payload`.
pub fn conform_payload(
    registry: &MessageRegistry,
    payload: &PayloadType,
    value: Value,
) -> Result<Value, MarshalError> {
    match payload.shape() {
        Shape::Scalar(ty) => conform(registry, ty, value, payload.type_id()),
        Shape::Record(_) => conform_record(registry, payload, value, payload.type_id()),
    }
}

/// Значение по умолчанию для типа сообщения.
pub fn default_payload(
    registry: &MessageRegistry,
    payload: &PayloadType,
) -> Result<Value, MarshalError> {
    match payload.shape() {
        Shape::Scalar(ty) => default_value(registry, ty, payload.type_id()),
        Shape::Record(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for field in fields {
                let path = format!("{}.{}", payload.type_id(), field.name);
                map.insert(
                    field.name.to_string(),
                    default_value(registry, &field.ty, &path)?,
                );
            }
            Ok(Value::Object(map))
        }
    }
}

/// Значение по умолчанию для поля: `0`, `0.0`, `false`, `""`, `[]`.
pub fn default_value(
    registry: &MessageRegistry,
    ty: &FieldType,
    path: &str,
) -> Result<Value, MarshalError> {
    Ok(match ty {
        FieldType::Bool => Value::Bool(false),
        FieldType::Int => Value::from(0i64),
        FieldType::Float => Value::from(0.0f64),
        FieldType::Str => Value::String(String::new()),
        FieldType::List(_) => Value::Array(Vec::new()),
        FieldType::Record(id) => {
            let nested = registry.describe(id).map_err(|_| unsupported(path, ty))?;
            default_payload(registry, &nested)?
        }
    })
}

/// Краткое имя вида значения для сообщений об ошибках.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "record",
    }
}

fn conform(
    registry: &MessageRegistry,
    ty: &FieldType,
    value: Value,
    path: &str,
) -> Result<Value, MarshalError> {
    match (ty, value) {
        (FieldType::Bool, v @ Value::Bool(_)) => Ok(v),
        (FieldType::Int, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                return Ok(Value::Number(n));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(Value::from(f as i64))
                }
                _ => Err(mismatch(path, ty, "float")),
            }
        }
        (FieldType::Float, Value::Number(n)) => match n.as_f64() {
            Some(f) => Ok(Value::from(f)),
            None => Err(mismatch(path, ty, "number")),
        },
        (FieldType::Str, v @ Value::String(_)) => Ok(v),
        (FieldType::List(inner), Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| conform(registry, inner, item, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        // Пустая таблица встроенного рантайма неотличима от пустой записи.
        (FieldType::List(_), Value::Object(map)) if map.is_empty() => Ok(Value::Array(Vec::new())),
        (FieldType::Record(id), value) => {
            let nested = registry.describe(id).map_err(|_| unsupported(path, ty))?;
            match nested.shape() {
                Shape::Scalar(inner) => conform(registry, inner, value, path),
                Shape::Record(_) => conform_record(registry, &nested, value, path),
            }
        }
        (ty, other) => Err(mismatch(path, ty, kind_of(&other))),
    }
}

fn conform_record(
    registry: &MessageRegistry,
    payload: &PayloadType,
    value: Value,
    path: &str,
) -> Result<Value, MarshalError> {
    let mut map = match value {
        Value::Object(map) => map,
        Value::Array(items) if items.is_empty() => Map::new(),
        other => {
            return Err(MarshalError::TypeMismatch {
                path: path.to_string(),
                expected: payload.type_id().to_string(),
                actual: kind_of(&other).to_string(),
            })
        }
    };

    if let Some(unknown) = map.keys().find(|k| payload.field_by_name(k).is_none()) {
        return Err(MarshalError::UnknownField {
            type_id: payload.type_id().to_string(),
            field: unknown.clone(),
        });
    }

    let mut out = Map::with_capacity(payload.fields().len());
    for field in payload.fields() {
        let raw = map
            .remove(&*field.name)
            .ok_or_else(|| MarshalError::MissingField {
                type_id: payload.type_id().to_string(),
                field: field.name.to_string(),
            })?;
        let field_path = format!("{path}.{}", field.name);
        out.insert(
            field.name.to_string(),
            conform(registry, &field.ty, raw, &field_path)?,
        );
    }
    Ok(Value::Object(out))
}

/// Приводит значение одного поля (используется при присваивании из Lua).
pub fn conform_field(
    registry: &MessageRegistry,
    ty: &FieldType,
    value: Value,
    path: &str,
) -> Result<Value, MarshalError> {
    conform(registry, ty, value, path)
}

fn mismatch(
    path: &str,
    expected: &FieldType,
    actual: &str,
) -> MarshalError {
    MarshalError::TypeMismatch {
        path: path.to_string(),
        expected: expected.name(),
        actual: actual.to_string(),
    }
}

fn unsupported(
    path: &str,
    ty: &FieldType,
) -> MarshalError {
    let (type_id, field) = path.split_once('.').unwrap_or((path, ""));
    MarshalError::UnsupportedFieldType {
        type_id: type_id.to_string(),
        field: field.to_string(),
        field_type: ty.name(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> MessageRegistry {
        let reg = MessageRegistry::new();
        reg.register_dynamic(
            PayloadType::record("Point")
                .field("x", FieldType::Int)
                .field("y", FieldType::Int),
        )
        .unwrap();
        reg.register_dynamic(
            PayloadType::record("Path")
                .field("name", FieldType::Str)
                .field("points", FieldType::List(Box::new(FieldType::Record("Point".into()))))
                .field("closed", FieldType::Bool),
        )
        .unwrap();
        reg
    }

    #[test]
    fn test_integral_float_becomes_int() {
        let reg = registry();
        let point = reg.describe("Point").unwrap();
        let v = conform_payload(&reg, &point, json!({"x": 1.0, "y": 2})).unwrap();
        assert_eq!(v, json!({"x": 1, "y": 2}));
        assert!(v["x"].is_i64());
    }

    #[test]
    fn test_fractional_float_rejected_for_int() {
        let reg = registry();
        let point = reg.describe("Point").unwrap();
        let err = conform_payload(&reg, &point, json!({"x": 1.5, "y": 2})).unwrap_err();
        assert!(matches!(err, MarshalError::TypeMismatch { ref path, .. } if path == "Point.x"));
    }

    /// Тест проверяет границы `i64`: 2^63 не помещается и отвергается, а не
    /// насыщается до `i64::MAX`.
    #[test]
    fn test_float_out_of_int_range_rejected() {
        let reg = registry();
        let point = reg.describe("Point").unwrap();
        let two_pow_63 = 9_223_372_036_854_775_808.0_f64;
        assert!(conform_payload(&reg, &point, json!({"x": two_pow_63, "y": 0})).is_err());

        let v = conform_payload(&reg, &point, json!({"x": -two_pow_63, "y": 0})).unwrap();
        assert_eq!(v["x"], json!(i64::MIN));
    }

    #[test]
    fn test_unknown_and_missing_fields() {
        let reg = registry();
        let point = reg.describe("Point").unwrap();

        let err = conform_payload(&reg, &point, json!({"x": 1, "y": 2, "z": 3})).unwrap_err();
        assert!(matches!(err, MarshalError::UnknownField { ref field, .. } if field == "z"));

        let err = conform_payload(&reg, &point, json!({"x": 1})).unwrap_err();
        assert!(matches!(err, MarshalError::MissingField { ref field, .. } if field == "y"));
    }

    #[test]
    fn test_nested_path_in_error() {
        let reg = registry();
        let path = reg.describe("Path").unwrap();
        let err = conform_payload(
            &reg,
            &path,
            json!({"name": "p", "closed": false, "points": [{"x": 1, "y": 1}, {"x": "a", "y": 1}]}),
        )
        .unwrap_err();
        assert!(
            matches!(err, MarshalError::TypeMismatch { ref path, .. } if path == "Path.points[1].x")
        );
    }

    #[test]
    fn test_empty_object_is_empty_list() {
        let reg = registry();
        let path = reg.describe("Path").unwrap();
        let v = conform_payload(&reg, &path, json!({"name": "p", "closed": true, "points": {}}))
            .unwrap();
        assert_eq!(v["points"], json!([]));
    }

    #[test]
    fn test_defaults() {
        let reg = registry();
        let path = reg.describe("Path").unwrap();
        let v = default_payload(&reg, &path).unwrap();
        assert_eq!(v, json!({"name": "", "points": [], "closed": false}));
    }
}

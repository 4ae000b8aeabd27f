//! Адаптер моста для встроенного Lua 5.4 (`mlua`).
//!
//! В состояние Lua устанавливается глобальная таблица `chanbus`:
//!
//! ```lua
//! local MSG = chanbus.message("MSG")
//! local pub = MSG.publisher("link_A")
//! pub:push(MSG.new(1, "hello"))
//!
//! local sub = chanbus.message("int").subscriber("link_B", 10)
//! local v, err = sub:pop_for(100)   -- nil, "timeout"
//! ```
//!
//! Сообщения-записи видны в Lua как userdata с доступом к полям по имени;
//! скаляры и списки превращаются в обычные значения и таблицы Lua.

use std::{sync::Arc, time::Duration};

use chanbus_error::{ErrorExt, MarshalError, StatusCode};
use mlua::{
    AnyUserData, Function, Lua, LuaSerdeExt, MetaMethod, Table, UserData, UserDataMethods,
    Value as LuaValue, Variadic,
};
use serde_json::{json, Map, Number, Value};
use tracing::{debug, error, info, trace, warn};

use super::DynQueue;
use crate::{
    broker::Broker,
    error::{BrokerError, BrokerResult},
    registry::{
        default_payload,
        validate::{conform_field, default_value},
        FieldAccess, FieldType, PayloadType, Shape,
    },
    runtime::CancelToken,
    shared::SyncValue,
};

/// Ключ таблицы методов, объявленных на стороне Lua.
const METHODS_KEY: &str = "chanbus.methods";

/// Ключ таблицы ячеек `chanbus.sync`, привязанных к этому состоянию Lua.
/// Брокер держит ячейки слабо, поэтому их держит состояние.
const SYNC_KEY: &str = "chanbus.sync";

/// Устанавливает API брокера в состояние Lua.
#[derive(Clone)]
pub struct LuaBridge {
    broker: Arc<Broker>,
    token: CancelToken,
    poll: Duration,
}

/// Сообщение-запись на стороне Lua: независимая копия значения.
struct LuaRecord {
    broker: Arc<Broker>,
    schema: Arc<PayloadType>,
    fields: Map<String, Value>,
}

struct LuaPublisher {
    queue: Arc<dyn DynQueue>,
}

struct LuaSubscriber {
    broker: Arc<Broker>,
    queue: Arc<dyn DynQueue>,
}

struct LuaSync {
    value: SyncValue<i64>,
    token: CancelToken,
    poll: Duration,
}

////////////////////////////////////////////////////////////////////////////////
// LuaBridge
////////////////////////////////////////////////////////////////////////////////

impl LuaBridge {
    pub fn new(
        broker: Arc<Broker>,
        token: CancelToken,
    ) -> Self {
        Self {
            broker,
            token,
            poll: Duration::from_millis(50),
        }
    }

    /// Шаг, с которым блокирующие ожидания в Lua проверяют остановку.
    pub fn with_poll_interval(
        mut self,
        poll: Duration,
    ) -> Self {
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Создаёт глобальную таблицу `chanbus`.
    pub fn install(
        &self,
        lua: &Lua,
    ) -> mlua::Result<()> {
        lua.set_named_registry_value(METHODS_KEY, lua.create_table()?)?;
        lua.set_named_registry_value(SYNC_KEY, lua.create_table()?)?;

        let api = lua.create_table()?;

        let broker = self.broker.clone();
        api.set(
            "register",
            lua.create_function(move |lua, decl: Table| register_from_lua(lua, &broker, decl))?,
        )?;

        let broker = self.broker.clone();
        api.set(
            "message",
            lua.create_function(move |lua, type_id: String| {
                broker.describe(&type_id).map_err(BrokerError::from)?;
                message_module(lua, &broker, &type_id)
            })?,
        )?;

        let broker = self.broker.clone();
        api.set(
            "types",
            lua.create_function(move |_, ()| Ok(broker.registry().type_ids()))?,
        )?;

        let broker = self.broker.clone();
        api.set(
            "channels",
            lua.create_function(move |lua, ()| lua.to_value(&broker.channels()))?,
        )?;

        api.set(
            "totable",
            lua.create_function(|lua, value: LuaValue| {
                let json = lua_to_json(lua, value)?;
                lua.to_value(&json)
            })?,
        )?;

        let token = self.token.clone();
        api.set(
            "sleep",
            lua.create_function(move |_, ms: u64| Ok(token.sleep(Duration::from_millis(ms))))?,
        )?;

        let token = self.token.clone();
        api.set(
            "running",
            lua.create_function(move |_, ()| Ok(!token.is_cancelled()))?,
        )?;

        api.set(
            "log",
            lua.create_function(|_, (level, text): (String, String)| {
                match level.to_ascii_lowercase().as_str() {
                    "trace" => trace!(target: "chanbus::script", "{text}"),
                    "debug" => debug!(target: "chanbus::script", "{text}"),
                    "warn" | "warning" => warn!(target: "chanbus::script", "{text}"),
                    "error" => error!(target: "chanbus::script", "{text}"),
                    _ => info!(target: "chanbus::script", "{text}"),
                }
                Ok(())
            })?,
        )?;

        let bridge = self.clone();
        api.set(
            "sync",
            lua.create_function(move |lua, name: String| {
                let bound = lua.named_registry_value::<Table>(SYNC_KEY)?;
                if let Some(existing) = bound.get::<Option<AnyUserData>>(name.as_str())? {
                    return Ok(existing);
                }
                let sync = lua.create_userdata(LuaSync {
                    value: SyncValue::bind(&bridge.broker, &name),
                    token: bridge.token.clone(),
                    poll: bridge.poll,
                })?;
                bound.set(name.as_str(), sync.clone())?;
                Ok(sync)
            })?,
        )?;

        lua.globals().set("chanbus", api)?;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Регистрация и модуль типа
////////////////////////////////////////////////////////////////////////////////

/// `chanbus.register{ type_id = ..., fields = {...}, constructors = {...},
/// methods = {...} }`: возвращает модуль типа.
fn register_from_lua(
    lua: &Lua,
    broker: &Arc<Broker>,
    decl: Table,
) -> mlua::Result<Table> {
    let type_id: String = decl.get("type_id")?;
    let unsupported = |field: &str, field_type: &str| MarshalError::UnsupportedFieldType {
        type_id: type_id.clone(),
        field: field.to_string(),
        field_type: field_type.to_string(),
    };

    let mut schema = match decl.get::<Option<String>>("scalar")? {
        Some(name) => {
            let ty = FieldType::parse(&name).ok_or_else(|| lua_error(unsupported("", &name)))?;
            PayloadType::scalar(type_id.as_str(), ty)
        }
        None => PayloadType::record(type_id.as_str()),
    };

    if let Some(fields) = decl.get::<Option<Table>>("fields")? {
        for field in fields.sequence_values::<Table>() {
            let field = field?;
            let name: String = field.get("name")?;
            let type_name: String = field.get("type")?;
            let ty = FieldType::parse(&type_name)
                .ok_or_else(|| lua_error(unsupported(&name, &type_name)))?;
            schema = if field.get::<Option<bool>>("readonly")?.unwrap_or(false) {
                schema.readonly_field(&name, ty)
            } else {
                schema.field(&name, ty)
            };
        }
    }

    if let Some(ctors) = decl.get::<Option<Table>>("constructors")? {
        for ctor in ctors.sequence_values::<Table>() {
            let names = ctor?
                .sequence_values::<String>()
                .collect::<mlua::Result<Vec<_>>>()?;
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            schema = schema.constructor(&refs);
        }
    }

    let lua_methods = lua.create_table()?;
    if let Some(methods) = decl.get::<Option<Table>>("methods")? {
        let mut declared = Vec::new();
        for pair in methods.pairs::<String, LuaValue>() {
            let (name, value) = pair?;
            let (arity, func) = match value {
                LuaValue::Function(f) => (0, f),
                LuaValue::Table(t) => (t.get::<Option<usize>>("arity")?.unwrap_or(0), t.get::<Function>("call")?),
                other => {
                    return Err(mlua::Error::runtime(format!(
                        "method '{name}' must be a function, got {}",
                        other.type_name()
                    )))
                }
            };
            lua_methods.set(name.as_str(), func)?;
            declared.push((name, arity));
        }
        // Порядок обхода таблицы Lua не определён.
        declared.sort();
        for (name, arity) in declared {
            schema = schema.declared_method(&name, arity);
        }
    }

    broker.register_schema(schema)?;
    lua.named_registry_value::<Table>(METHODS_KEY)?
        .set(type_id.as_str(), lua_methods)?;
    message_module(lua, broker, &type_id)
}

/// Таблица `{ type_id, new, publisher, subscriber, describe }` для типа.
fn message_module(
    lua: &Lua,
    broker: &Arc<Broker>,
    type_id: &str,
) -> mlua::Result<Table> {
    let module = lua.create_table()?;
    module.set("type_id", type_id)?;

    let (b, id) = (broker.clone(), type_id.to_string());
    module.set(
        "new",
        lua.create_function(move |lua, args: Variadic<LuaValue>| construct(lua, &b, &id, args))?,
    )?;

    let (b, id) = (broker.clone(), type_id.to_string());
    module.set(
        "publisher",
        lua.create_function(move |_, channel: String| {
            Ok(LuaPublisher {
                queue: b.open_bridged(&id, &channel, None)?,
            })
        })?,
    )?;

    let (b, id) = (broker.clone(), type_id.to_string());
    module.set(
        "subscriber",
        lua.create_function(move |_, (channel, capacity): (String, Option<i64>)| {
            let capacity = capacity
                .map(|c| b.directory().capacity_from_i64(c))
                .transpose()
                .map_err(BrokerError::from)?;
            Ok(LuaSubscriber {
                broker: b.clone(),
                queue: b.open_bridged(&id, &channel, capacity)?,
            })
        })?,
    )?;

    let (b, id) = (broker.clone(), type_id.to_string());
    module.set(
        "describe",
        lua.create_function(move |lua, ()| {
            let schema = b.describe(&id).map_err(BrokerError::from)?;
            lua.to_value(&describe_json(&schema))
        })?,
    )?;

    Ok(module)
}

/// `T.new(...)`: конструктор по числу аргументов, либо одна таблица полей.
fn construct(
    lua: &Lua,
    broker: &Arc<Broker>,
    type_id: &str,
    args: Variadic<LuaValue>,
) -> mlua::Result<LuaValue> {
    let schema = broker.describe(type_id).map_err(BrokerError::from)?;
    let registry = broker.registry();

    let args: Vec<LuaValue> = args.into_iter().collect();
    if let Shape::Scalar(ty) = schema.shape() {
        let value = match args.len() {
            0 => default_value(registry, ty, type_id).map_err(lua_error)?,
            1 => {
                let raw = lua_to_json(lua, args[0].clone())?;
                conform_field(registry, ty, raw, type_id).map_err(lua_error)?
            }
            n => return Err(lua_error(arity_mismatch(&schema, "new", "0 or 1".into(), n))),
        };
        return payload_to_lua(lua, broker, &schema, value);
    }

    let mut fields = match default_payload(registry, &schema).map_err(lua_error)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let ctor = schema.constructors().iter().find(|c| c.len() == args.len());
    match ctor {
        Some(names) => {
            for (name, arg) in names.iter().zip(args) {
                set_field(lua, broker, &schema, &mut fields, name, arg, false)?;
            }
        }
        None if args.len() == 1 && matches!(args[0], LuaValue::Table(_)) => {
            // Табличная форма: `T.new{ id = 1 }`, остальные поля по умолчанию.
            if let LuaValue::Table(table) = &args[0] {
                for pair in table.pairs::<String, LuaValue>() {
                    let (name, value) = pair?;
                    set_field(lua, broker, &schema, &mut fields, &name, value, false)?;
                }
            }
        }
        None if args.is_empty() && schema.constructors().is_empty() => {}
        None => {
            let mut arities: Vec<String> = schema
                .constructors()
                .iter()
                .map(|c| c.len().to_string())
                .collect();
            if arities.is_empty() {
                arities.push("0".to_string());
            }
            let expected = arities.join(" or ");
            return Err(lua_error(arity_mismatch(&schema, "new", expected, args.len())));
        }
    }

    let record = LuaRecord {
        broker: broker.clone(),
        schema,
        fields,
    };
    Ok(LuaValue::UserData(lua.create_userdata(record)?))
}

fn describe_json(schema: &PayloadType) -> Value {
    let (kind, scalar) = match schema.shape() {
        Shape::Scalar(ty) => ("scalar", Some(ty.name())),
        Shape::Record(_) => ("record", None),
    };
    json!({
        "type_id": schema.type_id(),
        "kind": kind,
        "scalar": scalar,
        "fields": schema.fields().iter().map(|f| json!({
            "name": &*f.name,
            "type": f.ty.name(),
            "readonly": f.access == FieldAccess::ReadOnly,
        })).collect::<Vec<_>>(),
        "constructors": schema.constructors().iter().map(|c| {
            c.iter().map(|n| n.to_string()).collect::<Vec<_>>()
        }).collect::<Vec<_>>(),
        "methods": schema.methods().iter().map(|m| json!({
            "name": &*m.name,
            "arity": m.arity,
        })).collect::<Vec<_>>(),
    })
}

////////////////////////////////////////////////////////////////////////////////
// Преобразование значений
////////////////////////////////////////////////////////////////////////////////

/// Переводит значение Lua в нейтральное представление.
///
/// Последовательность (ключи 1..n) становится списком, остальные таблицы
/// становятся записями со строковыми ключами.
pub fn lua_to_json(
    lua: &Lua,
    value: LuaValue,
) -> mlua::Result<Value> {
    Ok(match value {
        LuaValue::Nil => Value::Null,
        LuaValue::Boolean(b) => Value::Bool(b),
        LuaValue::Integer(i) => Value::from(i),
        LuaValue::Number(n) => Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| mlua::Error::runtime(format!("cannot marshal number {n}")))?,
        LuaValue::String(s) => Value::String(s.to_str()?.to_string()),
        LuaValue::Table(table) => {
            let len = table.raw_len();
            let mut entries = Vec::new();
            for pair in table.pairs::<LuaValue, LuaValue>() {
                entries.push(pair?);
            }
            let is_sequence = len > 0
                && entries.len() == len
                && entries
                    .iter()
                    .all(|(k, _)| matches!(k, LuaValue::Integer(i) if *i >= 1 && *i as usize <= len));
            if is_sequence {
                let mut items = vec![Value::Null; len];
                for (k, v) in entries {
                    if let LuaValue::Integer(i) = k {
                        items[i as usize - 1] = lua_to_json(lua, v)?;
                    }
                }
                Value::Array(items)
            } else {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match k {
                        LuaValue::String(s) => s.to_str()?.to_string(),
                        LuaValue::Integer(i) => i.to_string(),
                        other => {
                            return Err(mlua::Error::runtime(format!(
                                "cannot marshal table key of type {}",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, lua_to_json(lua, v)?);
                }
                Value::Object(map)
            }
        }
        LuaValue::UserData(ud) if ud.is::<LuaRecord>() => {
            Value::Object(ud.borrow::<LuaRecord>()?.fields.clone())
        }
        LuaValue::LightUserData(p) if p.0.is_null() => Value::Null,
        other => {
            return Err(lua_error(MarshalError::Runtime {
                reason: format!("cannot marshal Lua {}", other.type_name()),
            }))
        }
    })
}

/// Переводит значение сообщения в Lua с учётом схемы: записи становятся
/// userdata, а скаляры и списки обычными значениями.
fn payload_to_lua(
    lua: &Lua,
    broker: &Arc<Broker>,
    schema: &Arc<PayloadType>,
    value: Value,
) -> mlua::Result<LuaValue> {
    match (schema.shape(), value) {
        (Shape::Scalar(ty), value) => field_to_lua(lua, broker, ty, value),
        (Shape::Record(_), Value::Object(fields)) => Ok(LuaValue::UserData(lua.create_userdata(
            LuaRecord {
                broker: broker.clone(),
                schema: schema.clone(),
                fields,
            },
        )?)),
        (Shape::Record(_), other) => lua.to_value(&other),
    }
}

fn field_to_lua(
    lua: &Lua,
    broker: &Arc<Broker>,
    ty: &FieldType,
    value: Value,
) -> mlua::Result<LuaValue> {
    match (ty, value) {
        (FieldType::Record(id), value) => {
            let nested = broker.describe(id).map_err(BrokerError::from)?;
            payload_to_lua(lua, broker, &nested, value)
        }
        (FieldType::List(inner), Value::Array(items)) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.into_iter().enumerate() {
                table.raw_set(i + 1, field_to_lua(lua, broker, inner, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        (_, value) => lua.to_value(&value),
    }
}

fn set_field(
    lua: &Lua,
    broker: &Arc<Broker>,
    schema: &PayloadType,
    fields: &mut Map<String, Value>,
    name: &str,
    value: LuaValue,
    enforce_access: bool,
) -> mlua::Result<()> {
    let field = schema.field_by_name(name).ok_or_else(|| {
        lua_error(MarshalError::UnknownField {
            type_id: schema.type_id().to_string(),
            field: name.to_string(),
        })
    })?;
    if enforce_access && field.access == FieldAccess::ReadOnly {
        return Err(lua_error(MarshalError::ReadOnlyField {
            type_id: schema.type_id().to_string(),
            field: name.to_string(),
        }));
    }
    let raw = lua_to_json(lua, value)?;
    let path = format!("{}.{}", schema.type_id(), name);
    let value = conform_field(broker.registry(), &field.ty, raw, &path).map_err(lua_error)?;
    fields.insert(name.to_string(), value);
    Ok(())
}

fn arity_mismatch(
    schema: &PayloadType,
    target: &str,
    expected: String,
    actual: usize,
) -> MarshalError {
    MarshalError::ArityMismatch {
        type_id: schema.type_id().to_string(),
        target: target.to_string(),
        expected,
        actual,
    }
}

fn lua_error(err: impl Into<BrokerError>) -> mlua::Error {
    err.into().into()
}

/// Таймаут, пустая и закрытая очередь возвращаются как `nil, "<причина>"`.
fn recv_to_lua(
    lua: &Lua,
    broker: &Arc<Broker>,
    queue: &Arc<dyn DynQueue>,
    result: BrokerResult<Value>,
) -> mlua::Result<(LuaValue, Option<String>)> {
    match result {
        Ok(value) => Ok((payload_to_lua(lua, broker, queue.schema(), value)?, None)),
        Err(e)
            if matches!(
                e.status_code(),
                StatusCode::Timeout | StatusCode::Empty | StatusCode::ChannelClosed
            ) =>
        {
            Ok((LuaValue::Nil, Some(e.client_message())))
        }
        Err(e) => Err(e.into()),
    }
}

////////////////////////////////////////////////////////////////////////////////
// UserData
////////////////////////////////////////////////////////////////////////////////

impl UserData for LuaRecord {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            if let Some(field) = this.schema.field_by_name(&key) {
                let value = this.fields.get(&key).cloned().unwrap_or(Value::Null);
                return field_to_lua(lua, &this.broker, &field.ty, value);
            }

            if let Some(method) = this.schema.method_by_name(&key) {
                if method.handler().is_some() {
                    let broker = this.broker.clone();
                    let type_id = this.schema.type_id().to_string();
                    let func = lua.create_function(
                        move |lua, (obj, args): (AnyUserData, Variadic<LuaValue>)| {
                            let receiver = Value::Object(obj.borrow::<LuaRecord>()?.fields.clone());
                            let args = args
                                .into_iter()
                                .map(|a| lua_to_json(lua, a))
                                .collect::<mlua::Result<Vec<_>>>()?;
                            let out = broker.registry().invoke(&type_id, &key, &receiver, args)?;
                            lua.to_value(&out)
                        },
                    )?;
                    return Ok(LuaValue::Function(func));
                }
            }

            if let Some(table) = lua.named_registry_value::<Option<Table>>(METHODS_KEY)? {
                if let Some(per_type) = table.get::<Option<Table>>(this.schema.type_id())? {
                    let func: LuaValue = per_type.get(key.as_str())?;
                    if !func.is_nil() {
                        return Ok(func);
                    }
                }
            }

            let err = if this.schema.method_by_name(&key).is_some() {
                MarshalError::UnknownMethod {
                    type_id: this.schema.type_id().to_string(),
                    method: key,
                }
            } else {
                MarshalError::UnknownField {
                    type_id: this.schema.type_id().to_string(),
                    field: key,
                }
            };
            Err(lua_error(err))
        });

        methods.add_meta_method_mut(
            MetaMethod::NewIndex,
            |lua, this, (key, value): (String, LuaValue)| {
                let schema = this.schema.clone();
                let broker = this.broker.clone();
                set_field(lua, &broker, &schema, &mut this.fields, &key, value, true)
            },
        );

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!(
                "{}{}",
                this.schema.type_id(),
                Value::Object(this.fields.clone())
            ))
        });

        methods.add_meta_method(MetaMethod::Eq, |_, this, other: AnyUserData| {
            Ok(other
                .borrow::<LuaRecord>()
                .map(|o| o.schema.type_id() == this.schema.type_id() && o.fields == this.fields)
                .unwrap_or(false))
        });
    }
}

impl UserData for LuaPublisher {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("push", |lua, this, msg: LuaValue| {
            let value = lua_to_json(lua, msg)?;
            this.queue.push_value(value)?;
            Ok(())
        });
        methods.add_method("channel", |_, this, ()| Ok(this.queue.channel().to_string()));
    }
}

impl UserData for LuaSubscriber {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("pop", |lua, this, ()| {
            recv_to_lua(lua, &this.broker, &this.queue, this.queue.pop_value())
        });
        methods.add_method("pop_for", |lua, this, ms: u64| {
            let result = this.queue.pop_value_for(Duration::from_millis(ms));
            recv_to_lua(lua, &this.broker, &this.queue, result)
        });
        methods.add_method("try_pop", |lua, this, ()| {
            recv_to_lua(lua, &this.broker, &this.queue, this.queue.try_pop_value())
        });
        methods.add_method("len", |_, this, ()| Ok(this.queue.len()));
        methods.add_method("channel", |_, this, ()| Ok(this.queue.channel().to_string()));
        methods.add_method("stats", |lua, this, ()| lua.to_value(&this.queue.stats()));
    }
}

impl UserData for LuaSync {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("set", |_, this, v: i64| {
            this.value.set(v);
            Ok(())
        });
        methods.add_method("get", |_, this, ()| Ok(this.value.get()));
        // Ожидание прерывается остановкой: тогда возвращается `false`.
        methods.add_method("wait", |_, this, v: i64| {
            while !this.token.is_cancelled() {
                if this.value.wait_for(&v, this.poll) {
                    return Ok(true);
                }
            }
            Ok(false)
        });
        methods.add_method("wait_for", |_, this, (v, ms): (i64, u64)| {
            Ok(this.value.wait_for(&v, Duration::from_millis(ms)))
        });
        methods.add_method("name", |_, this, ()| Ok(this.value.name().to_string()));
    }
}

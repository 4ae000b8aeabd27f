use std::{collections::HashSet, sync::Arc};

use chanbus_error::{MarshalError, RegistryError};
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use tracing::{debug, trace};

use super::{FieldType, Payload, PayloadType, Shape};
use crate::{
    bridge::{DynamicBinding, PayloadBinding, TypedBinding},
    error::BrokerResult,
};

/// Результат регистрации типа.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Тип зарегистрирован впервые
    Registered,
    /// Тип с такой же формой уже был зарегистрирован
    AlreadyRegistered,
}

#[derive(Clone)]
struct RegisteredType {
    schema: Arc<PayloadType>,
    binding: Arc<dyn PayloadBinding>,
    native: bool,
}

/// Реестр типов сообщений.
///
/// Хранит для каждого идентификатора форму типа и привязку, которая умеет
/// открыть очередь канала этого типа со стороны встроенного рантайма.
/// После регистрации чтение сводится к поиску в таблице.
pub struct MessageRegistry {
    types: DashMap<Arc<str>, RegisteredType>,
}

impl MessageRegistry {
    /// Пустой реестр без встроенных скаляров.
    pub fn new() -> Self {
        Self {
            types: DashMap::new(),
        }
    }

    /// Реестр с предварительно зарегистрированными `int`, `float`, `bool`,
    /// `string`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.insert_native::<i64>();
        registry.insert_native::<f64>();
        registry.insert_native::<bool>();
        registry.insert_native::<String>();
        registry
    }

    /// Регистрирует нативный тип `T` вместе с вложенными типами, которые
    /// он объявляет в [`Payload::register_nested`].
    ///
    /// Повторная регистрация той же формы идемпотентна. Если тип с тем же
    /// идентификатором ранее пришёл из встроенного рантайма, его привязка
    /// заменяется нативной.
    pub fn register<T: Payload>(&self) -> BrokerResult<Registration> {
        let schema = self.prepare_native::<T>()?;
        self.commit_native::<T>(schema)
    }

    /// Проверяет `T`, ничего не меняя для самого `T`: вложенные типы
    /// регистрируются, форма сверяется с уже зарегистрированной.
    pub(crate) fn prepare_native<T: Payload>(&self) -> BrokerResult<PayloadType> {
        T::register_nested(self)?;
        let schema = T::payload_type();
        self.check_schema(&schema)?;
        if let Some(existing) = self.types.get(schema.type_id()) {
            if !existing.schema.same_shape(&schema) {
                return Err(RegistryError::DuplicateType {
                    type_id: schema.type_id().to_string(),
                }
                .into());
            }
        }
        Ok(schema)
    }

    pub(crate) fn commit_native<T: Payload>(
        &self,
        schema: PayloadType,
    ) -> BrokerResult<Registration> {
        self.insert(schema, Arc::new(TypedBinding::<T>::new()), true)
    }

    /// Регистрирует тип, описанный только схемой (например, из Lua).
    ///
    /// Значения такого типа хранятся в очереди в нейтральном представлении.
    pub fn register_dynamic(
        &self,
        schema: PayloadType,
    ) -> BrokerResult<Registration> {
        self.check_schema(&schema)?;
        self.insert(schema, Arc::new(DynamicBinding), false)
    }

    /// Возвращает описание типа.
    pub fn describe(
        &self,
        type_id: &str,
    ) -> Result<Arc<PayloadType>, RegistryError> {
        self.types
            .get(type_id)
            .map(|t| t.schema.clone())
            .ok_or_else(|| RegistryError::NotFound {
                type_id: type_id.to_string(),
            })
    }

    pub fn contains(
        &self,
        type_id: &str,
    ) -> bool {
        self.types.contains_key(type_id)
    }

    /// Отсортированный список зарегистрированных идентификаторов.
    pub fn type_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.types.iter().map(|e| e.key().to_string()).collect();
        ids.sort();
        ids
    }

    /// Вызывает метод типа с обработчиком, зарегистрированным в Rust.
    pub fn invoke(
        &self,
        type_id: &str,
        method: &str,
        this: &Value,
        args: Vec<Value>,
    ) -> BrokerResult<Value> {
        let schema = self.describe(type_id)?;
        let descriptor = schema
            .method_by_name(method)
            .ok_or_else(|| unknown_method(type_id, method))?;
        let handler = descriptor
            .handler()
            .ok_or_else(|| unknown_method(type_id, method))?;
        if args.len() != descriptor.arity {
            return Err(MarshalError::ArityMismatch {
                type_id: type_id.to_string(),
                target: method.to_string(),
                expected: descriptor.arity.to_string(),
                actual: args.len(),
            }
            .into());
        }
        trace!(type_id, method, "invoking payload method");
        Ok(handler(this, args)?)
    }

    pub(crate) fn binding(
        &self,
        type_id: &str,
    ) -> Result<(Arc<PayloadType>, Arc<dyn PayloadBinding>), RegistryError> {
        self.types
            .get(type_id)
            .map(|t| (t.schema.clone(), t.binding.clone()))
            .ok_or_else(|| RegistryError::NotFound {
                type_id: type_id.to_string(),
            })
    }

    fn insert_native<T: Payload>(&self) {
        let schema = T::payload_type();
        self.types.insert(
            schema.type_id_arc().clone(),
            RegisteredType {
                schema: Arc::new(schema),
                binding: Arc::new(TypedBinding::<T>::new()),
                native: true,
            },
        );
    }

    fn insert(
        &self,
        schema: PayloadType,
        binding: Arc<dyn PayloadBinding>,
        native: bool,
    ) -> BrokerResult<Registration> {
        let key = schema.type_id_arc().clone();
        match self.types.entry(key) {
            Entry::Occupied(mut entry) => {
                if !entry.get().schema.same_shape(&schema) {
                    return Err(RegistryError::DuplicateType {
                        type_id: schema.type_id().to_string(),
                    }
                    .into());
                }
                if native && !entry.get().native {
                    debug!(type_id = schema.type_id(), "payload type bound to native type");
                    entry.insert(RegisteredType {
                        schema: Arc::new(schema),
                        binding,
                        native,
                    });
                }
                Ok(Registration::AlreadyRegistered)
            }
            Entry::Vacant(entry) => {
                debug!(
                    type_id = schema.type_id(),
                    fields = schema.fields().len(),
                    methods = schema.methods().len(),
                    native,
                    "payload type registered"
                );
                entry.insert(RegisteredType {
                    schema: Arc::new(schema),
                    binding,
                    native,
                });
                Ok(Registration::Registered)
            }
        }
    }

    /// Проверяет схему до захвата записи таблицы: ссылки на составные типы
    /// читаются из той же таблицы.
    fn check_schema(
        &self,
        schema: &PayloadType,
    ) -> Result<(), MarshalError> {
        let type_id = schema.type_id();
        let invalid = |reason: String| MarshalError::InvalidSchema {
            type_id: type_id.to_string(),
            reason,
        };

        if type_id.trim().is_empty() {
            return Err(invalid("empty type identifier".to_string()));
        }

        let mut referenced = Vec::new();
        match schema.shape() {
            Shape::Scalar(FieldType::Record(_)) => {
                return Err(invalid(
                    "scalar shape cannot wrap a record type".to_string(),
                ))
            }
            Shape::Scalar(ty) => ty.for_each_record(&mut |id| referenced.push((id, ty, ""))),
            Shape::Record(fields) => {
                let mut seen = HashSet::new();
                for field in fields {
                    if field.name.is_empty() {
                        return Err(invalid("empty field name".to_string()));
                    }
                    if !seen.insert(&field.name) {
                        return Err(invalid(format!("duplicate field '{}'", field.name)));
                    }
                    field
                        .ty
                        .for_each_record(&mut |id| referenced.push((id, &field.ty, &*field.name)));
                }
            }
        }

        for (id, ty, field) in referenced {
            if !self.contains(id) {
                return Err(MarshalError::UnsupportedFieldType {
                    type_id: type_id.to_string(),
                    field: field.to_string(),
                    field_type: ty.name(),
                });
            }
        }

        if !schema.constructors().is_empty() && !schema.is_record() {
            return Err(invalid("constructors require a record shape".to_string()));
        }
        let mut arities = HashSet::new();
        for ctor in schema.constructors() {
            if !arities.insert(ctor.len()) {
                return Err(invalid(format!(
                    "more than one constructor takes {} argument(s)",
                    ctor.len()
                )));
            }
            let mut seen = HashSet::new();
            for name in ctor {
                if schema.field_by_name(name).is_none() {
                    return Err(invalid(format!("constructor names unknown field '{name}'")));
                }
                if !seen.insert(name) {
                    return Err(invalid(format!("constructor repeats field '{name}'")));
                }
            }
        }

        let mut names = HashSet::new();
        for method in schema.methods() {
            if !names.insert(&method.name) {
                return Err(invalid(format!("duplicate method '{}'", method.name)));
            }
            if schema.field_by_name(&method.name).is_some() {
                return Err(invalid(format!(
                    "method '{}' shadows a field",
                    method.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn unknown_method(
    type_id: &str,
    method: &str,
) -> MarshalError {
    MarshalError::UnknownMethod {
        type_id: type_id.to_string(),
        method: method.to_string(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

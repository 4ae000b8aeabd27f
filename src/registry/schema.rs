use std::{fmt, sync::Arc};

use chanbus_error::MarshalError;
use serde_json::Value;

/// Обработчик метода сообщения: получает значение-получатель и аргументы.
pub type MethodHandler =
    Arc<dyn Fn(&Value, Vec<Value>) -> Result<Value, MarshalError> + Send + Sync>;

/// Тип поля сообщения.
///
/// Составные типы (`Record`) ссылаются на другой зарегистрированный тип по
/// его идентификатору.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Str,
    List(Box<FieldType>),
    Record(Arc<str>),
}

/// Доступ к полю со стороны встроенного рантайма.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldAccess {
    #[default]
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: Arc<str>,
    pub ty: FieldType,
    pub access: FieldAccess,
}

/// Форма сообщения: скаляр или запись с упорядоченными полями.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Scalar(FieldType),
    Record(Vec<FieldDescriptor>),
}

/// Вызываемый член типа сообщения.
///
/// При сравнении форм учитываются только имя и арность.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: Arc<str>,
    pub arity: usize,
    handler: Option<MethodHandler>,
}

/// Описание типа сообщения, которое передаётся в реестр один раз.
///
/// Строится через цепочку вызовов:
///
/// ```ignore
/// let point = PayloadType::record("Point")
///     .field("x", FieldType::Int)
///     .field("y", FieldType::Int)
///     .constructor(&[])
///     .constructor(&["x", "y"]);
/// ```
#[derive(Debug, Clone)]
pub struct PayloadType {
    type_id: Arc<str>,
    shape: Shape,
    constructors: Vec<Vec<Arc<str>>>,
    methods: Vec<MethodDescriptor>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl FieldType {
    /// Разбирает имя типа: `int`, `float`, `bool`, `string`, `list<T>`.
    ///
    /// Любое другое имя трактуется как ссылка на зарегистрированный тип.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        match name {
            "bool" | "boolean" => Some(Self::Bool),
            "int" | "integer" => Some(Self::Int),
            "float" | "number" => Some(Self::Float),
            "string" | "str" => Some(Self::Str),
            _ => {
                if let Some(inner) = name
                    .strip_prefix("list<")
                    .and_then(|rest| rest.strip_suffix('>'))
                {
                    return Self::parse(inner).map(|t| Self::List(Box::new(t)));
                }
                if name.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
                    return None;
                }
                Some(Self::Record(Arc::from(name)))
            }
        }
    }

    /// Каноническое имя типа.
    pub fn name(&self) -> String {
        match self {
            Self::Bool => "bool".to_string(),
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::Str => "string".to_string(),
            Self::List(inner) => format!("list<{}>", inner.name()),
            Self::Record(id) => id.to_string(),
        }
    }

    /// Вызывает `f` для каждой ссылки на составной тип.
    pub(crate) fn for_each_record<'a>(
        &'a self,
        f: &mut dyn FnMut(&'a Arc<str>),
    ) {
        match self {
            Self::List(inner) => inner.for_each_record(f),
            Self::Record(id) => f(id),
            _ => {}
        }
    }
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<Arc<str>>,
        arity: usize,
        handler: Option<MethodHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            arity,
            handler,
        }
    }

    pub fn handler(&self) -> Option<&MethodHandler> {
        self.handler.as_ref()
    }
}

impl PayloadType {
    /// Скалярный тип сообщения (например, канал целых чисел).
    pub fn scalar(
        type_id: impl Into<Arc<str>>,
        ty: FieldType,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            shape: Shape::Scalar(ty),
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Тип-запись без полей; поля добавляются через [`PayloadType::field`].
    pub fn record(type_id: impl Into<Arc<str>>) -> Self {
        Self {
            type_id: type_id.into(),
            shape: Shape::Record(Vec::new()),
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Добавляет поле с доступом на чтение и запись.
    pub fn field(
        self,
        name: &str,
        ty: FieldType,
    ) -> Self {
        self.push_field(name, ty, FieldAccess::ReadWrite)
    }

    /// Добавляет поле только для чтения.
    pub fn readonly_field(
        self,
        name: &str,
        ty: FieldType,
    ) -> Self {
        self.push_field(name, ty, FieldAccess::ReadOnly)
    }

    /// Добавляет сигнатуру конструктора: упорядоченный список полей.
    pub fn constructor(
        mut self,
        fields: &[&str],
    ) -> Self {
        self.constructors
            .push(fields.iter().map(|f| Arc::from(*f)).collect());
        self
    }

    /// Объявляет метод без обработчика (реализуется во встроенном рантайме).
    pub fn declared_method(
        mut self,
        name: &str,
        arity: usize,
    ) -> Self {
        self.methods.push(MethodDescriptor::new(name, arity, None));
        self
    }

    /// Добавляет метод с обработчиком над нейтральным представлением.
    pub fn method<F>(
        mut self,
        name: &str,
        arity: usize,
        handler: F,
    ) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> Result<Value, MarshalError> + Send + Sync + 'static,
    {
        self.methods
            .push(MethodDescriptor::new(name, arity, Some(Arc::new(handler))));
        self
    }

    /// Добавляет метод, обработчик которого работает с нативным типом `T`.
    ///
    /// Получатель декодируется из нейтрального представления перед вызовом.
    pub fn typed_method<T, F>(
        self,
        name: &str,
        arity: usize,
        handler: F,
    ) -> Self
    where
        T: serde::de::DeserializeOwned,
        F: Fn(&T, Vec<Value>) -> Result<Value, MarshalError> + Send + Sync + 'static,
    {
        let type_id = self.type_id.clone();
        self.method(name, arity, move |this, args| {
            let native: T =
                serde_json::from_value(this.clone()).map_err(|e| MarshalError::Serde {
                    type_id: type_id.to_string(),
                    reason: e.to_string(),
                })?;
            handler(&native, args)
        })
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn type_id_arc(&self) -> &Arc<str> {
        &self.type_id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Поля записи; для скаляра пусто.
    pub fn fields(&self) -> &[FieldDescriptor] {
        match &self.shape {
            Shape::Record(fields) => fields,
            Shape::Scalar(_) => &[],
        }
    }

    pub fn field_by_name(
        &self,
        name: &str,
    ) -> Option<&FieldDescriptor> {
        self.fields().iter().find(|f| &*f.name == name)
    }

    pub fn constructors(&self) -> &[Vec<Arc<str>>] {
        &self.constructors
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method_by_name(
        &self,
        name: &str,
    ) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| &*m.name == name)
    }

    pub fn is_record(&self) -> bool {
        matches!(self.shape, Shape::Record(_))
    }

    /// Сравнивает формы двух описаний без учёта обработчиков методов.
    pub fn same_shape(
        &self,
        other: &PayloadType,
    ) -> bool {
        self.type_id == other.type_id
            && self.shape == other.shape
            && self.constructors == other.constructors
            && self.methods == other.methods
    }

    fn push_field(
        mut self,
        name: &str,
        ty: FieldType,
        access: FieldAccess,
    ) -> Self {
        let descriptor = FieldDescriptor {
            name: Arc::from(name),
            ty,
            access,
        };
        match &mut self.shape {
            Shape::Record(fields) => fields.push(descriptor),
            // Поле превращает скаляр в запись.
            Shape::Scalar(_) => self.shape = Shape::Record(vec![descriptor]),
        }
        self
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl PartialEq for MethodDescriptor {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.name == other.name && self.arity == other.arity
    }
}

impl Eq for MethodDescriptor {}

impl fmt::Debug for MethodDescriptor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl fmt::Display for FieldType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn msg_type() -> PayloadType {
        PayloadType::record("MSG")
            .field("id", FieldType::Int)
            .field("msg", FieldType::Str)
            .constructor(&[])
            .constructor(&["id", "msg"])
            .declared_method("print", 0)
    }

    #[test]
    fn test_parse_field_types() {
        assert_eq!(FieldType::parse("int"), Some(FieldType::Int));
        assert_eq!(FieldType::parse("string"), Some(FieldType::Str));
        assert_eq!(
            FieldType::parse("list<float>"),
            Some(FieldType::List(Box::new(FieldType::Float)))
        );
        assert_eq!(
            FieldType::parse("Point"),
            Some(FieldType::Record(Arc::from("Point")))
        );
        assert_eq!(FieldType::parse(""), None);
        assert_eq!(FieldType::parse("list<int"), None);
    }

    #[test]
    fn test_field_type_name_roundtrip() {
        let ty = FieldType::List(Box::new(FieldType::Record(Arc::from("Point"))));
        assert_eq!(ty.name(), "list<Point>");
        assert_eq!(FieldType::parse(&ty.name()), Some(ty));
    }

    /// Тест проверяет, что обработчики не участвуют в сравнении форм.
    #[test]
    fn test_same_shape_ignores_handlers() {
        let with_handler = PayloadType::record("MSG")
            .field("id", FieldType::Int)
            .field("msg", FieldType::Str)
            .constructor(&[])
            .constructor(&["id", "msg"])
            .method("print", 0, |_, _| Ok(Value::Null));

        assert!(msg_type().same_shape(&with_handler));
    }

    #[test]
    fn test_different_fields_differ() {
        let other = PayloadType::record("MSG").field("id", FieldType::Float);
        assert!(!msg_type().same_shape(&other));
    }

    #[test]
    fn test_readonly_field_lookup() {
        let t = PayloadType::record("Tick").readonly_field("seq", FieldType::Int);
        let seq = t.field_by_name("seq").unwrap();
        assert_eq!(seq.access, FieldAccess::ReadOnly);
        assert!(t.field_by_name("missing").is_none());
    }
}

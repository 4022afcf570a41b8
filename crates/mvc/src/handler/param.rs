//! Declared handler parameters.
//!
//! A [`ParameterSpec`] tells the binder where a handler argument comes from and
//! which type it must be converted to. Specs are plain data, built once when the
//! routes are registered.

use crate::value::Value;
use std::fmt;

/// Target kind of a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    Long,
    Float,
    Double,
    Bool,
    Char,
    Str,
    /// No conversion, the bound value is passed through as is.
    Any,
}

/// A scalar target type. `primitive` types cannot be null and fall back to a zero
/// value, the others fall back to [`Value::Null`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarType {
    kind: ScalarKind,
    primitive: bool,
}

impl ScalarType {
    pub const INT: ScalarType = ScalarType::primitive(ScalarKind::Int);
    pub const LONG: ScalarType = ScalarType::primitive(ScalarKind::Long);
    pub const FLOAT: ScalarType = ScalarType::primitive(ScalarKind::Float);
    pub const DOUBLE: ScalarType = ScalarType::primitive(ScalarKind::Double);
    pub const BOOL: ScalarType = ScalarType::primitive(ScalarKind::Bool);
    pub const CHAR: ScalarType = ScalarType::primitive(ScalarKind::Char);
    pub const STRING: ScalarType = ScalarType::nullable(ScalarKind::Str);
    pub const ANY: ScalarType = ScalarType::nullable(ScalarKind::Any);

    /// A non-null type. Strings and `Any` are always nullable.
    pub const fn primitive(kind: ScalarKind) -> Self {
        let primitive = !matches!(kind, ScalarKind::Str | ScalarKind::Any);
        Self { kind, primitive }
    }

    pub const fn nullable(kind: ScalarKind) -> Self {
        Self { kind, primitive: false }
    }

    /// The nullable counterpart, e.g. `Option<i32>` for `i32`.
    pub const fn optional(self) -> Self {
        Self::nullable(self.kind)
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive
    }

    /// The value used when nothing was bound.
    pub fn zero_value(&self) -> Value {
        if !self.primitive {
            return Value::Null;
        }
        match self.kind {
            ScalarKind::Int => Value::Int(0),
            ScalarKind::Long => Value::Long(0),
            ScalarKind::Float => Value::Float(0.0),
            ScalarKind::Double => Value::Double(0.0),
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::Char => Value::Char('\0'),
            ScalarKind::Str | ScalarKind::Any => Value::Null,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            ScalarKind::Int => "int",
            ScalarKind::Long => "long",
            ScalarKind::Float => "float",
            ScalarKind::Double => "double",
            ScalarKind::Bool => "bool",
            ScalarKind::Char => "char",
            ScalarKind::Str => "string",
            ScalarKind::Any => "any",
        };
        if self.primitive { f.write_str(name) } else { write!(f, "optional {name}") }
    }
}

/// Value type of a map parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapValueType {
    /// The path variables of the matched route.
    String,
    /// Every named value of the request.
    Any,
    /// Anything else is rejected at bind time.
    Other(String),
}

/// A structured parameter assembled field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    type_name: String,
    fields: Vec<(String, ScalarType)>,
}

impl EntitySpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), fields: Vec::new() }
    }

    pub fn field(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.fields.push((name.into(), ty));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[(String, ScalarType)] {
        &self.fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Request,
    Response,
    Map(MapValueType),
    Session(ScalarType),
    File,
    FileList,
    Entity(EntitySpec),
    Scalar(ScalarType),
}

/// Explicit source declaration of a request or session parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    /// Source name looked up in the request or the session.
    pub value: String,
    /// Alias of `value`, only consulted for session parameters.
    pub name: String,
    pub required: bool,
    /// Used for missing session values when not empty.
    pub default_value: String,
}

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding that reads from the given source name.
    pub fn source(value: impl Into<String>) -> Self {
        Self { value: value.into(), ..Self::default() }
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn default_value(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = default_value.into();
        self
    }
}

/// One declared handler parameter, in argument order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    name: String,
    ty: ParamType,
    binding: Option<Binding>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self { name: name.into(), ty, binding: None }
    }

    pub fn request(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Request)
    }

    pub fn response(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Response)
    }

    pub fn path_variables(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Map(MapValueType::String))
    }

    pub fn named_values(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Map(MapValueType::Any))
    }

    pub fn session(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, ParamType::Session(ty))
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::File)
    }

    pub fn files(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::FileList)
    }

    pub fn entity(name: impl Into<String>, spec: EntitySpec) -> Self {
        Self::new(name, ParamType::Entity(spec))
    }

    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self::new(name, ParamType::Scalar(ty))
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &ParamType {
        &self.ty
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// Whether the binding declares the parameter as required.
    pub fn is_required(&self) -> bool {
        self.binding.as_ref().is_some_and(|b| b.required)
    }

    /// Name used to look the parameter up in path variables and named values.
    pub fn lookup_name(&self) -> &str {
        match &self.binding {
            Some(binding) if !binding.value.is_empty() => &binding.value,
            _ => &self.name,
        }
    }

    /// Key used to look the parameter up in the session: the binding's value, then
    /// its alias, then the parameter name.
    pub fn session_key(&self) -> &str {
        match &self.binding {
            Some(binding) if !binding.value.is_empty() => &binding.value,
            Some(binding) if !binding.name.is_empty() => &binding.name,
            _ => &self.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_never_primitive() {
        assert!(!ScalarType::primitive(ScalarKind::Str).is_primitive());
        assert!(!ScalarType::primitive(ScalarKind::Any).is_primitive());
        assert!(ScalarType::INT.is_primitive());
        assert!(!ScalarType::INT.optional().is_primitive());
    }

    #[test]
    fn zero_values() {
        assert_eq!(ScalarType::INT.zero_value(), Value::Int(0));
        assert_eq!(ScalarType::BOOL.zero_value(), Value::Bool(false));
        assert_eq!(ScalarType::CHAR.zero_value(), Value::Char('\0'));
        assert_eq!(ScalarType::LONG.optional().zero_value(), Value::Null);
        assert_eq!(ScalarType::STRING.zero_value(), Value::Null);
    }

    #[test]
    fn lookup_names() {
        let plain = ParameterSpec::scalar("id", ScalarType::INT);
        assert_eq!(plain.lookup_name(), "id");

        let bound = ParameterSpec::scalar("id", ScalarType::INT).with_binding(Binding::source("productId"));
        assert_eq!(bound.lookup_name(), "productId");

        let empty = ParameterSpec::scalar("id", ScalarType::INT).with_binding(Binding::new().required(true));
        assert_eq!(empty.lookup_name(), "id");
        assert!(empty.is_required());
    }

    #[test]
    fn session_key_falls_back_to_alias() {
        let spec = ParameterSpec::session("user", ScalarType::STRING).with_binding(Binding::new().alias("currentUser"));
        assert_eq!(spec.session_key(), "currentUser");

        let spec = ParameterSpec::session("user", ScalarType::STRING)
            .with_binding(Binding::source("login").alias("currentUser"));
        assert_eq!(spec.session_key(), "login");

        assert_eq!(ParameterSpec::session("user", ScalarType::STRING).session_key(), "user");
    }
}

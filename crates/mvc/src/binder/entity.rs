use super::convert::{ConversionError, convert};
use crate::form::NamedValues;
use crate::handler::EntitySpec;
use crate::request::PathVariables;
use crate::value::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A structured parameter value: named fields in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl Entity {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), fields: Vec::new() }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing an earlier value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Builds an entity field by field.
///
/// Each field is looked up, first hit wins, as
/// 1. a path variable named like the field
/// 2. a named value named like the field
/// 3. a named value `<TypeName>.<field>`
/// 4. a named value `<typename>.<field>` (lowercase type name)
///
/// Fields found nowhere take their type's zero value.
pub(crate) fn bind_entity(
    spec: &EntitySpec,
    path_vars: &PathVariables,
    values: &NamedValues,
) -> Result<Entity, ConversionError> {
    let type_name = spec.type_name();
    let lowercase = type_name.to_lowercase();
    let mut entity = Entity::new(type_name);

    for (field, ty) in spec.fields() {
        let found = path_vars
            .get(field)
            .map(Value::from)
            .or_else(|| values.raw_value(field))
            .or_else(|| values.raw_value(&format!("{type_name}.{field}")))
            .or_else(|| values.raw_value(&format!("{lowercase}.{field}")));

        let value = match found {
            Some(value) => convert(&value, *ty)?,
            None => ty.zero_value(),
        };
        entity.set(field.as_str(), value);
    }

    Ok(entity)
}

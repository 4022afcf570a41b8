//! Dynamically typed request and session values.
//!
//! Form fields, query parameters, uploaded files and session attributes all end up
//! as a [`Value`]. The variants keep the classification the binder needs
//! (text, number, boolean, file, file list) so conversion stays exhaustive.

use crate::upload::UploadedFile;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// A dynamically typed value bound from a request or stored in a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Str(String),
    /// A multi-valued text field, e.g. `?tag=a&tag=b`
    List(Vec<String>),
    File(UploadedFile),
    Files(Vec<UploadedFile>),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The textual form used when a value has to be re-parsed into another type.
    ///
    /// Returns `None` for null and for file values, which have no textual form.
    /// A list yields its first element.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null | Value::File(_) | Value::Files(_) => None,
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            Value::Int(i) => Some(Cow::Owned(i.to_string())),
            Value::Long(l) => Some(Cow::Owned(l.to_string())),
            Value::Float(f) => Some(Cow::Owned(f.to_string())),
            Value::Double(d) => Some(Cow::Owned(d.to_string())),
            Value::Char(c) => Some(Cow::Owned(c.to_string())),
            Value::Str(s) => Some(Cow::Borrowed(s.as_str())),
            Value::List(list) => list.first().map(|s| Cow::Borrowed(s.as_str())),
        }
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::File(_) => "file",
            Value::Files(_) => "file list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(f64::from(*i)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::List(list) => write!(f, "[{}]", list.join(", ")),
            Value::File(file) => write!(f, "file({})", file.original_filename()),
            Value::Files(files) => write!(f, "files({})", files.len()),
            other => match other.text() {
                Some(text) => f.write_str(&text),
                None => Ok(()),
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i32(*i),
            Value::Long(l) => serializer.serialize_i64(*l),
            Value::Float(f) => serializer.serialize_f32(*f),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::Char(c) => serializer.serialize_char(*c),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(list) => list.serialize(serializer),
            Value::File(file) => file.serialize(serializer),
            Value::Files(files) => files.serialize(serializer),
        }
    }
}

macro_rules! impl_from_for_value {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            #[inline]
            fn from(value: $ty) -> Self {
                Value::$variant(value)
            }
        }
    };
}

impl_from_for_value!(bool, Bool);
impl_from_for_value!(i32, Int);
impl_from_for_value!(i64, Long);
impl_from_for_value!(f32, Float);
impl_from_for_value!(f64, Double);
impl_from_for_value!(char, Char);
impl_from_for_value!(String, Str);
impl_from_for_value!(Vec<String>, List);
impl_from_for_value!(UploadedFile, File);
impl_from_for_value!(Vec<UploadedFile>, Files);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

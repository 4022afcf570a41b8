//! Typed extraction of bound arguments.
//!
//! The binder produces one [`Arg`] per declared parameter. [`FromArg`] turns a
//! single `Arg` into the Rust type a handler function takes, and [`FromArgs`] does
//! the same positionally for a whole tuple of arguments.

use crate::binder::Entity;
use crate::request::{PathVariables, RequestContext, ResponseHandle};
use crate::session::SessionHandle;
use crate::upload::UploadedFile;
use crate::value::Value;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// A bound handler argument.
#[derive(Debug, Clone)]
pub enum Arg {
    Request(RequestContext),
    Response(ResponseHandle),
    Value(Value),
    PathVariables(PathVariables),
    NamedValues(HashMap<String, Value>),
    Entity(Entity),
}

impl Arg {
    fn describe(&self) -> String {
        match self {
            Arg::Request(_) => "request".to_owned(),
            Arg::Response(_) => "response".to_owned(),
            Arg::Value(value) => format!("{} value", value.type_name()),
            Arg::PathVariables(_) => "path variables".to_owned(),
            Arg::NamedValues(_) => "named values".to_owned(),
            Arg::Entity(entity) => format!("entity {}", entity.type_name()),
        }
    }
}

/// The declared parameters and the handler function signature disagree.
#[derive(Error, Debug)]
pub enum ArgError {
    #[error("handler takes {expected} arguments but {actual} were bound")]
    Arity { expected: usize, actual: usize },

    #[error("cannot extract {target} from a bound {found}")]
    Mismatch { target: &'static str, found: String },

    /// A null value was bound where the handler takes a non-optional type.
    #[error("argument {position} is missing, {target} takes no null value")]
    Missing { target: &'static str, position: usize },

    #[error("cannot build {target} from entity: {reason}")]
    Model { target: &'static str, reason: String },
}

impl ArgError {
    pub fn mismatch(target: &'static str, arg: &Arg) -> Self {
        Self::Mismatch { target, found: arg.describe() }
    }

    pub fn missing(target: &'static str) -> Self {
        Self::Missing { target, position: 0 }
    }

    /// Records the position of the failing argument in the handler signature.
    fn at(self, position: usize) -> Self {
        match self {
            Self::Missing { target, .. } => Self::Missing { target, position },
            other => other,
        }
    }
}

pub trait FromArg: Sized {
    fn from_arg(arg: Arg) -> Result<Self, ArgError>;
}

pub trait FromArgs: Sized {
    const ARITY: usize;

    fn from_args(args: Vec<Arg>) -> Result<Self, ArgError>;
}

impl FromArg for Arg {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        Ok(arg)
    }
}

impl FromArg for Value {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        match arg {
            Arg::Value(value) => Ok(value),
            other => Err(ArgError::mismatch("Value", &other)),
        }
    }
}

/// `None` for a null value, otherwise the inner extraction.
impl<T: FromArg> FromArg for Option<T> {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        match arg {
            Arg::Value(Value::Null) => Ok(None),
            other => T::from_arg(other).map(Some),
        }
    }
}

macro_rules! impl_from_arg_for_value {
    ($ty:ty, $($variant:ident)|+ => $conv:expr) => {
        impl FromArg for $ty {
            fn from_arg(arg: Arg) -> Result<Self, ArgError> {
                match arg {
                    $(Arg::Value(Value::$variant(v)) => Ok($conv(v)),)+
                    Arg::Value(Value::Null) => Err(ArgError::missing(stringify!($ty))),
                    other => Err(ArgError::mismatch(stringify!($ty), &other)),
                }
            }
        }
    };
}

impl_from_arg_for_value!(i32, Int => |v| v);
impl_from_arg_for_value!(i64, Long | Int => i64::from);
impl_from_arg_for_value!(f32, Float => |v| v);
impl_from_arg_for_value!(f64, Double | Float => f64::from);
impl_from_arg_for_value!(bool, Bool => |v| v);
impl_from_arg_for_value!(char, Char => |v| v);
impl_from_arg_for_value!(String, Str => |v| v);
impl_from_arg_for_value!(UploadedFile, File => |v| v);
impl_from_arg_for_value!(Vec<UploadedFile>, Files => |v| v);

impl FromArg for RequestContext {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        match arg {
            Arg::Request(ctx) => Ok(ctx),
            other => Err(ArgError::mismatch("RequestContext", &other)),
        }
    }
}

/// Taken from a request parameter.
impl FromArg for SessionHandle {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        match arg {
            Arg::Request(ctx) => Ok(ctx.session().clone()),
            other => Err(ArgError::mismatch("SessionHandle", &other)),
        }
    }
}

impl FromArg for ResponseHandle {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        match arg {
            Arg::Response(handle) => Ok(handle),
            other => Err(ArgError::mismatch("ResponseHandle", &other)),
        }
    }
}

impl FromArg for PathVariables {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        match arg {
            Arg::PathVariables(vars) => Ok(vars),
            other => Err(ArgError::mismatch("PathVariables", &other)),
        }
    }
}

impl FromArg for HashMap<String, Value> {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        match arg {
            Arg::NamedValues(values) => Ok(values),
            other => Err(ArgError::mismatch("HashMap<String, Value>", &other)),
        }
    }
}

impl FromArg for Entity {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        match arg {
            Arg::Entity(entity) => Ok(entity),
            other => Err(ArgError::mismatch("Entity", &other)),
        }
    }
}

/// An entity parameter deserialized into `T`.
///
/// Fields are matched by name, unbound fields arrive as `null`, so `T` should use
/// `Option` or `#[serde(default)]` for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Model<T>(pub T);

impl<T> Model<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Model<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Model<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: DeserializeOwned> FromArg for Model<T> {
    fn from_arg(arg: Arg) -> Result<Self, ArgError> {
        let target = std::any::type_name::<T>();
        match arg {
            Arg::Entity(entity) => serde_json::to_value(&entity)
                .and_then(serde_json::from_value)
                .map(Model)
                .map_err(|e| ArgError::Model { target, reason: e.to_string() }),
            other => Err(ArgError::mismatch("Model", &other)),
        }
    }
}

macro_rules! impl_from_args_for_tuple {
    ($($param:ident)*) => {
        impl<$($param: FromArg,)*> FromArgs for ($($param,)*) {
            const ARITY: usize = <[&str]>::len(&[$(stringify!($param)),*]);

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn from_args(args: Vec<Arg>) -> Result<Self, ArgError> {
                if args.len() != Self::ARITY {
                    return Err(ArgError::Arity { expected: Self::ARITY, actual: args.len() });
                }
                let mut iter = args.into_iter();
                let mut position = 0usize;
                $(
                let $param = match iter.next() {
                    Some(arg) => $param::from_arg(arg).map_err(|e| e.at(position))?,
                    None => return Err(ArgError::Arity { expected: Self::ARITY, actual: 0 }),
                };
                position += 1;
                )*
                Ok(($($param,)*))
            }
        }
    };
}

impl_from_args_for_tuple! {}
impl_from_args_for_tuple! { A }
impl_from_args_for_tuple! { A B }
impl_from_args_for_tuple! { A B C }
impl_from_args_for_tuple! { A B C D }
impl_from_args_for_tuple! { A B C D E }
impl_from_args_for_tuple! { A B C D E F }
impl_from_args_for_tuple! { A B C D E F G }
impl_from_args_for_tuple! { A B C D E F G H }
impl_from_args_for_tuple! { A B C D E F G H I }
impl_from_args_for_tuple! { A B C D E F G H I J }
impl_from_args_for_tuple! { A B C D E F G H I J K }
impl_from_args_for_tuple! { A B C D E F G H I J K L }

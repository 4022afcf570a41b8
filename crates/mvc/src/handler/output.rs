use super::HandlerError;
use crate::value::Value;
use crate::view::View;
use serde::Serialize;
use std::fmt::Display;

/// What a handler returned, before view resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// A view object: render it or follow its redirect.
    View(View),
    /// A bare template name rendered without data.
    Template(String),
    /// Data written to the response as text or JSON.
    Raw(serde_json::Value),
    Null,
}

/// Converts a handler function's return value into a [`HandlerOutput`].
pub trait IntoHandlerOutput {
    fn into_output(self) -> Result<HandlerOutput, HandlerError>;
}

impl IntoHandlerOutput for HandlerOutput {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        Ok(self)
    }
}

impl IntoHandlerOutput for View {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::View(self))
    }
}

/// A returned string names a template.
impl IntoHandlerOutput for String {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::Template(self))
    }
}

impl IntoHandlerOutput for &'static str {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::Template(self.to_owned()))
    }
}

impl IntoHandlerOutput for () {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::Null)
    }
}

impl<T: IntoHandlerOutput> IntoHandlerOutput for Option<T> {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        match self {
            Some(t) => t.into_output(),
            None => Ok(HandlerOutput::Null),
        }
    }
}

/// An `Err` fails the request with the error's message.
impl<T: IntoHandlerOutput, E: Display> IntoHandlerOutput for Result<T, E> {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        match self {
            Ok(t) => t.into_output(),
            Err(e) => Err(HandlerError::failed(e)),
        }
    }
}

impl IntoHandlerOutput for serde_json::Value {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::Raw(self))
    }
}

impl IntoHandlerOutput for Value {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        Data(self).into_output()
    }
}

/// Raw data returned from a handler, serialized with serde.
#[derive(Debug, Clone, PartialEq)]
pub struct Data<T>(pub T);

impl<T: Serialize> IntoHandlerOutput for Data<T> {
    fn into_output(self) -> Result<HandlerOutput, HandlerError> {
        serde_json::to_value(&self.0).map(HandlerOutput::Raw).map_err(HandlerError::failed)
    }
}

macro_rules! impl_into_output_for_raw {
    ($($ty:ty),*) => {
        $(
        impl IntoHandlerOutput for $ty {
            fn into_output(self) -> Result<HandlerOutput, HandlerError> {
                Ok(HandlerOutput::Raw(serde_json::Value::from(self)))
            }
        }
        )*
    };
}

impl_into_output_for_raw!(bool, i32, i64, u32, u64, f32, f64);

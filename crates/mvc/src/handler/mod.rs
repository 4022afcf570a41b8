//! Handlers and their registration data.
//!
//! A [`Handler`] receives the arguments produced by the binder, in declared order,
//! and returns a [`HandlerOutput`]. Plain async functions become handlers through
//! [`handler_fn`]: their arguments are extracted with [`FromArg`] and their return
//! value converted with [`IntoHandlerOutput`].

mod arg;
mod descriptor;
mod fn_trait;
mod output;
mod param;

pub use arg::{Arg, ArgError, FromArg, FromArgs, Model};
pub use descriptor::{HandlerDescriptor, HandlerMetadata, MethodMatcher, ResponseFormat};
pub use fn_trait::FnTrait;
pub use output::{Data, HandlerOutput, IntoHandlerOutput};
pub use param::{Binding, EntitySpec, MapValueType, ParamType, ParameterSpec, ScalarKind, ScalarType};

use async_trait::async_trait;
use std::fmt::Display;
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandlerError {
    /// The bound arguments don't fit the handler's signature.
    #[error("handler signature does not match its parameters: {source}")]
    Signature {
        #[from]
        source: ArgError,
    },

    #[error("{message}")]
    Failed { message: String },
}

impl HandlerError {
    pub fn failed<S: Display>(message: S) -> Self {
        Self::Failed { message: message.to_string() }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, args: Vec<Arg>) -> Result<HandlerOutput, HandlerError>;
}

/// a `FnTrait` holder which represents any async Fn
pub struct FnHandler<F, Args> {
    f: F,
    _phantom: PhantomData<fn(Args)>,
}

impl<F, Args> FnHandler<F, Args>
where
    F: FnTrait<Args>,
{
    fn new(f: F) -> Self {
        Self { f, _phantom: PhantomData }
    }
}

pub fn handler_fn<F, Args>(f: F) -> FnHandler<F, Args>
where
    F: FnTrait<Args>,
{
    FnHandler::new(f)
}

#[async_trait]
impl<F, Args> Handler for FnHandler<F, Args>
where
    F: FnTrait<Args>,
    F::Output: IntoHandlerOutput,
    Args: FromArgs + Send,
{
    async fn invoke(&self, args: Vec<Arg>) -> Result<HandlerOutput, HandlerError> {
        let args = Args::from_args(args)?;
        self.f.call(args).await.into_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::view::View;

    fn assert_is_handler<T: Handler>(_handler: &T) {
        // no op
    }

    #[test]
    fn assert_fn_is_handler() {
        async fn get(_id: i32) -> View {
            View::page("detail")
        }
        async fn list() -> &'static str {
            "list"
        }

        assert_is_handler(&handler_fn(get));
        assert_is_handler(&handler_fn(list));
    }

    #[tokio::test]
    async fn invoke_extracts_and_converts() {
        async fn show(id: i32, name: Option<String>) -> View {
            View::page_with("detail", serde_json::json!({ "id": id, "name": name }))
        }

        let handler = handler_fn(show);
        let output = handler.invoke(vec![Arg::Value(Value::Int(42)), Arg::Value(Value::Null)]).await.unwrap();

        let HandlerOutput::View(view) = output else {
            panic!("expected a view");
        };
        assert_eq!(view.template(), "detail");
        assert_eq!(view.data(), Some(&serde_json::json!({ "id": 42, "name": null })));
    }

    #[tokio::test]
    async fn signature_mismatch_is_reported() {
        async fn show(_id: i32) {}

        let err = handler_fn(show).invoke(vec![Arg::Value(Value::from("x"))]).await.unwrap_err();
        assert!(matches!(err, HandlerError::Signature { source: ArgError::Mismatch { .. } }));

        let err = handler_fn(show).invoke(vec![Arg::Value(Value::Null)]).await.unwrap_err();
        assert!(matches!(err, HandlerError::Signature { source: ArgError::Missing { position: 0, .. } }));
    }

    #[tokio::test]
    async fn failing_handler() {
        async fn fail() -> Result<View, String> {
            Err("database is down".into())
        }

        let err = handler_fn(fail).invoke(vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "database is down");
    }
}

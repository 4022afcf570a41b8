//! An async micro MVC dispatch layer on top of the `http` types.
//!
//! Handlers are plain async functions registered with a URL pattern, an HTTP method
//! and the declared list of their parameters. For every request the [`Dispatcher`]
//!
//! 1. matches the path and method against the [`Router`]
//! 2. resolves the session from the `FRAMEWORK_SESSIONID` cookie
//! 3. merges the query string with the urlencoded or multipart body
//! 4. binds the handler arguments from path variables, named values, the session
//!    and the ambient request/response values
//! 5. invokes the handler and resolves its result into a redirect, a rendered
//!    template or raw data
//!
//! ```ignore
//! use micro_mvc::{Dispatcher, HandlerDescriptor, ParameterSpec, ScalarType, View, handler_fn};
//!
//! async fn product(id: i32) -> View {
//!     View::page_with("productDetail", serde_json::json!({ "id": id }))
//! }
//!
//! let dispatcher = Dispatcher::builder()
//!     .route(HandlerDescriptor::get("products/{id}", handler_fn(product)).param(ParameterSpec::scalar("id", ScalarType::INT)))
//!     .template_engine(my_engine)
//!     .build()?;
//!
//! let response = dispatcher.dispatch(request).await;
//! ```

mod body;
mod dispatcher;
mod form;
mod home;
mod request;
mod responder;
mod value;

pub mod binder;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod router;
pub mod session;
pub mod upload;
pub mod view;

pub use body::ResponseBody;
pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DispatcherBuildError, DispatcherBuilder};
pub use error::{BodyError, DispatchError};
pub use form::{NamedValue, NamedValues};
pub use handler::{Handler, HandlerDescriptor, ParameterSpec, ScalarType, handler_fn};
pub use home::render_home;
pub use request::{PathVariables, RequestContext, ResponseHandle};
pub use responder::{Html, Json, Redirect, Responder};
pub use router::Router;
pub use session::{SessionHandle, SessionStore};
pub use upload::UploadedFile;
pub use value::Value;
pub use view::{TemplateEngine, View};

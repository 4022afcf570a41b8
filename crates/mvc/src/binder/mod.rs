//! Builds the argument list of a handler from the sources of a request.
//!
//! Every declared [`ParameterSpec`] is bound on its own, in declaration order,
//! from one of the ambient sources:
//!
//! | parameter            | source                                                      |
//! |----------------------|-------------------------------------------------------------|
//! | request / response   | the request context / the response handle                   |
//! | session              | the session value under the binding key                     |
//! | file / file list     | uploaded files of the named value                           |
//! | map of strings       | all path variables                                          |
//! | map of values        | all named values, smart-typed                               |
//! | entity               | field by field, see [`Entity`]                              |
//! | scalar               | path variable, then named value, converted to the type     |

mod convert;
mod entity;

pub use convert::{ConversionError, convert, smart_convert};
pub use entity::Entity;

use crate::form::{NamedValue, NamedValues};
use crate::handler::{Arg, HandlerDescriptor, MapValueType, ParamType, ParameterSpec, ScalarType};
use crate::request::{PathVariables, RequestContext, ResponseHandle};
use crate::session::SessionStore;
use crate::value::Value;
use thiserror::Error;
use tracing::trace;

/// A required value is missing from the request or the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("required session value '{key}' is missing")]
    MissingSession { key: String },

    #[error("required parameter '{name}' is missing")]
    MissingParameter { name: String },
}

impl BindingError {
    pub fn missing_session<S: ToString>(key: S) -> Self {
        Self::MissingSession { key: key.to_string() }
    }

    pub fn missing_parameter<S: ToString>(name: S) -> Self {
        Self::MissingParameter { name: name.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum BindError {
    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The parameter declaration itself is unsupported.
    #[error("invalid parameter declaration: {reason}")]
    Configuration { reason: String },
}

impl BindError {
    pub fn configuration<S: ToString>(str: S) -> Self {
        Self::Configuration { reason: str.to_string() }
    }
}

/// The per-request sources a handler's arguments are bound from.
#[derive(Debug, Clone, Copy)]
pub struct BindContext<'a> {
    pub request: &'a RequestContext,
    pub response: &'a ResponseHandle,
    pub path_vars: &'a PathVariables,
    pub values: &'a NamedValues,
    pub sessions: &'a SessionStore,
    pub session_id: &'a str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterBinder;

impl ParameterBinder {
    pub fn new() -> Self {
        Self
    }

    /// Binds every declared parameter. The result has one [`Arg`] per parameter, in
    /// declaration order. The first failing parameter aborts binding.
    pub fn bind(&self, descriptor: &HandlerDescriptor, ctx: &BindContext<'_>) -> Result<Vec<Arg>, BindError> {
        let args = descriptor
            .parameters()
            .iter()
            .map(|spec| self.bind_parameter(spec, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        trace!(pattern = descriptor.url_pattern(), count = args.len(), "bound handler arguments");
        Ok(args)
    }

    fn bind_parameter(&self, spec: &ParameterSpec, ctx: &BindContext<'_>) -> Result<Arg, BindError> {
        match spec.ty() {
            ParamType::Request => Ok(Arg::Request(ctx.request.clone())),
            ParamType::Response => Ok(Arg::Response(ctx.response.clone())),
            ParamType::Session(ty) => Self::bind_session(spec, *ty, ctx).map(Arg::Value),
            ParamType::File => {
                let file = match ctx.values.get(spec.lookup_name()) {
                    Some(NamedValue::File(file)) => Value::File(file.clone()),
                    Some(NamedValue::Files(files)) => files.first().cloned().map_or(Value::Null, Value::File),
                    _ => Value::Null,
                };
                Ok(Arg::Value(file))
            }
            ParamType::FileList => {
                let files = match ctx.values.get(spec.lookup_name()) {
                    Some(NamedValue::Files(files)) => files.clone(),
                    Some(NamedValue::File(file)) => vec![file.clone()],
                    _ => Vec::new(),
                };
                Ok(Arg::Value(Value::Files(files)))
            }
            ParamType::Map(MapValueType::Any) => Ok(Arg::NamedValues(ctx.values.typed().clone())),
            ParamType::Map(MapValueType::String) => Ok(Arg::PathVariables(ctx.path_vars.clone())),
            ParamType::Map(MapValueType::Other(value_type)) => Err(BindError::configuration(format!(
                "parameter '{}' is a map of unsupported value type {value_type}",
                spec.name()
            ))),
            ParamType::Entity(entity) => {
                let entity = entity::bind_entity(entity, ctx.path_vars, ctx.values)?;
                Ok(Arg::Entity(entity))
            }
            ParamType::Scalar(ty) => Self::bind_scalar(spec, *ty, ctx).map(Arg::Value),
        }
    }

    fn bind_session(spec: &ParameterSpec, ty: ScalarType, ctx: &BindContext<'_>) -> Result<Value, BindError> {
        let key = spec.session_key();
        if let Some(value) = ctx.sessions.get(ctx.session_id, key) {
            return Ok(convert(&value, ty)?);
        }

        if spec.is_required() {
            return Err(BindingError::missing_session(key).into());
        }

        match spec.binding().map(|b| b.default_value.as_str()).filter(|d| !d.is_empty()) {
            Some(default) => Ok(convert(&Value::from(default), ty)?),
            None => Ok(ty.zero_value()),
        }
    }

    /// Path variables take precedence over named values.
    fn bind_scalar(spec: &ParameterSpec, ty: ScalarType, ctx: &BindContext<'_>) -> Result<Value, BindError> {
        let name = spec.lookup_name();
        let found = ctx.path_vars.get(name).map(Value::from).or_else(|| ctx.values.raw_value(name));

        match found {
            Some(value) => Ok(convert(&value, ty)?),
            None if spec.is_required() && ty.is_primitive() => Err(BindingError::missing_parameter(name).into()),
            None => Ok(ty.zero_value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Binding, EntitySpec, handler_fn};
    use crate::upload::{Upload, UploadedFile};
    use http::Request;
    use std::collections::HashMap;

    async fn noop() {}

    struct Fixture {
        request: RequestContext,
        response: ResponseHandle,
        path_vars: PathVariables,
        values: NamedValues,
        sessions: SessionStore,
        session_id: String,
    }

    impl Fixture {
        fn new(path_vars: &[(&str, &str)], values: NamedValues) -> Self {
            let sessions = SessionStore::default();
            let (session_id, _) = sessions.get_or_create(None);
            let (parts, ()) = Request::builder().uri("/test").body(()).unwrap().into_parts();
            Self {
                request: RequestContext::new(&parts, sessions.handle(&session_id)),
                response: ResponseHandle::new(),
                path_vars: path_vars.iter().copied().collect(),
                values,
                sessions,
                session_id,
            }
        }

        fn ctx(&self) -> BindContext<'_> {
            BindContext {
                request: &self.request,
                response: &self.response,
                path_vars: &self.path_vars,
                values: &self.values,
                sessions: &self.sessions,
                session_id: &self.session_id,
            }
        }

        fn bind(&self, params: Vec<ParameterSpec>) -> Result<Vec<Arg>, BindError> {
            let descriptor = HandlerDescriptor::get("test", handler_fn(noop)).params(params);
            ParameterBinder::new().bind(&descriptor, &self.ctx())
        }
    }

    fn value(arg: &Arg) -> &Value {
        match arg {
            Arg::Value(value) => value,
            other => panic!("expected a value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scalars_prefer_path_variables() {
        let fixture = Fixture::new(&[("id", "12")], NamedValues::from_pairs([("id", "99"), ("name", "Ann")]));
        let args = fixture
            .bind(vec![ParameterSpec::scalar("id", ScalarType::INT), ParameterSpec::scalar("name", ScalarType::STRING)])
            .unwrap();

        assert_eq!(value(&args[0]), &Value::Int(12));
        assert_eq!(value(&args[1]), &Value::from("Ann"));
    }

    #[tokio::test]
    async fn binding_source_renames_lookup() {
        let fixture = Fixture::new(&[], NamedValues::from_pairs([("q", "rust")]));
        let args = fixture
            .bind(vec![ParameterSpec::scalar("query", ScalarType::STRING).with_binding(Binding::source("q"))])
            .unwrap();
        assert_eq!(value(&args[0]), &Value::from("rust"));
    }

    #[tokio::test]
    async fn missing_scalars() {
        let fixture = Fixture::new(&[], NamedValues::default());

        let args = fixture
            .bind(vec![
                ParameterSpec::scalar("page", ScalarType::INT),
                ParameterSpec::scalar("name", ScalarType::STRING).with_binding(Binding::new().required(true)),
                ParameterSpec::scalar("limit", ScalarType::LONG.optional()),
            ])
            .unwrap();
        assert_eq!(value(&args[0]), &Value::Int(0));
        assert_eq!(value(&args[1]), &Value::Null);
        assert_eq!(value(&args[2]), &Value::Null);

        let err = fixture
            .bind(vec![ParameterSpec::scalar("page", ScalarType::INT).with_binding(Binding::new().required(true))])
            .unwrap_err();
        assert!(matches!(err, BindError::Binding(BindingError::MissingParameter { .. })));
    }

    #[tokio::test]
    async fn nullable_conversion_failure() {
        let fixture = Fixture::new(&[], NamedValues::from_pairs([("age", "old")]));
        let err = fixture.bind(vec![ParameterSpec::scalar("age", ScalarType::INT.optional())]).unwrap_err();
        assert!(matches!(err, BindError::Conversion(_)));

        let args = fixture.bind(vec![ParameterSpec::scalar("age", ScalarType::INT)]).unwrap();
        assert_eq!(value(&args[0]), &Value::Int(0));
    }

    #[tokio::test]
    async fn session_parameters() {
        let fixture = Fixture::new(&[], NamedValues::default());
        fixture.sessions.set(&fixture.session_id, "userId", "7");

        let args = fixture
            .bind(vec![
                ParameterSpec::session("userId", ScalarType::INT),
                ParameterSpec::session("theme", ScalarType::STRING).with_binding(Binding::new().default_value("dark")),
                ParameterSpec::session("visits", ScalarType::INT),
                ParameterSpec::session("uid", ScalarType::LONG).with_binding(Binding::new().alias("userId")),
            ])
            .unwrap();

        assert_eq!(value(&args[0]), &Value::Int(7));
        assert_eq!(value(&args[1]), &Value::from("dark"));
        assert_eq!(value(&args[2]), &Value::Int(0));
        assert_eq!(value(&args[3]), &Value::Long(7));
    }

    #[tokio::test]
    async fn required_session_value_missing() {
        let fixture = Fixture::new(&[], NamedValues::default());
        let err = fixture
            .bind(vec![
                ParameterSpec::session("user", ScalarType::STRING).with_binding(Binding::new().required(true)),
            ])
            .unwrap_err();
        assert!(matches!(err, BindError::Binding(BindingError::MissingSession { ref key }) if key == "user"));
    }

    #[tokio::test]
    async fn files_and_file_lists() {
        let photo = UploadedFile::from_bytes("photo", "p.png", Some("image/png".into()), &b"p"[..]);
        let mut files = HashMap::new();
        files.insert("photo".to_owned(), vec![photo.clone()]);
        let values = NamedValues::merge(Vec::new(), Upload::from_parts(files, HashMap::new()));
        let fixture = Fixture::new(&[], values);

        let args = fixture
            .bind(vec![
                ParameterSpec::file("photo"),
                ParameterSpec::files("photo"),
                ParameterSpec::file("missing"),
                ParameterSpec::files("missing"),
            ])
            .unwrap();

        assert_eq!(value(&args[0]), &Value::File(photo.clone()));
        assert_eq!(value(&args[1]), &Value::Files(vec![photo]));
        assert_eq!(value(&args[2]), &Value::Null);
        assert_eq!(value(&args[3]), &Value::Files(vec![]));
    }

    #[tokio::test]
    async fn maps_and_ambient_values() {
        let fixture = Fixture::new(&[("id", "1")], NamedValues::from_pairs([("n", "5")]));
        let args = fixture
            .bind(vec![
                ParameterSpec::request("req"),
                ParameterSpec::response("resp"),
                ParameterSpec::path_variables("vars"),
                ParameterSpec::named_values("all"),
            ])
            .unwrap();

        assert!(matches!(args[0], Arg::Request(_)));
        assert!(matches!(args[1], Arg::Response(_)));
        assert!(matches!(&args[2], Arg::PathVariables(vars) if vars.get("id") == Some("1")));
        assert!(matches!(&args[3], Arg::NamedValues(all) if all.get("n") == Some(&Value::Int(5))));
    }

    #[tokio::test]
    async fn unsupported_map_is_configuration_error() {
        let fixture = Fixture::new(&[], NamedValues::default());
        let err = fixture
            .bind(vec![ParameterSpec::new("m", ParamType::Map(MapValueType::Other("Integer".into())))])
            .unwrap_err();
        assert!(matches!(err, BindError::Configuration { .. }));
    }

    #[tokio::test]
    async fn entities() {
        let fixture = Fixture::new(&[], NamedValues::from_pairs([("product.name", "Lamp"), ("price", "9.5")]));
        let spec = EntitySpec::new("Product").field("name", ScalarType::STRING).field("price", ScalarType::DOUBLE);
        let args = fixture.bind(vec![ParameterSpec::entity("product", spec)]).unwrap();

        let Arg::Entity(entity) = &args[0] else {
            panic!("expected an entity");
        };
        assert_eq!(entity.get("name"), Some(&Value::from("Lamp")));
        assert_eq!(entity.get("price"), Some(&Value::Double(9.5)));
    }
}

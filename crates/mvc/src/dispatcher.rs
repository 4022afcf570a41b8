//! The end-to-end request flow.
//!
//! [`Dispatcher::dispatch`] routes a request, resolves its session, reads its named
//! values, binds the handler arguments, invokes the handler and turns the result
//! into a response. Every failure ends as a response with the status of the
//! [`DispatchError`]; dispatch itself never fails.

use crate::binder::{BindContext, BindError, BindingError, ParameterBinder};
use crate::body::ResponseBody;
use crate::config::DispatcherConfig;
use crate::error::{BoxError, DispatchError};
use crate::form::NamedValues;
use crate::handler::{ArgError, HandlerDescriptor, HandlerError, ParamType, ResponseFormat};
use crate::home::render_home;
use crate::request::{RequestContext, ResponseHandle};
use crate::responder::{Html, Json, Redirect, Responder};
use crate::router::{RouteMatch, Router};
use crate::session::{SessionStore, cookie};
use crate::upload::UploadExtractor;
use crate::view::{TemplateEngine, ViewOutcome, ViewResolver};
use arc_swap::ArcSwap;
use bytes::Bytes;
use http::header::SET_COOKIE;
use http::request::Parts;
use http::{Request, Response};
use http_body::Body;
use http_body_util::Limited;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum DispatcherBuildError {
    #[error("template engine must be set")]
    MissingTemplateEngine,
}

pub struct DispatcherBuilder {
    routes: Vec<HandlerDescriptor>,
    config: DispatcherConfig,
    engine: Option<Arc<dyn TemplateEngine>>,
    sessions: Option<SessionStore>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self { routes: Vec::new(), config: DispatcherConfig::default(), engine: None, sessions: None }
    }

    pub fn route(mut self, descriptor: HandlerDescriptor) -> Self {
        self.routes.push(descriptor);
        self
    }

    pub fn routes(mut self, descriptors: impl IntoIterator<Item = HandlerDescriptor>) -> Self {
        self.routes.extend(descriptors);
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn template_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// Shares an existing session store instead of creating one from the config.
    pub fn sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn build(self) -> Result<Dispatcher, DispatcherBuildError> {
        let engine = self.engine.ok_or(DispatcherBuildError::MissingTemplateEngine)?;
        let config = self.config;

        let router = Router::builder().routes(self.routes).build();
        info!(routes = router.len(), "registered routes");

        Ok(Dispatcher {
            router: ArcSwap::from_pointee(router),
            sessions: self.sessions.unwrap_or_else(|| SessionStore::new(config.session_timeout())),
            binder: ParameterBinder::new(),
            uploads: UploadExtractor::new(config.upload_cache_threshold),
            views: ViewResolver::new(config.views_root.clone(), config.template_extension.clone()),
            engine,
            config,
        })
    }
}

pub struct Dispatcher {
    router: ArcSwap<Router>,
    sessions: SessionStore,
    binder: ParameterBinder,
    uploads: UploadExtractor,
    views: ViewResolver,
    engine: Arc<dyn TemplateEngine>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Replaces the route table. Requests already routed keep their handler.
    pub fn reload_routes(&self, routes: impl IntoIterator<Item = HandlerDescriptor>) {
        let router = Router::builder().routes(routes).build();
        info!(routes = router.len(), "reloaded routes");
        self.router.store(Arc::new(router));
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.load_full()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub async fn dispatch<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let router = self.router.load_full();

        if self.config.home_page && matches!(parts.uri.path(), "" | "/") {
            return Html(render_home(&router)).into_response();
        }

        let route = match router.at(parts.uri.path(), &parts.method) {
            Ok(route) => route,
            Err(e) => return Self::failed(&parts, e.into()),
        };

        let (session_id, created) = self.sessions.get_or_create(cookie::session_id(&parts.headers));
        let response_handle = ResponseHandle::new();

        let mut response = match self.handle(route, &parts, body, &session_id, &response_handle).await {
            Ok(mut response) => {
                response_handle.apply_to(&mut response);
                debug!(method = %parts.method, path = parts.uri.path(), status = %response.status(), "dispatched request");
                response
            }
            Err(e) => Self::failed(&parts, e),
        };

        if created {
            match cookie::set_cookie(&session_id, self.sessions.timeout()) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => error!(cause = %e, "failed to build session cookie"),
            }
        }

        response
    }

    async fn handle<B>(
        &self,
        route: RouteMatch,
        parts: &Parts,
        body: B,
        session_id: &str,
        response_handle: &ResponseHandle,
    ) -> Result<Response<ResponseBody>, DispatchError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (descriptor, path_vars) = route.into_parts();
        let request = RequestContext::new(parts, self.sessions.handle(session_id));

        let body = Limited::new(body, self.config.max_body_size);
        let values = NamedValues::from_request(parts.uri.query(), &parts.headers, body, &self.uploads).await?;

        let ctx = BindContext {
            request: &request,
            response: response_handle,
            path_vars: &path_vars,
            values: &values,
            sessions: &self.sessions,
            session_id,
        };
        let args = self.binder.bind(&descriptor, &ctx)?;

        let output = descriptor
            .handler()
            .invoke(args)
            .await
            .map_err(|e| Self::invocation_failed(&descriptor, e))?;
        let outcome = self.views.resolve(output).await?;
        self.respond(outcome, descriptor.format()).await
    }

    async fn respond(&self, outcome: ViewOutcome, format: ResponseFormat) -> Result<Response<ResponseBody>, DispatchError> {
        let bindings = outcome.bindings();
        let response = match outcome {
            ViewOutcome::Redirect { target_url } => Redirect(target_url).into_response(),
            ViewOutcome::Render { template_path, .. } => {
                let html = self.engine.render(&template_path, &bindings).await?;
                Html(html).into_response()
            }
            ViewOutcome::Raw { value: serde_json::Value::Null } => ().into_response(),
            ViewOutcome::Raw { value } => match (format, value) {
                (ResponseFormat::Json, value) => Json(value).into_response(),
                (ResponseFormat::Text, serde_json::Value::String(text)) => text.into_response(),
                (ResponseFormat::Text, value) => value.to_string().into_response(),
            },
        };
        Ok(response)
    }

    /// A null bound to a non-optional argument is a missing value of the request.
    /// Any other signature disagreement is a declaration fault.
    fn invocation_failed(descriptor: &HandlerDescriptor, e: HandlerError) -> DispatchError {
        match e {
            HandlerError::Signature { source: ArgError::Missing { position, target } } => {
                match descriptor.parameters().get(position) {
                    Some(spec) if matches!(spec.ty(), ParamType::Session(_)) => {
                        BindError::from(BindingError::missing_session(spec.session_key())).into()
                    }
                    Some(spec) => BindError::from(BindingError::missing_parameter(spec.lookup_name())).into(),
                    None => BindError::configuration(format!("argument {position} of type {target} has no parameter")).into(),
                }
            }
            HandlerError::Signature { source } => BindError::configuration(source).into(),
            failed => failed.into(),
        }
    }

    fn failed(parts: &Parts, e: DispatchError) -> Response<ResponseBody> {
        let status = e.status();
        if e.is_client_error() {
            warn!(method = %parts.method, path = parts.uri.path(), status = %status, cause = %e, "request rejected");
        } else {
            error!(method = %parts.method, path = parts.uri.path(), status = %status, cause = %e, "request failed");
        }
        e.into_response()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.load().len())
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("routes", &self.routes.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ParameterSpec, ScalarType, handler_fn};
    use crate::view::{MockTemplateEngine, View};
    use http::{Method, StatusCode};
    use http_body_util::{BodyExt, Empty, Full};

    fn request(method: Method, uri: &str) -> Request<Empty<Bytes>> {
        Request::builder().method(method).uri(uri).body(Empty::new()).unwrap()
    }

    async fn body_text(response: Response<ResponseBody>) -> String {
        String::from_utf8(response.into_body().collect().await.unwrap().to_bytes().to_vec()).unwrap()
    }

    fn views_dir(templates: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for template in templates {
            std::fs::write(dir.path().join(template), "<html/>").unwrap();
        }
        dir
    }

    fn config(views: &tempfile::TempDir) -> DispatcherConfig {
        DispatcherConfig { views_root: views.path().to_path_buf(), ..DispatcherConfig::default() }
    }

    #[test]
    fn build_requires_engine() {
        assert!(matches!(Dispatcher::builder().build(), Err(DispatcherBuildError::MissingTemplateEngine)));
    }

    #[tokio::test]
    async fn renders_view_through_engine() {
        async fn detail(id: i32) -> View {
            View::page_with("productDetail", serde_json::json!({ "id": id }))
        }

        let views = views_dir(&["productDetail.jsp"]);
        let mut engine = MockTemplateEngine::new();
        engine
            .expect_render()
            .withf(|path, bindings| path == "/productDetail.jsp" && bindings["model"]["id"] == 42)
            .times(1)
            .returning(|_, _| Ok("<p>42</p>".to_owned()));

        let dispatcher = Dispatcher::builder()
            .config(config(&views))
            .template_engine(engine)
            .route(
                HandlerDescriptor::get("products/{id}", handler_fn(detail))
                    .param(ParameterSpec::scalar("id", ScalarType::INT)),
            )
            .build()
            .unwrap();

        let response = dispatcher.dispatch(request(Method::GET, "/products/42")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SET_COOKIE));
        assert_eq!(body_text(response).await, "<p>42</p>");
    }

    #[tokio::test]
    async fn render_failure_is_server_error() {
        let views = views_dir(&["broken.jsp"]);
        let mut engine = MockTemplateEngine::new();
        engine
            .expect_render()
            .withf(|path, _| path == "/broken.jsp")
            .returning(|path, _| Err(crate::view::RenderError::failed(path, "syntax error")));

        let dispatcher = Dispatcher::builder()
            .config(config(&views))
            .template_engine(engine)
            .route(HandlerDescriptor::get("broken", handler_fn(|| async { "broken" })))
            .build()
            .unwrap();

        let response = dispatcher.dispatch(request(Method::GET, "/broken")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn home_page_and_reload() {
        let dispatcher = Dispatcher::builder().template_engine(MockTemplateEngine::new()).build().unwrap();

        let response = dispatcher.dispatch(request(Method::GET, "/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("No route registered."));

        assert_eq!(dispatcher.dispatch(request(Method::GET, "/ping")).await.status(), StatusCode::NOT_FOUND);

        dispatcher.reload_routes([HandlerDescriptor::get("ping", handler_fn(|| async { serde_json::json!("pong") }))]);
        let response = dispatcher.dispatch(request(Method::GET, "/ping")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "pong");
    }

    #[tokio::test]
    async fn disabled_home_page_is_not_found() {
        let config = DispatcherConfig { home_page: false, ..DispatcherConfig::default() };
        let dispatcher = Dispatcher::builder().config(config).template_engine(MockTemplateEngine::new()).build().unwrap();

        assert_eq!(dispatcher.dispatch(request(Method::GET, "/")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let config = DispatcherConfig { max_body_size: 8, ..DispatcherConfig::default() };
        let dispatcher = Dispatcher::builder()
            .config(config)
            .template_engine(MockTemplateEngine::new())
            .route(HandlerDescriptor::post("submit", handler_fn(|| async {})))
            .build()
            .unwrap();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from_static(b"name=a-very-long-value")))
            .unwrap();

        assert_eq!(dispatcher.dispatch(request).await.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}

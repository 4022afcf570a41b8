//! Maps a request path and method to a registered handler.
//!
//! Routes are split into two partitions when the router is built:
//! static patterns live in a hash map keyed by the normalized pattern, dynamic
//! patterns (with at least one `{name}` segment) are scanned in registration
//! order and the first pattern matching every segment wins.

mod pattern;

pub use pattern::is_dynamic_pattern;

use crate::handler::HandlerDescriptor;
use crate::request::PathVariables;
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no handler found for '{path}'")]
    NotFound { path: String },

    #[error("method {method} is not allowed, expected {expected}")]
    MethodNotAllowed { method: Method, expected: String },
}

impl RouteError {
    pub fn not_found<S: ToString>(path: S) -> Self {
        Self::NotFound { path: path.to_string() }
    }

    pub fn method_not_allowed<S: ToString>(method: Method, expected: S) -> Self {
        Self::MethodNotAllowed { method, expected: expected.to_string() }
    }
}

/// The immutable route table.
#[derive(Debug, Default)]
pub struct Router {
    static_routes: HashMap<String, Arc<HandlerDescriptor>>,
    dynamic_routes: Vec<Arc<HandlerDescriptor>>,
}

/// A matched handler and the path variables extracted from the request path.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    descriptor: Arc<HandlerDescriptor>,
    path_vars: PathVariables,
}

impl RouteMatch {
    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    pub fn path_vars(&self) -> &PathVariables {
        &self.path_vars
    }

    pub fn into_parts(self) -> (Arc<HandlerDescriptor>, PathVariables) {
        (self.descriptor, self.path_vars)
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Matches `path` and `method` against the registered routes.
    ///
    /// The root path never matches. Static routes are tried before dynamic ones,
    /// and the method is checked only after a pattern matched, so a path known
    /// under another method yields [`RouteError::MethodNotAllowed`].
    pub fn at(&self, path: &str, method: &Method) -> Result<RouteMatch, RouteError> {
        let normalized = pattern::normalize(path);
        if normalized.is_empty() {
            return Err(RouteError::not_found(path));
        }

        let (descriptor, path_vars) = match self.static_routes.get(normalized) {
            Some(descriptor) => (descriptor.clone(), PathVariables::new()),
            None => self
                .dynamic_routes
                .iter()
                .find_map(|descriptor| {
                    pattern::match_pattern(descriptor.url_pattern(), normalized).map(|vars| (descriptor.clone(), vars))
                })
                .ok_or_else(|| RouteError::not_found(path))?,
        };

        if !descriptor.method().matches(method) {
            return Err(RouteError::method_not_allowed(method.clone(), descriptor.method()));
        }

        trace!(path, pattern = descriptor.url_pattern(), "matched route");
        Ok(RouteMatch { descriptor, path_vars })
    }

    /// Every registered route: static routes first, then dynamic ones in
    /// registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<HandlerDescriptor>> {
        self.static_routes.values().chain(self.dynamic_routes.iter())
    }

    pub fn len(&self) -> usize {
        self.static_routes.len() + self.dynamic_routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct RouterBuilder {
    routes: Vec<HandlerDescriptor>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, descriptor: HandlerDescriptor) -> Self {
        self.routes.push(descriptor);
        self
    }

    pub fn routes(mut self, descriptors: impl IntoIterator<Item = HandlerDescriptor>) -> Self {
        self.routes.extend(descriptors);
        self
    }

    /// Builds the route table. A static pattern registered twice is logged and the
    /// later registration replaces the earlier one.
    pub fn build(self) -> Router {
        let mut router = Router::default();

        for descriptor in self.routes {
            let descriptor = Arc::new(descriptor);
            if descriptor.is_dynamic() {
                router.dynamic_routes.push(descriptor);
                continue;
            }

            let key = pattern::normalize(descriptor.url_pattern()).to_owned();
            if let Some(previous) = router.static_routes.insert(key, descriptor.clone()) {
                warn!(
                    pattern = descriptor.url_pattern(),
                    previous_method = %previous.method(),
                    method = %descriptor.method(),
                    "conflicting route registration, the later one wins"
                );
            }
        }

        router
    }
}

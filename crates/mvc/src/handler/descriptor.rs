use super::Handler;
use super::param::ParameterSpec;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// The HTTP method a handler accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    /// Accepts every method.
    Any,
    Exact(Method),
}

impl MethodMatcher {
    /// Methods compare case-insensitively.
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            MethodMatcher::Any => true,
            MethodMatcher::Exact(expected) => expected.as_str().eq_ignore_ascii_case(method.as_str()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MethodMatcher::Any => "ANY",
            MethodMatcher::Exact(method) => method.as_str(),
        }
    }
}

impl From<Method> for MethodMatcher {
    fn from(method: Method) -> Self {
        MethodMatcher::Exact(method)
    }
}

impl fmt::Display for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata shown on the route listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerMetadata {
    pub author: String,
    pub version: u32,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        Self { author: "unknown".to_owned(), version: 1 }
    }
}

/// How raw handler data is written to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// `text/plain`, strings as is and other values in their JSON form
    #[default]
    Text,
    /// `application/json`
    Json,
}

/// A registered handler: its route, its declared parameters and the handler itself.
#[derive(Clone)]
pub struct HandlerDescriptor {
    url_pattern: String,
    method: MethodMatcher,
    handler: Arc<dyn Handler>,
    params: Vec<ParameterSpec>,
    metadata: HandlerMetadata,
    format: ResponseFormat,
}

macro_rules! method_descriptor {
    ($fn_name:ident, $method:expr) => {
        pub fn $fn_name<H: Handler + 'static>(url_pattern: impl Into<String>, handler: H) -> Self {
            Self::new($method, url_pattern, handler)
        }
    };
}

impl HandlerDescriptor {
    pub fn new<H: Handler + 'static>(method: impl Into<MethodMatcher>, url_pattern: impl Into<String>, handler: H) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            method: method.into(),
            handler: Arc::new(handler),
            params: Vec::new(),
            metadata: HandlerMetadata::default(),
            format: ResponseFormat::default(),
        }
    }

    method_descriptor!(get, Method::GET);
    method_descriptor!(post, Method::POST);
    method_descriptor!(put, Method::PUT);
    method_descriptor!(delete, Method::DELETE);
    method_descriptor!(patch, Method::PATCH);
    method_descriptor!(any, MethodMatcher::Any);

    /// Appends a declared parameter. Order must follow the handler's arguments.
    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn params(mut self, specs: impl IntoIterator<Item = ParameterSpec>) -> Self {
        self.params.extend(specs);
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.metadata.author = author.into();
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.metadata.version = version;
        self
    }

    /// Writes raw results as JSON.
    pub fn json(mut self) -> Self {
        self.format = ResponseFormat::Json;
        self
    }

    pub fn url_pattern(&self) -> &str {
        &self.url_pattern
    }

    pub fn method(&self) -> &MethodMatcher {
        &self.method
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.params
    }

    pub fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }

    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// A pattern is dynamic if any segment is a `{name}` placeholder.
    pub fn is_dynamic(&self) -> bool {
        crate::router::is_dynamic_pattern(&self.url_pattern)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("url_pattern", &self.url_pattern)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("metadata", &self.metadata)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

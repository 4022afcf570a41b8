//! Per-request ambient values handed to handlers.
//!
//! - [`RequestContext`]: the request line, headers and the current session
//! - [`ResponseHandle`]: status and headers a handler wants on its response
//! - [`PathVariables`]: values captured from `{name}` segments of the route pattern

use crate::body::ResponseBody;
use crate::session::SessionHandle;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Response, StatusCode, Uri, Version};
use parking_lot::Mutex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view of the request being dispatched. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    session: SessionHandle,
}

impl RequestContext {
    pub fn new(parts: &http::request::Parts, session: SessionHandle) -> Self {
        let inner = Inner {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
            session,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.uri.query()
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// The session of this request. It exists for every dispatched request.
    pub fn session(&self) -> &SessionHandle {
        &self.inner.session
    }
}

/// Lets a handler adjust the status and headers of its response.
///
/// Values set here are merged into the response after the handler's result has
/// been turned into one.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    inner: Arc<Mutex<ResponseParts>>,
}

#[derive(Debug, Default)]
struct ResponseParts {
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl ResponseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: StatusCode) {
        self.inner.lock().status = Some(status);
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.inner.lock().status
    }

    /// Sets a header, replacing earlier values of the same name.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.lock().headers.insert(name, value);
    }

    /// Adds a header value, keeping earlier values of the same name.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.lock().headers.append(name, value);
    }

    pub fn headers(&self) -> HeaderMap {
        self.inner.lock().headers.clone()
    }

    /// Applies the recorded status and headers. Recorded headers replace headers of
    /// the same name already present on the response.
    pub(crate) fn apply_to(&self, response: &mut Response<ResponseBody>) {
        let parts = self.inner.lock();
        if let Some(status) = parts.status {
            *response.status_mut() = status;
        }

        let headers = response.headers_mut();
        for name in parts.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &parts.headers {
            headers.append(name.clone(), value.clone());
        }
    }
}

/// Path variables in the left-to-right order of the route pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVariables {
    vars: Vec<(String, String)>,
}

impl PathVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.vars.iter().cloned().collect()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for PathVariables {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut vars = PathVariables::new();
        for (name, value) in iter {
            vars.push(name, value);
        }
        vars
    }
}

impl Serialize for PathVariables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.vars.len()))?;
        for (name, value) in &self.vars {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

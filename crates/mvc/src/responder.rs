//! Conversion of dispatch results into HTTP responses.
//!
//! The [`Responder`] trait is the last step of the dispatch pipeline: view
//! outcomes, raw data and errors all end up as a `Response<ResponseBody>`.

use crate::body::ResponseBody;
use crate::error::DispatchError;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Response, StatusCode};
use tracing::error;

pub trait Responder {
    fn into_response(self) -> Response<ResponseBody>;
}

impl<T: Responder, E: Responder> Responder for Result<T, E> {
    fn into_response(self) -> Response<ResponseBody> {
        match self {
            Ok(t) => t.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

/// Overrides the status of the wrapped responder.
impl<T: Responder> Responder for (StatusCode, T) {
    fn into_response(self) -> Response<ResponseBody> {
        let (status, responder) = self;
        let mut response = responder.into_response();
        *response.status_mut() = status;
        response
    }
}

/// An empty `200 OK`.
impl Responder for () {
    fn into_response(self) -> Response<ResponseBody> {
        Response::new(ResponseBody::empty())
    }
}

impl Responder for &'static str {
    fn into_response(self) -> Response<ResponseBody> {
        with_content_type(ResponseBody::from(self), mime::TEXT_PLAIN_UTF_8)
    }
}

impl Responder for String {
    fn into_response(self) -> Response<ResponseBody> {
        with_content_type(ResponseBody::from(self), mime::TEXT_PLAIN_UTF_8)
    }
}

/// A rendered HTML page.
#[derive(Debug, Clone)]
pub struct Html(pub String);

impl Responder for Html {
    fn into_response(self) -> Response<ResponseBody> {
        with_content_type(ResponseBody::from(self.0), mime::TEXT_HTML_UTF_8)
    }
}

/// A JSON document.
#[derive(Debug, Clone)]
pub struct Json(pub serde_json::Value);

impl Responder for Json {
    fn into_response(self) -> Response<ResponseBody> {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => with_content_type(ResponseBody::from(bytes::Bytes::from(bytes)), mime::APPLICATION_JSON),
            Err(e) => {
                error!(cause = %e, "failed to serialize json response");
                (StatusCode::INTERNAL_SERVER_ERROR, ()).into_response()
            }
        }
    }
}

/// A `302 Found` pointing at the target url.
#[derive(Debug, Clone)]
pub struct Redirect(pub String);

impl Responder for Redirect {
    fn into_response(self) -> Response<ResponseBody> {
        let location = match HeaderValue::try_from(self.0.as_str()) {
            Ok(location) => location,
            Err(e) => {
                error!(cause = %e, url = %self.0, "invalid redirect target");
                return (StatusCode::INTERNAL_SERVER_ERROR, ()).into_response();
            }
        };

        let mut response = Response::new(ResponseBody::empty());
        *response.status_mut() = StatusCode::FOUND;
        response.headers_mut().insert(LOCATION, location);
        response
    }
}

/// The error status with the error message as plain text body.
impl Responder for DispatchError {
    fn into_response(self) -> Response<ResponseBody> {
        (self.status(), self.to_string()).into_response()
    }
}

fn with_content_type(body: ResponseBody, mime: mime::Mime) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

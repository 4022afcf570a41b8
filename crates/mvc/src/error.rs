//! Errors surfaced at the dispatch boundary and their HTTP status codes.

use crate::binder::BindError;
use crate::handler::HandlerError;
use crate::router::RouteError;
use crate::view::{RenderError, ViewNotFound};
use http::StatusCode;
use http_body_util::LengthLimitError;
use std::error::Error as StdError;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Reading the request body failed.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error("request body exceeds the size limit")]
    TooLarge,

    #[error("failed to read request body: {reason}")]
    Read { reason: String },

    #[error("invalid request body: {reason}")]
    Invalid { reason: String },
}

impl BodyError {
    /// Classifies an error raised by the request body stream.
    pub fn from_source(source: BoxError) -> Self {
        if source.downcast_ref::<LengthLimitError>().is_some() {
            Self::TooLarge
        } else {
            Self::Read { reason: source.to_string() }
        }
    }

    pub fn invalid<S: ToString>(str: S) -> Self {
        Self::Invalid { reason: str.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Body(#[from] BodyError),

    #[error(transparent)]
    ViewNotFound(#[from] ViewNotFound),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Route(RouteError::NotFound { .. }) => StatusCode::NOT_FOUND,
            DispatchError::Route(RouteError::MethodNotAllowed { .. }) => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::Bind(BindError::Configuration { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Bind(_) => StatusCode::BAD_REQUEST,
            DispatchError::Body(BodyError::TooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::Body(_) => StatusCode::BAD_REQUEST,
            DispatchError::ViewNotFound(_) | DispatchError::Handler(_) | DispatchError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client errors are caused by the request, everything else is a server fault.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

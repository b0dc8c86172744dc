//! The message a filter chain runs against.

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response};

use crate::filter::context::RequestContext;

/// Opaque handle to the application behind the gateway, handed to native filters.
pub type AppHandle = Arc<dyn Any + Send + Sync>;

/// Request or response being filtered.
///
/// The direction decides which body is replaced: a request's body is what the
/// storage backend reads on write, a response's body is what the client reads.
pub enum FilterTarget<'a> {
    Request(&'a mut Request<Body>),
    Response(&'a mut Response<Body>),
}

impl FilterTarget<'_> {
    pub fn is_request(&self) -> bool {
        matches!(self, FilterTarget::Request(_))
    }

    pub fn headers(&self) -> &HeaderMap {
        match self {
            FilterTarget::Request(req) => req.headers(),
            FilterTarget::Response(resp) => resp.headers(),
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            FilterTarget::Request(req) => req.headers_mut(),
            FilterTarget::Response(resp) => resp.headers_mut(),
        }
    }

    /// Move the current body out, leaving an empty one behind.
    pub(crate) fn take_body(&mut self) -> Body {
        match self {
            FilterTarget::Request(req) => std::mem::take(req.body_mut()),
            FilterTarget::Response(resp) => std::mem::take(resp.body_mut()),
        }
    }

    pub(crate) fn replace_body(&mut self, body: Body) {
        match self {
            FilterTarget::Request(req) => *req.body_mut() = body,
            FilterTarget::Response(resp) => *resp.body_mut() = body,
        }
    }
}

/// Per-request data handed to native filters.
#[derive(Clone)]
pub struct RequestMetadata {
    pub context: RequestContext,
    pub app: AppHandle,
}

impl RequestMetadata {
    pub fn new(context: RequestContext, app: AppHandle) -> Self {
        Self { context, app }
    }
}

impl std::fmt::Debug for RequestMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestMetadata")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

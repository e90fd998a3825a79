//! Request handlers.
//!
//! A handler turns a request into a response. Anything implementing
//! [`Handler`] can be bound to a route: closures wrapped with [`handler_fn`],
//! or the built-in file, directory, text and redirect handlers.

use std::fmt;
use std::sync::Arc;

use crate::http::{HttpRequest, HttpResponse};

pub mod file;
pub mod text;

pub use file::{DirectoryHandler, FileHandler};
pub use text::{RedirectHandler, TextHandler};

/// What a handler returns. An `Err` becomes a 500 response.
pub type HandlerResult = anyhow::Result<HttpResponse>;

/// A unit of request handling.
///
/// Handlers are shared between connection threads, so they must be
/// `Send + Sync`. Any state they need (a root directory, a counter) is owned
/// by the handler value itself.
pub trait Handler: Send + Sync {
    fn call(&self, request: &HttpRequest) -> HandlerResult;

    /// Short description used by route dumps
    fn describe(&self) -> String {
        "handler".to_string()
    }
}

impl<F> Handler for F
where
    F: Fn(&HttpRequest) -> HandlerResult + Send + Sync,
{
    fn call(&self, request: &HttpRequest) -> HandlerResult {
        self(request)
    }

    fn describe(&self) -> String {
        "fn".to_string()
    }
}

/// Handler as stored in the route table
pub type BoxedHandler = Arc<dyn Handler>;

/// Wrap a closure as a handler.
///
/// Going through this function pins down the closure signature, so
/// `handler_fn(|_| Ok(HttpResponse::text(200, "hi")))` type-checks without
/// annotations.
pub fn handler_fn<F>(f: F) -> F
where
    F: Fn(&HttpRequest) -> HandlerResult + Send + Sync + 'static,
{
    f
}

/// Debug helper so route types can derive `Debug`
pub(crate) struct HandlerDebug<'a>(pub &'a dyn Handler);

impl fmt::Debug for HandlerDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn test_closure_handler() {
        let handler = handler_fn(|request| Ok(HttpResponse::text(200, request.path())));
        let response = handler.call(&HttpRequest::get("/hello?x=1")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"/hello");
        assert_eq!(handler.describe(), "fn");
    }

    #[test]
    fn test_failing_closure_handler() {
        let handler = handler_fn(|_| bail!("database unavailable"));
        let error = handler.call(&HttpRequest::get("/")).unwrap_err();
        assert_eq!(error.to_string(), "database unavailable");
    }

    #[test]
    fn test_boxed_handler() {
        let handler: BoxedHandler = Arc::new(TextHandler::new(201, "made"));
        let response = handler.call(&HttpRequest::get("/")).unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(format!("{:?}", HandlerDebug(handler.as_ref())), "<text 201>");
    }
}

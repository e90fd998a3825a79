//! Request dispatch.
//!
//! The dispatcher owns the live route table and the delegate. Routes are
//! published as an immutable `Arc<RouteTable>` snapshot: every request works
//! on the snapshot it picked up, and registrations build a new table and
//! swap it in. Requests being served while a site reloads therefore see
//! either the old or the new table, never a mix.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

use crate::delegate::Delegate;
use crate::error::{DispatchError, RouteError, ServerError};
use crate::handlers::Handler;
use crate::http::{status_forbids_body, HttpRequest, HttpResponse};
use crate::routing::RouteTable;

#[derive(Default)]
pub struct Dispatcher {
    routes: RwLock<Arc<RouteTable>>,
    delegate: RwLock<Option<Arc<dyn Delegate>>>,
    launched: AtomicBool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dispatcher around an already populated table
    pub fn with_routes(routes: RouteTable) -> Self {
        Dispatcher {
            routes: RwLock::new(Arc::new(routes)),
            ..Self::default()
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn Delegate>) {
        log::debug!("Delegate set to '{}'", delegate.name());
        *self.delegate.write().unwrap_or_else(PoisonError::into_inner) = Some(delegate);
    }

    pub fn delegate(&self) -> Option<Arc<dyn Delegate>> {
        self.delegate
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current route table
    pub fn routes(&self) -> Arc<RouteTable> {
        Arc::clone(&self.routes.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Apply `update` to a private copy of the table and publish it if the
    /// update succeeds. Concurrent updates are serialized by the write lock.
    fn update_routes<T, E>(
        &self,
        update: impl FnOnce(&mut RouteTable) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut current = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = RouteTable::clone(&current);
        let result = update(&mut next)?;
        *current = Arc::new(next);
        Ok(result)
    }

    pub fn add_handler<H: Handler + 'static>(
        &self,
        method: &str,
        pattern: &str,
        handler: H,
    ) -> Result<(), RouteError> {
        self.update_routes(|routes| routes.add_handler(method, pattern, handler))
    }

    pub fn set_default_handler<H: Handler + 'static>(&self, handler: H) {
        let mut current = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = RouteTable::clone(&current);
        next.set_default(handler);
        *current = Arc::new(next);
    }

    /// Run the delegate's launch hook, once. Later calls are no-ops.
    pub fn launch(&self) -> Result<(), ServerError> {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(delegate) = self.delegate() else {
            log::debug!("No delegate set, serving {} pre-registered routes", self.routes().len());
            return Ok(());
        };

        log::info!("Launching delegate '{}'", delegate.name());
        self.update_routes(|routes| delegate.on_launch(routes))
            .map_err(ServerError::Launch)?;
        log::info!("{} routes registered", self.routes().len());
        Ok(())
    }

    pub fn is_launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }

    /// Have the delegate load a site file on top of the current routes.
    /// On failure the current routes stay in place.
    pub fn configure_site(&self, site: &Path) -> anyhow::Result<()> {
        let delegate = self
            .delegate()
            .ok_or_else(|| anyhow::anyhow!("no delegate set to load {}", site.display()))?;

        log::info!("Loading site {} with delegate '{}'", site.display(), delegate.name());
        self.update_routes(|routes| delegate.configure_site(site, routes))
    }

    /// Answer a request. Never fails: missing routes become 404 and failing
    /// handlers become 500.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let mut response = match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    DispatchError::HandlerFailure { .. } => log::error!("{}", e),
                    _ => log::debug!("{}", e),
                }
                synthesize(&e)
            }
        };

        if status_forbids_body(response.status) {
            // a 304 may still describe the length of the cached representation
            if response.status != 304 {
                response.headers.remove("Content-Length");
            }
            response.body = Bytes::new();
        } else if !response.headers.contains("Content-Length") {
            response
                .headers
                .insert("Content-Length", response.body.len().to_string());
        }
        response
    }

    fn dispatch(&self, request: &HttpRequest) -> Result<HttpResponse, DispatchError> {
        let routes = self.routes();
        let path = request.decoded_path();

        let handler = match routes.match_route(&request.method, &path) {
            Some(route) => route.handler(),
            None => {
                let no_match = DispatchError::NoMatch {
                    method: request.method.to_string(),
                    path: path.to_string(),
                };
                log::debug!("{}, trying default handler", no_match);
                routes
                    .default_handler()
                    .ok_or_else(|| DispatchError::NoDefaultHandler {
                        method: request.method.to_string(),
                        path: path.to_string(),
                    })?
            }
        };

        invoke(handler.as_ref(), request)
    }

    /// Describe the routes and the delegate
    pub fn dump(&self) -> String {
        let mut out = self.routes().dump();
        match self.delegate() {
            Some(delegate) => {
                out.push_str(&format!("delegate: {}\n", delegate.name()));
                delegate.dump(&mut out);
            }
            None => out.push_str("delegate: none\n"),
        }
        out
    }
}

/// Call a handler, turning both `Err` results and panics into
/// `HandlerFailure`.
fn invoke(handler: &dyn Handler, request: &HttpRequest) -> Result<HttpResponse, DispatchError> {
    let failure = |message: String| DispatchError::HandlerFailure {
        method: request.method.to_string(),
        path: request.path().to_string(),
        message,
    };

    match panic::catch_unwind(AssertUnwindSafe(|| handler.call(request))) {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(failure(format!("{:#}", e))),
        Err(payload) => Err(failure(format!("panicked: {}", panic_message(&*payload)))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

fn synthesize(error: &DispatchError) -> HttpResponse {
    match error.status() {
        404 => HttpResponse::not_found(),
        _ => HttpResponse::internal_error(),
    }
}

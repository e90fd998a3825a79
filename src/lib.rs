// Library root - exposes public API for the binary and integration tests

pub mod args;
pub mod config;
pub mod delegate;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod http;
pub mod routing;
pub mod server;
pub mod site;

pub use config::{DelegateKind, ServerConfig};
pub use delegate::{Delegate, StaticDelegate};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, RouteError, ServerError, SiteError};
pub use handlers::{handler_fn, BoxedHandler, Handler, HandlerResult};
pub use http::{parse_request, HttpHeaders, HttpMethod, HttpRequest, HttpResponse};
pub use routing::{PathPattern, Route, RouteTable};
pub use server::{Server, ServerHandle};
pub use site::SiteDelegate;

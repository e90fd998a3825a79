use std::fmt;
use std::sync::Arc;

use itertools::Itertools;

use crate::error::RouteError;
use crate::handlers::{BoxedHandler, Handler, HandlerDebug};
use crate::http::HttpMethod;
use crate::routing::pattern::PathPattern;

/// A binding from (method, path pattern) to a handler
#[derive(Clone)]
pub struct Route {
    method: HttpMethod,
    pattern: PathPattern,
    handler: BoxedHandler,
}

impl Route {
    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("handler", &HandlerDebug(self.handler.as_ref()))
            .finish()
    }
}

/// Registered routes plus the default handler.
///
/// Routes keep their registration order; registering an existing
/// (method, pattern) pair replaces the handler in place. The table itself
/// has no locking: the dispatcher publishes it behind an `Arc` and never
/// mutates a published copy.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    default_handler: Option<BoxedHandler>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `method` + `pattern`, replacing an earlier binding
    /// of the same pair.
    pub fn register<H: Handler + 'static>(
        &mut self,
        method: HttpMethod,
        pattern: &str,
        handler: H,
    ) -> Result<(), RouteError> {
        self.register_shared(method, pattern, Arc::new(handler))
    }

    /// Like [`register`](Self::register) for an already shared handler
    pub fn register_shared(
        &mut self,
        method: HttpMethod,
        pattern: &str,
        handler: BoxedHandler,
    ) -> Result<(), RouteError> {
        let pattern = PathPattern::parse(pattern)?;

        match self
            .routes
            .iter_mut()
            .find(|route| route.method == method && route.pattern == pattern)
        {
            Some(existing) => {
                log::debug!("Replacing handler for {} {}", method, pattern);
                existing.handler = handler;
            }
            None => {
                log::debug!("Adding handler for {} {}", method, pattern);
                self.routes.push(Route {
                    method,
                    pattern,
                    handler,
                });
            }
        }
        Ok(())
    }

    /// Registration entry point for delegates, taking the method as text
    pub fn add_handler<H: Handler + 'static>(
        &mut self,
        method: &str,
        pattern: &str,
        handler: H,
    ) -> Result<(), RouteError> {
        let method = method
            .parse::<HttpMethod>()
            .map_err(|_| RouteError::InvalidMethod(method.to_string()))?;
        self.register(method, pattern, handler)
    }

    /// Replace the handler used when no route matches
    pub fn set_default<H: Handler + 'static>(&mut self, handler: H) {
        self.set_default_shared(Arc::new(handler));
    }

    pub fn set_default_shared(&mut self, handler: BoxedHandler) {
        self.default_handler = Some(handler);
    }

    pub fn default_handler(&self) -> Option<&BoxedHandler> {
        self.default_handler.as_ref()
    }

    /// Find the most specific route for a request.
    ///
    /// Only routes with the same method are considered. The longest literal
    /// pattern wins; an exact pattern beats a prefix of equal length.
    pub fn match_route(&self, method: &HttpMethod, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|route| route.method == *method && route.pattern.matches(path))
            .max_by_key(|route| route.pattern.specificity())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Human readable listing of the table
    pub fn dump(&self) -> String {
        let width = self
            .routes
            .iter()
            .map(|route| route.method.as_str().len())
            .max()
            .unwrap_or(0);

        let mut out = format!("routes ({}):\n", self.routes.len());
        let listing = self
            .routes
            .iter()
            .map(|route| {
                format!(
                    "  {:<width$}  {}  -> {}",
                    route.method,
                    route.pattern,
                    route.handler.describe(),
                    width = width
                )
            })
            .join("\n");
        if !listing.is_empty() {
            out.push_str(&listing);
            out.push('\n');
        }
        out.push_str(match &self.default_handler {
            Some(_) => "default handler: set\n",
            None => "default handler: none\n",
        });
        out
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .field(
                "default_handler",
                &self.default_handler.as_ref().map(|h| HandlerDebug(h.as_ref())),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{handler_fn, TextHandler};
    use crate::http::{HttpRequest, HttpResponse};
    use pretty_assertions::assert_eq;

    fn body_of(table: &RouteTable, method: &str, path: &str) -> Option<String> {
        let method: HttpMethod = method.parse().unwrap();
        table.match_route(&method, path).map(|route| {
            let response = route.handler().call(&HttpRequest::get(path)).unwrap();
            String::from_utf8(response.body.to_vec()).unwrap()
        })
    }

    #[test]
    fn test_exact_match() {
        let mut table = RouteTable::new();
        table.register(HttpMethod::Get, "/", TextHandler::new(200, "root")).unwrap();
        table.register(HttpMethod::Get, "/about", TextHandler::new(200, "about")).unwrap();

        assert_eq!(body_of(&table, "GET", "/"), Some("root".to_string()));
        assert_eq!(body_of(&table, "GET", "/about"), Some("about".to_string()));
        assert_eq!(body_of(&table, "GET", "/contact"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = RouteTable::new();
        table.register(HttpMethod::Get, "/*", TextHandler::new(200, "any")).unwrap();
        table.register(HttpMethod::Get, "/api/v1/*", TextHandler::new(200, "v1")).unwrap();
        table.register(HttpMethod::Get, "/api/*", TextHandler::new(200, "api")).unwrap();

        assert_eq!(body_of(&table, "GET", "/api/v1/users"), Some("v1".to_string()));
        assert_eq!(body_of(&table, "GET", "/api/v2/users"), Some("api".to_string()));
        assert_eq!(body_of(&table, "GET", "/index.html"), Some("any".to_string()));
    }

    #[test]
    fn test_exact_beats_prefix() {
        let mut table = RouteTable::new();
        table.register(HttpMethod::Get, "/files/*", TextHandler::new(200, "prefix")).unwrap();
        table.register(HttpMethod::Get, "/files/", TextHandler::new(200, "listing")).unwrap();

        assert_eq!(body_of(&table, "GET", "/files/"), Some("listing".to_string()));
        assert_eq!(body_of(&table, "GET", "/files/a.txt"), Some("prefix".to_string()));
    }

    #[test]
    fn test_reregistration_replaces_handler() {
        let mut table = RouteTable::new();
        table.register(HttpMethod::Get, "/x", TextHandler::new(200, "first")).unwrap();
        table.register(HttpMethod::Get, "/y", TextHandler::new(200, "other")).unwrap();
        table.add_handler("get", "/x", TextHandler::new(200, "second")).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(body_of(&table, "GET", "/x"), Some("second".to_string()));
        // the replaced route keeps its slot
        assert_eq!(table.routes()[0].pattern().to_string(), "/x");
    }

    #[test]
    fn test_method_is_part_of_the_key() {
        let mut table = RouteTable::new();
        table.register(HttpMethod::Post, "/submit", TextHandler::new(201, "posted")).unwrap();

        assert_eq!(body_of(&table, "GET", "/submit"), None);
        assert_eq!(body_of(&table, "post", "/submit"), Some("posted".to_string()));
    }

    #[test]
    fn test_method_case_insensitive_path_case_sensitive() {
        let mut table = RouteTable::new();
        table.add_handler("GET", "/foo", TextHandler::new(200, "foo")).unwrap();

        assert_eq!(body_of(&table, "get", "/foo"), Some("foo".to_string()));
        assert_eq!(body_of(&table, "GET", "/Foo"), None);
    }

    #[test]
    fn test_trailing_slash_is_significant() {
        let mut table = RouteTable::new();
        table.add_handler("GET", "/foo", TextHandler::new(200, "no slash")).unwrap();

        assert_eq!(body_of(&table, "GET", "/foo/"), None);

        table.add_handler("GET", "/foo/", TextHandler::new(200, "slash")).unwrap();
        assert_eq!(body_of(&table, "GET", "/foo/"), Some("slash".to_string()));
        assert_eq!(body_of(&table, "GET", "/foo"), Some("no slash".to_string()));
    }

    #[test]
    fn test_invalid_registration() {
        let mut table = RouteTable::new();
        let result = table.add_handler("GET", "no-slash", TextHandler::new(200, ""));
        assert!(matches!(result, Err(RouteError::InvalidPattern { .. })));

        let result = table.add_handler("", "/", TextHandler::new(200, ""));
        assert_eq!(result, Err(RouteError::InvalidMethod(String::new())));

        assert!(table.is_empty());
    }

    #[test]
    fn test_default_handler_slot() {
        let mut table = RouteTable::new();
        assert!(table.default_handler().is_none());

        table.set_default(TextHandler::new(404, "first"));
        table.set_default(handler_fn(|_| Ok(HttpResponse::text(404, "second"))));

        let response = table
            .default_handler()
            .unwrap()
            .call(&HttpRequest::get("/"))
            .unwrap();
        assert_eq!(&response.body[..], b"second");
    }

    #[test]
    fn test_dump() {
        let mut table = RouteTable::new();
        table.add_handler("GET", "/", TextHandler::new(200, "root")).unwrap();
        table.add_handler("DELETE", "/items/*", TextHandler::new(204, "")).unwrap();

        let expected = "routes (2):\n  GET     /  -> text 200\n  DELETE  /items/*  -> text 204\ndefault handler: none\n";
        assert_eq!(table.dump(), expected);

        table.set_default(TextHandler::new(404, "nope"));
        assert!(table.dump().ends_with("default handler: set\n"));
    }
}

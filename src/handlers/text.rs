use bytes::Bytes;

use crate::handlers::{Handler, HandlerResult};
use crate::http::{HttpHeaders, HttpRequest, HttpResponse};

/// Answer every request with the same status and body
#[derive(Debug, Clone)]
pub struct TextHandler {
    status: u16,
    content_type: String,
    body: Bytes,
}

impl TextHandler {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        TextHandler {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: Bytes::from(body),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

impl Handler for TextHandler {
    fn call(&self, _request: &HttpRequest) -> HandlerResult {
        let mut headers = HttpHeaders::new();
        headers.insert("Content-Type", self.content_type.as_str());
        // Bytes clones share the buffer
        Ok(HttpResponse::new(self.status, headers, self.body.clone()))
    }

    fn describe(&self) -> String {
        format!("text {}", self.status)
    }
}

/// Redirect every request to a fixed location with a 302
#[derive(Debug, Clone)]
pub struct RedirectHandler {
    location: String,
}

impl RedirectHandler {
    pub fn new(location: impl Into<String>) -> Self {
        RedirectHandler {
            location: location.into(),
        }
    }
}

impl Handler for RedirectHandler {
    fn call(&self, _request: &HttpRequest) -> HandlerResult {
        Ok(HttpResponse::redirect(self.location.as_str()))
    }

    fn describe(&self) -> String {
        format!("redirect {}", self.location)
    }
}

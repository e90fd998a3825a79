use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use url::form_urlencoded;

/// HTTP request methods.
///
/// Parsing is case-insensitive: `get`, `Get` and `GET` all become
/// [`HttpMethod::Get`]. Methods outside the common set are kept as upper-cased
/// extension tokens so they can still be routed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Extension(String),
}

impl HttpMethod {
    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Extension(name) => name,
        }
    }
}

/// RFC 9110 `tchar`
pub(crate) fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(is_token_char) {
            return Err(format!("Unknown HTTP method: {}", s));
        }
        let method = match s.to_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "PATCH" => HttpMethod::Patch,
            "OPTIONS" => HttpMethod::Options,
            other => HttpMethod::Extension(other.to_string()),
        };
        Ok(method)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// HTTP headers: an ordered multimap with case-insensitive name lookup.
///
/// Names keep the case they were inserted with; serialization preserves
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    entries: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        HttpHeaders {
            entries: Vec::new(),
        }
    }

    /// Set a header, replacing every existing value with the same name.
    /// The first existing entry keeps its position.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(index) => {
                self.entries[index].1 = value;
                let mut seen = false;
                self.entries.retain(|(name, _)| {
                    if !name.eq_ignore_ascii_case(&key) {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.entries.push((key, value)),
        }
    }

    /// Add a header value without touching existing ones.
    pub fn append<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.entries.push((key.into(), value.into()));
    }

    /// Get the first value of a header (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Get every value of a header, in insertion order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Remove every value of a header, returning whether any was present
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(name, _)| !name.eq_ignore_ascii_case(key));
        before != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(key))
    }
}

/// HTTP request as produced by the parser
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Request target as sent by the client, query string included
    pub uri: String,
    pub http_version: String,
    pub headers: HttpHeaders,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(
        method: HttpMethod,
        uri: impl Into<String>,
        http_version: impl Into<String>,
        headers: HttpHeaders,
        body: impl Into<Bytes>,
    ) -> Self {
        HttpRequest {
            method,
            uri: uri.into(),
            http_version: http_version.into(),
            headers,
            body: body.into(),
        }
    }

    /// Shorthand for a body-less HTTP/1.1 request, mostly useful in tests
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, uri, "HTTP/1.1", HttpHeaders::new(), Bytes::new())
    }

    /// The path component of the request target (everything before `?`)
    pub fn path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.uri,
        }
    }

    /// The path with percent-escapes decoded; invalid UTF-8 is replaced.
    /// Routing and file lookup work on this form.
    pub fn decoded_path(&self) -> Cow<'_, str> {
        percent_decode_str(self.path()).decode_utf8_lossy()
    }

    /// The raw query string, if the target has one
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    /// Decoded query parameters in the order they appear; duplicates are kept
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.query()
            .map(|query| {
                form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Whether the client asked for the connection to stay open after this request
    pub fn keep_alive(&self) -> bool {
        let connection = self.headers.get("Connection").map(str::to_ascii_lowercase);
        match connection.as_deref() {
            Some("close") => false,
            Some("keep-alive") => true,
            _ => self.http_version != "HTTP/1.0",
        }
    }
}

/// Reason phrase for well-known status codes
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// 1xx, 204 and 304 responses never carry content
pub fn status_forbids_body(status: u16) -> bool {
    matches!(status, 100..=199 | 204 | 304)
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub http_version: String,
    pub status: u16,
    pub reason_phrase: String,
    pub headers: HttpHeaders,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HttpHeaders, body: impl Into<Bytes>) -> Self {
        HttpResponse {
            http_version: "HTTP/1.1".to_string(),
            status,
            reason_phrase: reason_phrase(status).to_string(),
            headers,
            body: body.into(),
        }
    }

    pub fn ok(headers: HttpHeaders, body: impl Into<Bytes>) -> Self {
        Self::new(200, headers, body)
    }

    /// A `text/plain` response with the given status
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut headers = HttpHeaders::new();
        headers.insert("Content-Type", "text/plain; charset=utf-8");
        let body: String = body.into();
        Self::new(status, headers, body)
    }

    pub fn not_found() -> Self {
        Self::text(404, "Not Found")
    }

    pub fn forbidden() -> Self {
        Self::text(403, "Forbidden")
    }

    pub fn bad_request() -> Self {
        Self::text(400, "Bad Request")
    }

    pub fn internal_error() -> Self {
        Self::text(500, "Internal Server Error")
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        let mut headers = HttpHeaders::new();
        headers.insert("Location", location);
        Self::new(302, headers, Bytes::new())
    }

    /// Builder-style header setter
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Whether the response asks for the connection to be closed after it
    pub fn closes_connection(&self) -> bool {
        self.headers
            .get_all("Connection")
            .flat_map(|value| value.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("close"))
    }

    /// Format the status line and headers as bytes
    pub fn serialize(&self) -> Vec<u8> {
        let mut result = format!(
            "{} {} {}\r\n",
            self.http_version, self.status, self.reason_phrase
        );

        for (key, value) in self.headers.iter() {
            result.push_str(&format!("{}: {}\r\n", key, value));
        }

        result.push_str("\r\n");
        result.into_bytes()
    }

    /// Combine headers and body into complete response
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut response = self.serialize();
        response.extend_from_slice(&self.body);
        response
    }
}

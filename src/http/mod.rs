pub mod mime;
pub mod parser;
pub mod types;

pub use parser::parse_request;
pub use types::{
    reason_phrase, status_forbids_body, HttpHeaders, HttpMethod, HttpRequest, HttpResponse,
};

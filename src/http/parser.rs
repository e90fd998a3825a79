use std::io::{BufRead, Error, ErrorKind, Read};
use std::str::FromStr;

use bytes::Bytes;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, space0, space1};
use nom::combinator::{all_consuming, rest, verify};
use nom::sequence::{separated_pair, terminated, tuple};
use nom::IResult;

use crate::http::types::{is_token_char, HttpHeaders, HttpMethod, HttpRequest};

/// Upper bound on the number of header lines accepted per request
const MAX_HEADERS: usize = 100;

/// Upper bound on a declared request body
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Upper bound on a request line or header line, line ending included
const MAX_LINE_LENGTH: usize = 8 * 1024;

fn invalid_data(message: String) -> Error {
    Error::new(ErrorKind::InvalidData, message)
}

fn non_space(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_ascii_whitespace())(input)
}

/// `METHOD SP request-target SP HTTP-version`
fn request_line_parts(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let method = take_while1(is_token_char);
    let version = verify(non_space, |v: &str| v.starts_with("HTTP/"));
    let (input, (method, _, target, _, version)) =
        terminated(tuple((method, space1, non_space, space1, version)), space0)(input)?;
    Ok((input, (method, target, version)))
}

/// `field-name ":" OWS field-value OWS`
fn header_line_parts(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_while1(is_token_char), tuple((char(':'), space0)), rest)(input)
}

/// `read_line` that refuses lines longer than `MAX_LINE_LENGTH`
fn read_limited_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<usize, Error> {
    let read = reader
        .by_ref()
        .take(MAX_LINE_LENGTH as u64 + 1)
        .read_line(line)?;
    if line.len() > MAX_LINE_LENGTH {
        return Err(invalid_data(format!(
            "Line exceeds limit of {} bytes",
            MAX_LINE_LENGTH
        )));
    }
    Ok(read)
}

fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Parse a single HTTP request line
fn parse_request_line(line: &str) -> Result<(HttpMethod, String, String), Error> {
    let trimmed = trim_line_ending(line);
    let (_, (method, uri, http_version)) = all_consuming(request_line_parts)(trimmed)
        .map_err(|_| invalid_data(format!("Malformed HTTP request line: '{}'", trimmed)))?;

    let method = HttpMethod::from_str(method).map_err(invalid_data)?;

    Ok((method, uri.to_string(), http_version.to_string()))
}

/// Parse a single `Name: value` header line
fn parse_header_line(line: &str) -> Result<(String, String), Error> {
    let trimmed = trim_line_ending(line);
    let (_, (name, value)) = header_line_parts(trimmed)
        .map_err(|_| invalid_data(format!("Malformed HTTP header: '{}'", trimmed)))?;
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse HTTP headers from a buffered reader
fn parse_headers<R: BufRead>(reader: &mut R) -> Result<HttpHeaders, Error> {
    let mut headers = HttpHeaders::new();
    let mut line = String::new();

    loop {
        line.clear();
        read_limited_line(reader, &mut line)?;

        if line == "\r\n" || line == "\n" || line.is_empty() {
            break;
        }

        if headers.len() >= MAX_HEADERS {
            return Err(invalid_data(format!(
                "Too many header lines (limit {})",
                MAX_HEADERS
            )));
        }

        let (key, value) = parse_header_line(&line)?;
        headers.append(key, value);
    }

    Ok(headers)
}

/// Get the Content-Length from headers, defaults to 0 if not present
fn get_content_length(headers: &HttpHeaders) -> Result<usize, Error> {
    match headers.get("Content-Length") {
        Some(value) => {
            let length = value.parse::<usize>().map_err(|_| {
                invalid_data(format!("Invalid Content-Length value: '{}'", value))
            })?;
            if length > MAX_BODY_SIZE {
                return Err(invalid_data(format!(
                    "Content-Length {} exceeds limit of {} bytes",
                    length, MAX_BODY_SIZE
                )));
            }
            Ok(length)
        }
        None => Ok(0),
    }
}

/// Parse a complete HTTP request from a buffered stream.
///
/// Returns `Ok(None)` when the peer closed the connection before sending a
/// request line, which is how a keep-alive connection normally ends.
pub fn parse_request<R: BufRead>(reader: &mut R) -> Result<Option<HttpRequest>, Error> {
    // Tolerate stray blank lines between pipelined requests
    let mut request_line = String::new();
    loop {
        request_line.clear();
        if read_limited_line(reader, &mut request_line)? == 0 {
            return Ok(None);
        }
        if !trim_line_ending(&request_line).is_empty() {
            break;
        }
    }

    let (method, uri, http_version) = parse_request_line(&request_line)?;

    let headers = parse_headers(reader)?;

    // Read body based on Content-Length
    let content_length = get_content_length(&headers)?;
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body)?;

    Ok(Some(HttpRequest::new(
        method,
        uri,
        http_version,
        headers,
        Bytes::from(body),
    )))
}

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// `EINVAL`, reported by [`ServerError::code`] for addresses that do not resolve
pub const EINVAL: i32 = 22;

/// Rejected route registrations. Reported synchronously to the registrant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },

    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),
}

/// Why a request could not be answered by a registered handler.
///
/// These never reach the client as errors: the dispatcher turns them into
/// 404 and 500 responses.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route matches {method} {path}")]
    NoMatch { method: String, path: String },

    #[error("no route matches {method} {path} and no default handler is set")]
    NoDefaultHandler { method: String, path: String },

    #[error("handler for {method} {path} failed: {message}")]
    HandlerFailure {
        method: String,
        path: String,
        message: String,
    },
}

impl DispatchError {
    /// Status code of the response synthesized for this error
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::NoMatch { .. } | DispatchError::NoDefaultHandler { .. } => 404,
            DispatchError::HandlerFailure { .. } => 500,
        }
    }
}

/// Server lifecycle failures. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}:{port}: {source}")]
    Bind {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("cannot resolve listen address {0:?}")]
    InvalidAddress(String),

    #[error("server is not bound to an address")]
    NotBound,

    #[error("delegate failed to launch: {0:#}")]
    Launch(anyhow::Error),

    #[error("accept loop failed: {0}")]
    Accept(#[source] io::Error),
}

impl ServerError {
    /// errno-like status for callers that want an integer result
    pub fn code(&self) -> i32 {
        match self {
            ServerError::Bind { source, .. } | ServerError::Accept(source) => {
                source.raw_os_error().unwrap_or(EINVAL)
            }
            ServerError::InvalidAddress(_) => EINVAL,
            ServerError::NotBound | ServerError::Launch(_) => -1,
        }
    }
}

/// Problems loading a site description file
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("cannot read site file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{path}:{line}: {source}")]
    Route {
        path: PathBuf,
        line: usize,
        #[source]
        source: RouteError,
    },
}

//! Site description files.
//!
//! A site file lists routes one per line:
//!
//! ```text
//! # comment
//! GET     /             file      index.html
//! GET     /assets/*     dir       public
//! GET     /health       text      ok
//! POST    /legacy       text 410  gone for good
//! GET     /old          redirect  /new
//! default               text 404  nothing here
//! mime    md            text/markdown; charset=utf-8
//! ```
//!
//! Relative file and directory paths are resolved against the directory
//! containing the site file. Loading goes through the public route table
//! API, so a site file can do nothing a hand-written delegate could not.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1, take_while_m_n};
use nom::character::complete::{space0, space1};
use nom::combinator::{all_consuming, eof, map, map_res, opt, peek, rest};
use nom::sequence::{pair, preceded, terminated, tuple};
use nom::IResult;

use crate::delegate::Delegate;
use crate::error::{RouteError, SiteError};
use crate::handlers::{
    BoxedHandler, DirectoryHandler, FileHandler, RedirectHandler, TextHandler,
};
use crate::http::mime::register_mime_type;
use crate::http::HttpMethod;
use crate::routing::{PathPattern, RouteTable};

/// File name looked up by the CLI when no site is given
pub const DEFAULT_SITE_FILE: &str = "site.kurt";

/// What a route does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteAction {
    File(String),
    Dir(String),
    Text { status: u16, body: String },
    Redirect(String),
}

/// One meaningful line of a site file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteDirective {
    Route {
        method: String,
        pattern: String,
        action: SiteAction,
    },
    Default(SiteAction),
    Mime {
        extension: String,
        mime: String,
    },
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

/// A keyword that must be followed by whitespace or the end of the line
fn keyword<'a>(name: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(name), peek(alt((space1, eof))))
}

fn status_code(input: &str) -> IResult<&str, u16> {
    map_res(
        terminated(
            take_while_m_n(3, 3, |c: char| c.is_ascii_digit()),
            peek(alt((space1, eof))),
        ),
        str::parse::<u16>,
    )(input)
}

fn action(input: &str) -> IResult<&str, SiteAction> {
    alt((
        map(preceded(pair(keyword("file"), space1), word), |path| {
            SiteAction::File(path.to_string())
        }),
        map(preceded(pair(keyword("dir"), space1), word), |path| {
            SiteAction::Dir(path.to_string())
        }),
        map(preceded(pair(keyword("redirect"), space1), word), |location| {
            SiteAction::Redirect(location.to_string())
        }),
        map(
            preceded(
                keyword("text"),
                pair(opt(preceded(space1, status_code)), preceded(space0, rest)),
            ),
            |(status, body): (Option<u16>, &str)| SiteAction::Text {
                status: status.unwrap_or(200),
                body: body.to_string(),
            },
        ),
    ))(input)
}

fn directive(input: &str) -> IResult<&str, SiteDirective> {
    alt((
        map(preceded(pair(keyword("default"), space1), action), SiteDirective::Default),
        map(
            pair(
                preceded(pair(keyword("mime"), space1), word),
                preceded(space1, rest),
            ),
            |(extension, mime): (&str, &str)| SiteDirective::Mime {
                extension: extension.to_string(),
                mime: mime.to_string(),
            },
        ),
        map(
            tuple((word, preceded(space1, word), preceded(space1, action))),
            |(method, pattern, action)| SiteDirective::Route {
                method: method.to_string(),
                pattern: pattern.to_string(),
                action,
            },
        ),
    ))(input)
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<SiteDirective>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    all_consuming(directive)(line)
        .map(|(_, directive)| Some(directive))
        .map_err(|_| format!("cannot parse {:?}", line))
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Build the handler for an action. `prefix` is the literal part of the
/// route pattern, used by directory handlers to strip the route from the
/// request path.
fn build_handler(action: &SiteAction, prefix: &str, base: &Path) -> BoxedHandler {
    match action {
        SiteAction::File(path) => Arc::new(FileHandler::new(resolve(base, path))),
        SiteAction::Dir(path) => {
            Arc::new(DirectoryHandler::new(prefix, resolve(base, path)))
        }
        SiteAction::Text { status, body } => {
            Arc::new(TextHandler::new(*status, body.as_str()))
        }
        SiteAction::Redirect(location) => {
            Arc::new(RedirectHandler::new(location.as_str()))
        }
    }
}

/// Apply one directive to `routes`. MIME registrations are collected in
/// `mime_types` and only registered once the whole file has loaded.
fn apply(
    directive: SiteDirective,
    base: &Path,
    routes: &mut RouteTable,
    mime_types: &mut Vec<(String, String)>,
) -> Result<(), RouteError> {
    match directive {
        SiteDirective::Route {
            method,
            pattern,
            action,
        } => {
            let method: HttpMethod = method
                .parse()
                .map_err(|_| RouteError::InvalidMethod(method.clone()))?;
            let prefix = PathPattern::parse(&pattern)?.literal().to_string();
            routes.register_shared(method, &pattern, build_handler(&action, &prefix, base))
        }
        SiteDirective::Default(action) => {
            routes.set_default_shared(build_handler(&action, "/", base));
            Ok(())
        }
        SiteDirective::Mime { extension, mime } => {
            mime_types.push((extension, mime));
            Ok(())
        }
    }
}

/// Load a site file into `routes`. Returns the number of directives applied.
///
/// Stops at the first bad line; `routes` may then hold the directives
/// before it, so callers load into a scratch table. `mime` lines take
/// effect only when every line loaded.
pub fn load_site(path: &Path, routes: &mut RouteTable) -> Result<usize, SiteError> {
    let source = fs::read_to_string(path).map_err(|source| SiteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut applied = 0;
    let mut mime_types = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let directive = parse_line(line).map_err(|message| SiteError::Syntax {
            path: path.to_path_buf(),
            line: line_number,
            message,
        })?;
        let Some(directive) = directive else {
            continue;
        };
        apply(directive, &base, routes, &mut mime_types).map_err(|source| {
            SiteError::Route {
                path: path.to_path_buf(),
                line: line_number,
                source,
            }
        })?;
        applied += 1;
    }

    for (extension, mime) in mime_types {
        register_mime_type(&extension, mime);
    }

    log::info!("Loaded {} directives from {}", applied, path.display());
    Ok(applied)
}

/// Delegate that configures the server from a site file.
#[derive(Debug, Default)]
pub struct SiteDelegate {
    site: Option<PathBuf>,
    loaded: Mutex<Vec<PathBuf>>,
}

impl SiteDelegate {
    /// Load `site` when the server launches
    pub fn new(site: impl Into<PathBuf>) -> Self {
        SiteDelegate {
            site: Some(site.into()),
            loaded: Mutex::new(Vec::new()),
        }
    }

    /// A delegate with no site; routes come from `configure_site` calls
    pub fn without_site() -> Self {
        Self::default()
    }

    fn load(&self, site: &Path, routes: &mut RouteTable) -> anyhow::Result<()> {
        load_site(site, routes)?;
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if !loaded.iter().any(|known| known == site) {
            loaded.push(site.to_path_buf());
        }
        Ok(())
    }
}

impl Delegate for SiteDelegate {
    fn name(&self) -> &str {
        "site"
    }

    fn on_launch(&self, routes: &mut RouteTable) -> anyhow::Result<()> {
        match &self.site {
            Some(site) => self.load(site, routes),
            None => Ok(()),
        }
    }

    fn configure_site(&self, site: &Path, routes: &mut RouteTable) -> anyhow::Result<()> {
        self.load(site, routes)
    }

    fn dump(&self, out: &mut String) {
        let loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        for site in loaded.iter() {
            out.push_str(&format!("site: {}\n", site.display()));
        }
    }
}

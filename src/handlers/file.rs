use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;

use crate::handlers::{Handler, HandlerResult};
use crate::http::mime::mime_type;
use crate::http::{HttpHeaders, HttpRequest, HttpResponse};

/// File served for directory requests
const INDEX_FILE: &str = "index.html";

/// Serve a single file, whatever the request path is
#[derive(Debug, Clone)]
pub struct FileHandler {
    path: PathBuf,
}

impl FileHandler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileHandler { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Handler for FileHandler {
    fn call(&self, _request: &HttpRequest) -> HandlerResult {
        serve_file(&self.path)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Serve files below `root`, using the part of the request path after
/// `prefix` as the relative file name.
///
/// `GET /static/css/site.css` with prefix `/static/` and root `public`
/// serves `public/css/site.css`. Paths that try to climb out of the root
/// are refused with 403.
#[derive(Debug, Clone)]
pub struct DirectoryHandler {
    prefix: String,
    root: PathBuf,
}

impl DirectoryHandler {
    pub fn new(prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        DirectoryHandler {
            prefix: prefix.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a decoded request path to a file below the root, or `None` if
    /// the path escapes the root.
    fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        if request_path.contains('\0') {
            return None;
        }
        let relative = request_path
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(request_path)
            .trim_start_matches('/');

        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return None;
                }
            }
        }
        Some(resolved)
    }
}

impl Handler for DirectoryHandler {
    fn call(&self, request: &HttpRequest) -> HandlerResult {
        let Some(mut file_path) = self.resolve(&request.decoded_path()) else {
            log::warn!("Refusing path outside of {}: {}", self.root.display(), request.path());
            return Ok(HttpResponse::forbidden());
        };

        if file_path.is_dir() {
            file_path.push(INDEX_FILE);
        }

        serve_file(&file_path)
    }

    fn describe(&self) -> String {
        format!("dir {}", self.root.display())
    }
}

/// Read a file and build a 200 response with its MIME type, or 404 if it
/// does not exist. Other I/O failures are handler errors.
fn serve_file(path: &Path) -> HandlerResult {
    let file_bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("File not found: {}", path.display());
            return Ok(HttpResponse::not_found());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    let mut headers = HttpHeaders::new();
    headers.insert("Content-Type", mime_type(file_name));
    headers.insert("Content-Length", file_bytes.len().to_string());
    Ok(HttpResponse::ok(headers, file_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn site_dir() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::create_dir(temp_dir.path().join("css")).unwrap();
        fs::write(temp_dir.path().join("css/site.css"), "body {}").unwrap();
        fs::create_dir(temp_dir.path().join("docs")).unwrap();
        fs::write(temp_dir.path().join("docs/index.html"), "docs").unwrap();
        temp_dir
    }

    #[test]
    fn test_file_handler_serves_file() {
        let temp_dir = site_dir();
        let handler = FileHandler::new(temp_dir.path().join("index.html"));

        let response = handler.call(&HttpRequest::get("/anything")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"<h1>home</h1>");
        assert_eq!(
            response.headers.get("Content-Type"),
            Some("text/html; charset=utf-8")
        );
        assert_eq!(response.headers.get("Content-Length"), Some("13"));
    }

    #[test]
    fn test_file_handler_missing_file() {
        let temp_dir = site_dir();
        let handler = FileHandler::new(temp_dir.path().join("nonexistent_file_xyz.txt"));

        let response = handler.call(&HttpRequest::get("/")).unwrap();
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_directory_handler_serves_nested_file() {
        let temp_dir = site_dir();
        let handler = DirectoryHandler::new("/static/", temp_dir.path());

        let response = handler.call(&HttpRequest::get("/static/css/site.css")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"body {}");
        assert_eq!(response.headers.get("Content-Type"), Some("text/css"));
    }

    #[test]
    fn test_directory_handler_index() {
        let temp_dir = site_dir();
        let handler = DirectoryHandler::new("/", temp_dir.path());

        let root = handler.call(&HttpRequest::get("/")).unwrap();
        assert_eq!(&root.body[..], b"<h1>home</h1>");

        let docs = handler.call(&HttpRequest::get("/docs/?page=1")).unwrap();
        assert_eq!(&docs.body[..], b"docs");
    }

    #[test]
    fn test_directory_handler_rejects_parent_dir() {
        let temp_dir = site_dir();
        let handler = DirectoryHandler::new("/static/", temp_dir.path().join("css"));

        let response = handler.call(&HttpRequest::get("/static/../index.html")).unwrap();
        assert_eq!(response.status, 403);
    }

    #[test]
    fn test_directory_handler_decodes_path() {
        let temp_dir = site_dir();
        fs::write(temp_dir.path().join("my file.txt"), "spaced").unwrap();
        let handler = DirectoryHandler::new("/", temp_dir.path());

        let response = handler.call(&HttpRequest::get("/my%20file.txt")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"spaced");
    }

    #[test]
    fn test_directory_handler_rejects_encoded_escapes() {
        let temp_dir = site_dir();
        let handler = DirectoryHandler::new("/static/", temp_dir.path().join("css"));

        for path in [
            "/static/%2e%2e/index.html",
            "/static/..%2Findex.html",
            "/static/%2e%2e%2findex.html",
            "/static/site.css%00.png",
        ] {
            let response = handler.call(&HttpRequest::get(path)).unwrap();
            assert_eq!(response.status, 403, "{}", path);
        }
    }

    #[test]
    fn test_directory_handler_missing_file() {
        let temp_dir = site_dir();
        let handler = DirectoryHandler::new("/", temp_dir.path());

        let response = handler.call(&HttpRequest::get("/missing.png")).unwrap();
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_describe() {
        let handler = DirectoryHandler::new("/", "public");
        assert_eq!(handler.describe(), "dir public");
        assert_eq!(FileHandler::new("a.txt").describe(), "file a.txt");
    }
}

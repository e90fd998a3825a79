//! MIME type registry.
//!
//! Maps file extensions to `Content-Type` values for the file-serving
//! handlers. The table is process-wide and may be replaced or extended at
//! runtime. Mutation is expected while the server is being configured and
//! lookups while it serves; the table sits behind an `RwLock`, so a late
//! registration is still race-free, it just may not be seen by a request that
//! already looked its type up.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{OnceLock, PoisonError, RwLock};

/// Content type used for unknown or missing extensions
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const BUILTIN_TYPES: &[(&str, &str)] = &[
    // Text
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css"),
    ("txt", "text/plain; charset=utf-8"),
    ("md", "text/plain; charset=utf-8"),
    ("csv", "text/csv"),
    ("xml", "application/xml"),
    // JavaScript/WASM
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("wasm", "application/wasm"),
    // Images
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    // Media
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    // Fonts
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    // Documents
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
];

fn registry() -> &'static RwLock<HashMap<String, String>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(default_mime_types()))
}

/// The built-in extension table
pub fn default_mime_types() -> HashMap<String, String> {
    BUILTIN_TYPES
        .iter()
        .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
        .collect()
}

/// Snapshot of the current extension table
pub fn mime_types() -> HashMap<String, String> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Replace the whole extension table
pub fn set_mime_types(types: HashMap<String, String>) {
    let normalized = types
        .into_iter()
        .map(|(ext, mime)| (normalize_extension(&ext), mime))
        .collect();
    *registry().write().unwrap_or_else(PoisonError::into_inner) = normalized;
}

/// Add or override a single extension
pub fn register_mime_type(extension: &str, mime: impl Into<String>) {
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(normalize_extension(extension), mime.into());
}

/// Content type for a file name, based on its extension.
///
/// ```
/// use kurt::http::mime::mime_type;
/// assert_eq!(mime_type("index.html"), "text/html; charset=utf-8");
/// assert_eq!(mime_type("archive.unknownext"), "application/octet-stream");
/// ```
pub fn mime_type(filename: &str) -> String {
    let Some(extension) = Path::new(filename).extension().and_then(|e| e.to_str()) else {
        return DEFAULT_MIME_TYPE.to_string();
    };
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&extension.to_ascii_lowercase())
        .cloned()
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

//! Static file serving from the configured web root.
//!
//! Only files whose extension appears in the fixed mimetype table are
//! served; everything else is refused before touching the filesystem.

use std::path::{Component, Path, PathBuf};

/// 1:1 mapping of file extension to mimetype. Other extensions are ignored.
const MIMETYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("txt", "text/plain"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("ico", "image/x-icon"),
    ("json", "application/json"),
];

#[derive(Debug, PartialEq, Eq)]
pub enum FileError {
    /// Missing or unrecognized extension; client gets a `400`.
    BadExtension,
    /// Traversal attempt or unreadable file; client gets a `404`.
    NotFound,
}

pub fn mimetype_for(path: &str) -> Option<&'static str> {
    let extension = path.rsplit_once('.')?.1;
    MIMETYPES
        .iter()
        .find(|(ext, _)| extension.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
}

/// Resolve a request path under the web root, enforcing the extension
/// allow-list and rejecting traversal outside the root.
pub fn resolve(root: &Path, request_path: &str) -> Result<(PathBuf, &'static str), FileError> {
    let relative = request_path.trim_start_matches('/');
    let relative = if relative.is_empty() { "index.html" } else { relative };

    let mimetype = mimetype_for(relative).ok_or(FileError::BadExtension)?;

    let candidate = Path::new(relative);
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(FileError::NotFound);
    }

    let full = root.join(candidate);
    if !full.is_file() {
        return Err(FileError::NotFound);
    }
    Ok((full, mimetype))
}

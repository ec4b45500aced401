//! Plain-text export of generated posts.

use crate::error::BlogError;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXPORT_NAME: &str = "generated_blog.txt";

/// Accept a bare file name only; `.txt` is appended when there is no extension.
pub fn sanitize_file_name(name: &str) -> Result<String, BlogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BlogError::invalid("file name must not be empty"));
    }
    if name.len() > 128 {
        return Err(BlogError::invalid("file name is longer than 128 bytes"));
    }
    if name.starts_with('.') {
        return Err(BlogError::invalid("file name must not start with '.'"));
    }
    let reserved = |c: char| {
        matches!(c, '/' | '\\' | ':' | '"' | '<' | '>' | '|' | '?' | '*') || c.is_control()
    };
    if name.chars().any(reserved) {
        return Err(BlogError::invalid(format!(
            "file name {name:?} contains a path separator or reserved character"
        )));
    }
    // "notes." has an empty extension; treat it as having none
    let name = name.trim_end_matches('.');
    if Path::new(name).extension().is_some_and(|e| !e.is_empty()) {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}.txt"))
    }
}

/// Write `text` verbatim to `dir/name`, creating `dir` if needed.
pub async fn export_text(dir: &Path, name: &str, text: &str) -> Result<PathBuf, BlogError> {
    let name = sanitize_file_name(name)?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| BlogError::Export(format!("create {}: {e}", dir.display())))?;
    let path = dir.join(name);
    tokio::fs::write(&path, text.as_bytes())
        .await
        .map_err(|e| BlogError::Export(format!("write {}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), bytes = text.len(), "exported post");
    Ok(path)
}

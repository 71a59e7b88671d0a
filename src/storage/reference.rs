use std::sync::LazyLock;

use regex::Regex;

use super::StorageError;

static STORAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/storage/v1/object/(?:public|sign)/documents/(.+?)(?:\?|$)").expect("valid regex")
});

/// Normalise a stored file reference into an object key.
///
/// Accepts a bare key (returned unchanged) or a legacy full URL with the key
/// after a `/documents/` segment and an optional query string. This is the only
/// place references are interpreted; preview, extraction and deletion all go
/// through it.
pub fn storage_path(reference: &str) -> Result<String, StorageError> {
    let reference = reference.trim();
    if !reference.starts_with("http") {
        if reference.is_empty() {
            return Err(StorageError::UnrecognisedReference(reference.to_string()));
        }
        return Ok(reference.to_string());
    }

    if let Some(key) = STORAGE_URL.captures(reference).and_then(|c| c.get(1)) {
        return Ok(key.as_str().to_string());
    }

    if let Some((_, rest)) = reference.split_once("/documents/") {
        let key = rest.split('?').next().unwrap_or_default();
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    Err(StorageError::UnrecognisedReference(reference.to_string()))
}

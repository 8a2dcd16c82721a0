//! Tolerant response-shape parsing.
//!
//! The backend's answers vary by deployment: the login token travels under
//! one of several keys, the identity may be wrapped or bare, and the upload
//! endpoint answers with an array, a `data` envelope, or a plain object.
//! Each extractor documents its priority order and is unit-tested against
//! every known shape.

use rf_core::{StoredFile, User};
use serde_json::Value;

/// Bearer token from a login/register body.
/// Priority: `token`, then `accessToken`, then `jwt`.
pub fn extract_token(body: &Value) -> Option<String> {
    ["token", "accessToken", "jwt"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Identity from an auth body.
/// Priority: the `user` field, then `profile`, then the body itself.
/// A candidate without a numeric `id` is not an identity.
pub fn extract_identity(body: &Value) -> Option<User> {
    let candidate = body
        .get("user")
        .or_else(|| body.get("profile"))
        .unwrap_or(body);
    serde_json::from_value(candidate.clone()).ok()
}

/// Stored-file record from an uploads body.
/// The item is unwrapped first (array head, then `data` envelope, then the
/// body itself); its url is read from `url`, then `path`, then `src`.
pub fn extract_stored_file(body: &Value) -> Option<StoredFile> {
    let item = unwrap_upload_item(body)?;
    let url = ["url", "path", "src"]
        .iter()
        .find_map(|key| item.get(key).and_then(Value::as_str))
        .filter(|url| !url.is_empty())?;
    let id = item
        .get("id")
        .filter(|id| !id.is_null())
        .map(|id| match id {
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        });
    Some(StoredFile {
        url: url.to_string(),
        name: file_name_from_url(url),
        id,
    })
}

fn unwrap_upload_item(body: &Value) -> Option<&Value> {
    match body {
        Value::Array(items) => items.first(),
        _ => Some(body.get("data").unwrap_or(body)),
    }
}

/// Derives a file name from a public url: query and fragment stripped,
/// last path segment kept.
pub fn file_name_from_url(url: &str) -> String {
    let clean = url.split(['?', '#']).next().unwrap_or(url);
    clean.rsplit('/').next().unwrap_or(clean).to_string()
}

//! Error types for the hosting adapter.

use thiserror::Error;

/// Coarse classification of a failed hosting call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostingErrorKind {
    /// The resource being created already exists (repository, ref, label).
    AlreadyExists,
    /// The addressed resource does not exist or is invisible to the credential.
    NotFound,
    /// The credential was rejected or lacks the required scope.
    Unauthorized,
    /// The API understood the request and refused it.
    Rejected,
    /// The request never produced an HTTP response.
    Transport,
    /// A response arrived but could not be decoded.
    Decode,
}

/// A failed hosting API operation.
///
/// Always names the operation that failed and, when the server answered,
/// the HTTP status it answered with.
#[derive(Debug, Error)]
#[error("hosting operation `{operation}` failed{}: {message}", status_suffix(.status))]
pub struct HostingError {
    pub operation: &'static str,
    pub status: Option<u16>,
    pub kind: HostingErrorKind,
    pub message: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

impl HostingError {
    pub fn new(operation: &'static str, kind: HostingErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            status: None,
            kind,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// GitHub reports duplicate names and refs as `422` with an
    /// "already exists" message, so that pairing maps to
    /// [`HostingErrorKind::AlreadyExists`].
    pub fn from_status(operation: &'static str, status: u16, body: &str) -> Self {
        let lowered = body.to_ascii_lowercase();
        let kind = match status {
            401 | 403 => HostingErrorKind::Unauthorized,
            404 => HostingErrorKind::NotFound,
            409 | 422 if lowered.contains("already exist") => HostingErrorKind::AlreadyExists,
            _ => HostingErrorKind::Rejected,
        };
        Self {
            operation,
            status: Some(status),
            kind,
            message: summarize_body(body),
        }
    }

    pub fn transport(operation: &'static str, err: reqwest::Error) -> Self {
        Self {
            operation,
            status: err.status().map(|s| s.as_u16()),
            kind: HostingErrorKind::Transport,
            message: err.without_url().to_string(),
        }
    }

    pub fn decode(operation: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::new(operation, HostingErrorKind::Decode, detail.to_string())
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == HostingErrorKind::AlreadyExists
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == HostingErrorKind::NotFound
    }
}

/// Pull the `message` field out of a GitHub error body, falling back to the
/// raw (truncated) body.
fn summarize_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            let details: Vec<&str> = value
                .get("errors")
                .and_then(|e| e.as_array())
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|e| e.get("message").or_else(|| e.get("code")))
                        .filter_map(|m| m.as_str())
                        .collect()
                })
                .unwrap_or_default();
            if details.is_empty() {
                return message.to_string();
            }
            return format!("{message} ({})", details.join("; "));
        }
    }
    let trimmed = body.trim();
    if trimmed.len() > 300 {
        let mut end = 300;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

/// Convenience result alias.
pub type HostingResult<T> = std::result::Result<T, HostingError>;

//! Error types for remote requests.

use std::time::Duration;

use thiserror::Error;

use crate::http::HttpResponse;

/// Markers the work item tracking service uses when a requested field does not
/// exist in the project's process template.
const FIELD_NOT_FOUND_MARKERS: &[&str] = &[
    "TF51535",
    "WorkItemTrackingFieldDefinitionNotFoundException",
    "Cannot find field",
];

/// Terminal error raised by the request gateway.
///
/// Every variant carries the URLs that were attempted (primary, then alternate
/// base URL if one was tried), in order.
#[derive(Debug, Error)]
pub enum RemoteRequestError {
    /// The transport failed (connection refused, reset, timeout) on every attempt.
    #[error("request to {} failed: {message}", .attempted.join(", "))]
    Transport {
        message: String,
        attempted: Vec<String>,
    },

    /// The remote answered with a non-success status.
    #[error("HTTP {status} from {}: {message}", .attempted.join(", "))]
    Status {
        status: u16,
        message: String,
        attempted: Vec<String>,
    },

    /// Rate limit still in effect after the allowed number of waits.
    #[error("rate limit exceeded for {}", .attempted.join(", "))]
    RateLimited {
        retry_after: Option<Duration>,
        attempted: Vec<String>,
    },

    /// The response body was not the JSON shape we expected.
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RemoteRequestError {
    /// Build a status error from a non-success response.
    pub(crate) fn from_response(response: &HttpResponse, attempted: Vec<String>) -> Self {
        Self::Status {
            status: response.status,
            message: response_message(response),
            attempted,
        }
    }

    /// URLs attempted before giving up.
    #[must_use]
    pub fn attempted(&self) -> &[String] {
        match self {
            Self::Transport { attempted, .. }
            | Self::Status { attempted, .. }
            | Self::RateLimited { attempted, .. } => attempted,
            Self::Decode { endpoint, .. } => std::slice::from_ref(endpoint),
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Connection failures and 5xx responses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } => false,
        }
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// A 400 saying one of the requested fields is unknown to the project.
    #[must_use]
    pub fn is_field_not_found(&self) -> bool {
        match self {
            Self::Status {
                status: 400,
                message,
                ..
            } => FIELD_NOT_FOUND_MARKERS.iter().any(|m| message.contains(m)),
            _ => false,
        }
    }
}

/// Get a short error message suitable for display.
pub fn short_error_message(err: &RemoteRequestError) -> String {
    match err {
        RemoteRequestError::Transport { .. } => "Network error".to_string(),
        RemoteRequestError::Status {
            status, message, ..
        } => {
            if message.chars().count() > 50 {
                let truncated: String = message.chars().take(47).collect();
                format!("HTTP {}: {}...", status, truncated)
            } else {
                format!("HTTP {}: {}", status, message)
            }
        }
        RemoteRequestError::RateLimited { .. } => "Rate limited".to_string(),
        RemoteRequestError::Decode { .. } => "JSON parse error".to_string(),
    }
}

/// Human-readable message from an error body.
///
/// Azure DevOps error bodies are `{"message": "...", "typeKey": "..."}`; both are
/// kept so the type key stays available for classification.
fn response_message(response: &HttpResponse) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) {
        let message = value.get("message").and_then(|m| m.as_str());
        let type_key = value.get("typeKey").and_then(|t| t.as_str());
        match (message, type_key) {
            (Some(m), Some(t)) => return format!("{m} ({t})"),
            (Some(m), None) => return m.to_string(),
            _ => {}
        }
    }
    let text = String::from_utf8_lossy(&response.body);
    let text = text.trim();
    if text.is_empty() {
        format!("status {}", response.status)
    } else {
        text.chars().take(500).collect()
    }
}

use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;

use super::transport::Reply;

/// A non-success answer from the speech service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub status: StatusCode,
    pub message: String,
}

/// Body shape the service uses for validation errors
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

impl ServiceError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Build the error for a failed reply
    pub fn from_reply(reply: &Reply) -> Self {
        Self::from_parts(reply.status, &String::from_utf8_lossy(&reply.body))
    }

    /// Resolve the message for a status and (possibly empty) body
    pub fn from_parts(status: StatusCode, body: &str) -> Self {
        let message = match status {
            StatusCode::FORBIDDEN => "No permission to access this resource.".to_string(),
            StatusCode::UNAUTHORIZED => "Not authorized to see the resource.".to_string(),
            StatusCode::NOT_FOUND => "The resource could not be found.".to_string(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => "The file type isn't supported.".to_string(),
            StatusCode::BAD_REQUEST => serde_json::from_str::<ErrorBody>(body)
                .ok()
                .and_then(|body| body.message)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| reason_phrase(status)),
            _ => reason_phrase(status),
        };
        Self::new(status, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown Status").to_string()
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status.as_u16())
    }
}

impl std::error::Error for ServiceError {}

// Booking API error types and message extraction

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";
pub const LOGIN_REQUIRED_MESSAGE: &str = "Login required";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Login required")]
    LoginRequired,
    #[error("Session expired. Please log in again.")]
    SessionExpired,
    /// Non-2xx response; `message` is what the user sees.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return BackendError::SessionExpired;
        }
        let parsed = serde_json::from_str::<Value>(body).ok();
        BackendError::Api {
            status: status.as_u16(),
            message: extract_message(parsed.as_ref()),
        }
    }

    /// Session expiry is recognised by variant or, for errors relayed as
    /// plain text, by message.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, BackendError::SessionExpired)
            || self.to_string().to_lowercase().contains("session expired")
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Api { status: 404, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Api { status, .. } => Some(*status),
            BackendError::SessionExpired => Some(401),
            _ => None,
        }
    }

    /// Connection failures, 5xx and 429 are worth another attempt on idempotent calls.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(_) => true,
            BackendError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Text shown to the user. Transport and decoding details stay in the logs.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            BackendError::Api { message, .. } if !message.is_empty() => message.clone(),
            BackendError::LoginRequired | BackendError::SessionExpired => self.to_string(),
            BackendError::InvalidRequest(msg) => msg.clone(),
            _ => fallback.to_string(),
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Http(e.to_string())
    }
}

/// `detail`, then `error`, then `message`, then field errors
/// (`field: a, b; other: c`), else a generic message.
pub fn extract_message(body: Option<&Value>) -> String {
    let Some(body) = body else {
        return "Request failed".to_string();
    };

    for key in ["detail", "error", "message"] {
        match body.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Null) | None => {}
            Some(other) => return flatten(other),
        }
    }

    match body {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(field, msgs)| format!("{}: {}", field, flatten(msgs)))
            .collect::<Vec<_>>()
            .join("; "),
        Value::Object(_) => "Validation failed".to_string(),
        _ => "Request failed".to_string(),
    }
}

fn flatten(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(flatten).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

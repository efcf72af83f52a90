// Gateway error types, the gateway's error envelope, and terminal-intent classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::types::PaymentIntent;

/// Version of the terminal-intent contract below. Bump when the code list changes.
pub const TERMINAL_INTENT_CONTRACT_VERSION: u32 = 1;

/// Gateway error codes meaning the intent can no longer be confirmed and
/// must be replaced rather than retried.
pub const TERMINAL_INTENT_CODES: &[&str] = &["payment_intent_unexpected_state"];

// Fallback for errors that arrive without a code.
const TERMINAL_MESSAGE_PATTERN: &str = "terminal state";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayErrorType {
    ApiConnectionError,
    ApiError,
    AuthenticationError,
    CardError,
    IdempotencyError,
    InvalidRequestError,
    RateLimitError,
    ValidationError,
    Unknown,
}

impl From<&str> for GatewayErrorType {
    fn from(s: &str) -> Self {
        match s {
            "api_connection_error" => GatewayErrorType::ApiConnectionError,
            "api_error" => GatewayErrorType::ApiError,
            "authentication_error" => GatewayErrorType::AuthenticationError,
            "card_error" => GatewayErrorType::CardError,
            "idempotency_error" => GatewayErrorType::IdempotencyError,
            "invalid_request_error" => GatewayErrorType::InvalidRequestError,
            "rate_limit_error" => GatewayErrorType::RateLimitError,
            "validation_error" => GatewayErrorType::ValidationError,
            _ => GatewayErrorType::Unknown,
        }
    }
}

// Gateway REST error envelope: { error: { type, code, decline_code, message, param, payment_intent } }
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayErrorEnvelope {
    pub error: GatewayErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayErrorBody {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub decline_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payment_intent: Option<PaymentIntent>,
}

/// An error the gateway reported for a confirmation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayErrorDetails {
    pub type_: GatewayErrorType,
    pub code: Option<String>,
    pub decline_code: Option<String>,
    pub message: Option<String>,
    pub param: Option<String>,
    pub payment_intent: Option<PaymentIntent>,
}

impl GatewayErrorDetails {
    pub fn new(type_: GatewayErrorType, code: Option<&str>, message: Option<&str>) -> Self {
        Self {
            type_,
            code: code.map(str::to_string),
            decline_code: None,
            message: message.map(str::to_string),
            param: None,
            payment_intent: None,
        }
    }

    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    pub fn is_terminal_intent(&self) -> bool {
        is_terminal_intent_error(self.code.as_deref(), self.message.as_deref())
    }
}

impl From<GatewayErrorEnvelope> for GatewayErrorDetails {
    fn from(env: GatewayErrorEnvelope) -> Self {
        let e = env.error;
        Self {
            type_: GatewayErrorType::from(e.type_.as_str()),
            code: e.code,
            decline_code: e.decline_code,
            message: e.message,
            param: e.param,
            payment_intent: e.payment_intent,
        }
    }
}

/// True when the code is in the terminal contract, or when no code is
/// recognised but the message says the intent is in a terminal state.
pub fn is_terminal_intent_error(code: Option<&str>, message: Option<&str>) -> bool {
    if let Some(code) = code {
        if TERMINAL_INTENT_CODES.contains(&code) {
            return true;
        }
    }
    message
        .map(|m| m.to_ascii_lowercase().contains(TERMINAL_MESSAGE_PATTERN))
        .unwrap_or(false)
}

/// Transport-level failures talking to the gateway. Card declines and
/// similar are not errors here; they come back as `ConfirmOutcome::Failed`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("precondition failed: {0}")]
    Precondition(&'static str),
    #[error("gateway error: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_by_code() {
        assert!(is_terminal_intent_error(Some("payment_intent_unexpected_state"), None));
        assert!(!is_terminal_intent_error(Some("card_declined"), Some("Your card was declined.")));
    }

    #[test]
    fn test_terminal_by_message_fallback() {
        assert!(is_terminal_intent_error(
            None,
            Some("This PaymentIntent's status is in a Terminal State and cannot be confirmed.")
        ));
        assert!(!is_terminal_intent_error(None, None));
    }

    #[test]
    fn test_envelope_to_details() {
        let env: GatewayErrorEnvelope = serde_json::from_str(
            r#"{"error":{"type":"card_error","code":"card_declined","decline_code":"insufficient_funds","message":"Your card has insufficient funds."}}"#,
        )
        .unwrap();
        let details = GatewayErrorDetails::from(env);
        assert_eq!(details.type_, GatewayErrorType::CardError);
        assert_eq!(details.decline_code.as_deref(), Some("insufficient_funds"));
        assert!(!details.is_terminal_intent());
        assert_eq!(details.message_or("x"), "Your card has insufficient funds.");
    }
}

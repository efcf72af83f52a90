// Minimal gateway DTOs used by the checkout
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gateway::errors::GatewayErrorDetails;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    /// Statuses after which the intent cannot be confirmed again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Canceled | IntentStatus::Succeeded)
    }
}

// PaymentIntent minimal shape
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_action: Option<serde_json::Value>,
}

impl fmt::Debug for PaymentIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentIntent")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("amount", &self.amount)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

/// Shown on the receipt only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    pub name: String,
    pub email: String,
}

/// Card data as produced by the embedded card field: never raw numbers,
/// either a tokenized payment method or a single-use card token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardInput {
    PaymentMethod(String),
    CardToken(String),
}

impl CardInput {
    pub fn is_blank(&self) -> bool {
        match self {
            CardInput::PaymentMethod(v) | CardInput::CardToken(v) => v.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CardConfirmation {
    pub card: CardInput,
    pub billing: BillingDetails,
}

/// Result of a "confirm card payment" call: `{ error }` or `{ paymentIntent }`.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    Failed(GatewayErrorDetails),
    Confirmed(PaymentIntent),
}

// Booking API DTOs as consumed by the checkout
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Money held in the smallest currency unit (cents for USD).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AmountCents(pub i64);

impl AmountCents {
    /// Parse a decimal string such as `"1234.5"` or `"-12.005"`.
    /// Fractions beyond two digits are rounded half away from zero.
    pub fn parse_decimal(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (negative, digits) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut frac_digits = frac.bytes().map(|b| (b - b'0') as i64);
        let tens = frac_digits.next().unwrap_or(0);
        let ones = frac_digits.next().unwrap_or(0);
        let round_up = frac_digits.next().map(|d| d >= 5).unwrap_or(false);

        let mut cents = whole.checked_mul(100)?.checked_add(tens * 10 + ones)?;
        if round_up {
            cents = cents.checked_add(1)?;
        }
        Some(AmountCents(if negative { -cents } else { cents }))
    }

    pub fn whole_units(self) -> i64 {
        self.0 / 100
    }
}

impl<'de> Deserialize<'de> for AmountCents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
            Null(()),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => AmountCents::parse_decimal(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal amount: {s}"))),
            Raw::Number(n) => Ok(AmountCents((n * 100.0).round() as i64)),
            Raw::Null(()) => Ok(AmountCents(0)),
        }
    }
}

/// Booking lifecycle as reported by the backend. Only `Paid` is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookingStatus {
    Draft,
    PendingPayment,
    Paid,
    Cancelled,
    Failed,
    Other(String),
}

impl BookingStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, BookingStatus::Paid)
    }

    pub fn as_str(&self) -> &str {
        match self {
            BookingStatus::Draft => "draft",
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Paid => "paid",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Failed => "failed",
            BookingStatus::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for BookingStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => BookingStatus::Draft,
            "pending_payment" => BookingStatus::PendingPayment,
            "paid" => BookingStatus::Paid,
            "cancelled" => BookingStatus::Cancelled,
            "failed" => BookingStatus::Failed,
            _ => BookingStatus::Other(s),
        }
    }
}

impl From<BookingStatus> for String {
    fn from(s: BookingStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Other(String::new())
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_party_size() -> u32 {
    1
}

/// Booking record, read-only from the checkout's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub booking_ref: String,
    #[serde(default)]
    pub trek_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trek_slug: Option<String>,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default = "default_party_size")]
    pub party_size: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub total_amount: AmountCents,
    #[serde(default)]
    pub lead_name: String,
    #[serde(default)]
    pub lead_email: String,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_publishable_key: Option<String>,
}

impl Booking {
    pub fn is_paid(&self) -> bool {
        self.status.is_paid()
    }

    /// Booking-specific publishable key, ignoring blanks.
    pub fn publishable_key(&self) -> Option<&str> {
        self.stripe_publishable_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn currency_or_default(&self) -> &str {
        if self.currency.trim().is_empty() {
            "USD"
        } else {
            self.currency.as_str()
        }
    }
}

/// Client secret issued for one checkout attempt.
#[derive(Clone, Serialize, Deserialize)]
pub struct IntentGrant {
    pub client_secret: String,
    #[serde(default, alias = "payment_intent_id", skip_serializing_if = "Option::is_none")]
    pub stripe_intent_id: Option<String>,
}

impl IntentGrant {
    /// Intent id, falling back to the `pi_xxx` prefix of the client secret.
    pub fn intent_id(&self) -> Option<String> {
        self.stripe_intent_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| intent_id_from_secret(&self.client_secret))
    }
}

// Keep secrets out of logs.
impl fmt::Debug for IntentGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentGrant")
            .field("client_secret", &"<redacted>")
            .field("stripe_intent_id", &self.stripe_intent_id)
            .finish()
    }
}

/// `pi_123_secret_456` -> `pi_123`
pub fn intent_id_from_secret(client_secret: &str) -> Option<String> {
    client_secret
        .split_once("_secret_")
        .map(|(id, _)| id.to_string())
        .filter(|id| !id.is_empty())
}

/// Hosted checkout session; either field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostedSession {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizeAck {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
}

// Checkout session state: phases, banners, navigation commands

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::booking::types::{intent_id_from_secret, Booking, IntentGrant};
use crate::settings::RouteSettings;

/// Characters left alone by a browser's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    LoadingBooking,
    /// Terminal for this mount; the user navigates back.
    LoadError,
    /// Terminal; the success view is shown.
    AlreadyPaid,
    AwaitingIntent,
    HostedCheckoutRedirect,
    /// Recoverable; the user may retry.
    IntentError,
    ReadyForCardEntry,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::LoadError | Phase::AlreadyPaid)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::LoadingBooking => "LOADING_BOOKING",
            Phase::LoadError => "LOAD_ERROR",
            Phase::AlreadyPaid => "ALREADY_PAID",
            Phase::AwaitingIntent => "AWAITING_INTENT",
            Phase::HostedCheckoutRedirect => "HOSTED_CHECKOUT_REDIRECT",
            Phase::IntentError => "INTENT_ERROR",
            Phase::ReadyForCardEntry => "READY_FOR_CARD_ENTRY",
        };
        f.write_str(s)
    }
}

/// What went wrong, so the view can word and style it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingReference,
    LoadFailed,
    SessionExpired,
    IntentProvisioning,
    HostedCheckout,
    CardValidation,
    CardDeclined,
    TerminalIntent,
    /// Charge captured at the gateway, booking not yet reconciled.
    FinalizePending,
    ActionRequired,
    GatewayUnavailable,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub kind: ErrorKind,
    pub message: String,
}

impl Banner {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Navigation the front end should perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Navigation {
    /// Replace the current history entry.
    Replace { path: String },
    Push { path: String },
    External { url: String },
}

impl Navigation {
    /// Login route with `next` pointing back at this booking's payment page.
    pub fn login_for(routes: &RouteSettings, booking_ref: &str) -> Self {
        let next = format!("{}?booking_ref={}", routes.payment, encode_component(booking_ref));
        Navigation::Replace {
            path: format!("{}?next={}", routes.login, encode_component(&next)),
        }
    }

    pub fn success_for(routes: &RouteSettings, booking_ref: &str) -> Self {
        Navigation::Push {
            path: format!("{}?bookingRef={}", routes.success, encode_component(booking_ref)),
        }
    }
}

/// The one intent tracked for this session.
#[derive(Clone, PartialEq, Eq)]
pub struct ActiveIntent {
    pub client_secret: String,
    pub intent_id: Option<String>,
}

impl ActiveIntent {
    pub fn from_grant(grant: IntentGrant) -> Self {
        let intent_id = grant.intent_id();
        Self {
            client_secret: grant.client_secret,
            intent_id,
        }
    }

    pub fn from_secret(client_secret: impl Into<String>) -> Self {
        let client_secret = client_secret.into();
        let intent_id = intent_id_from_secret(&client_secret);
        Self {
            client_secret,
            intent_id,
        }
    }
}

impl fmt::Debug for ActiveIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveIntent")
            .field("client_secret", &"<redacted>")
            .field("intent_id", &self.intent_id)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFormState {
    /// Card field is shown against the current client secret.
    pub mounted: bool,
    pub processing: bool,
    pub card_error: Option<String>,
}

/// Snapshot of one checkout session. Lives only as long as the page.
#[derive(Debug, Clone)]
pub struct CheckoutState {
    pub booking_ref: String,
    pub phase: Phase,
    pub booking: Option<Booking>,
    pub intent: Option<ActiveIntent>,
    /// Effective publishable key; `None` routes through hosted checkout.
    pub publishable_key: Option<String>,
    pub error: Option<Banner>,
    pub notice: Option<String>,
    pub intent_loading: bool,
    pub checkout_loading: bool,
    pub card: CardFormState,
    /// Intent id whose charge succeeded but is not yet reconciled.
    pub captured_intent_id: Option<String>,
    pub awaiting_action: bool,
    pub next_action: Option<serde_json::Value>,
    pub navigation: Option<Navigation>,
    pub version: u64,
}

impl CheckoutState {
    pub fn new(booking_ref: impl Into<String>) -> Self {
        Self {
            booking_ref: booking_ref.into(),
            phase: Phase::LoadingBooking,
            booking: None,
            intent: None,
            publishable_key: None,
            error: None,
            notice: None,
            intent_loading: false,
            checkout_loading: false,
            card: CardFormState::default(),
            captured_intent_id: None,
            awaiting_action: false,
            next_action: None,
            navigation: None,
            version: 0,
        }
    }

    pub fn payment_captured(&self) -> bool {
        self.captured_intent_id.is_some()
    }

    pub fn set_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error = Some(Banner::new(kind, message));
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Forget the current intent and unmount the card field.
    pub fn discard_intent(&mut self) {
        self.intent = None;
        self.card.mounted = false;
        self.awaiting_action = false;
        self.next_action = None;
    }
}

// Serializable views rendered by the thin front end

use chrono::NaiveDate;
use serde::Serialize;

use crate::booking::types::{AmountCents, Booking};
use crate::checkout::state::{Banner, CheckoutState, Navigation, Phase};

pub const PAY_LABEL: &str = "Pay Now";
pub const PROCESSING_LABEL: &str = "Finalizing payment...";
pub const RECEIPT_PENDING_LABEL: &str = "Receipt will arrive shortly";
const LOADING_STATUS: &str = "Loading booking...";
const PREPARING_STATUS: &str = "Preparing secure payment form...";
const REDIRECTING_STATUS: &str = "Redirecting to secure checkout...";

/// `$1,234.50` for USD; other currencies use their symbol or code prefix.
pub fn format_money(amount: AmountCents, currency: &str) -> String {
    let code = currency.trim().to_ascii_uppercase();
    let prefix = match code.as_str() {
        "" | "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        "INR" => "₹".to_string(),
        other => format!("{other} "),
    };
    let sign = if amount.0 < 0 { "-" } else { "" };
    let cents = amount.0.unsigned_abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{prefix}{grouped}.{:02}", cents % 100)
}

/// Inclusive day count, never less than one. `None` when either date is unparseable.
pub fn trek_days(start: &str, end: &str) -> Option<i64> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    Some(((end - start).num_days() + 1).max(1))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Accept full timestamps by taking the date part.
    let date = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn days_label(booking: &Booking) -> String {
    match trek_days(&booking.start_date, &booking.end_date) {
        Some(1) => "1 day".to_string(),
        Some(n) => format!("{n} days"),
        None => "TBA".to_string(),
    }
}

fn travel_dates(booking: &Booking) -> String {
    match (booking.start_date.trim(), booking.end_date.trim()) {
        ("", "") => "TBA".to_string(),
        (start, "") => start.to_string(),
        ("", end) => end.to_string(),
        (start, end) => format!("{start} to {end}"),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BookingSummary {
    pub booking_ref: String,
    pub trek_title: String,
    pub days: String,
    pub travel_dates: String,
    pub party_size: u32,
    pub total: String,
    pub lead_name: String,
    pub lead_email: String,
}

impl BookingSummary {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            booking_ref: booking.booking_ref.clone(),
            trek_title: booking.trek_title.clone(),
            days: days_label(booking),
            travel_dates: travel_dates(booking),
            party_size: booking.party_size,
            total: format_money(booking.total_amount, booking.currency_or_default()),
            lead_name: booking.lead_name.clone(),
            lead_email: booking.lead_email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CardFormView {
    pub mounted: bool,
    pub disabled: bool,
    pub processing: bool,
    pub button_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReceiptView {
    Link { url: String },
    Pending { label: &'static str },
}

impl ReceiptView {
    pub fn for_booking(booking: &Booking) -> Self {
        match booking.receipt_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => ReceiptView::Link { url: url.to_string() },
            None => ReceiptView::Pending {
                label: RECEIPT_PENDING_LABEL,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewAction {
    GoBack,
    Retry,
    BackToHome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutView {
    pub booking_ref: String,
    pub phase: Phase,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BookingSummary>,
    /// Key the browser-side card field tokenizes with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publishable_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Banner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub payment_captured: bool,
    pub awaiting_action: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action: Option<serde_json::Value>,
    pub card_form: CardFormView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptView>,
    pub actions: Vec<ViewAction>,
}

impl CheckoutView {
    pub fn from_state(st: &CheckoutState) -> Self {
        let status = match st.phase {
            Phase::LoadingBooking => Some(LOADING_STATUS),
            Phase::AwaitingIntent if st.intent.is_none() => Some(PREPARING_STATUS),
            Phase::HostedCheckoutRedirect if st.error.is_none() => Some(REDIRECTING_STATUS),
            _ => None,
        };

        let mut actions = Vec::new();
        match st.phase {
            Phase::LoadError => actions.push(ViewAction::GoBack),
            Phase::AlreadyPaid => actions.push(ViewAction::BackToHome),
            Phase::IntentError => actions.push(ViewAction::Retry),
            Phase::HostedCheckoutRedirect if st.error.is_some() && !st.checkout_loading => {
                actions.push(ViewAction::Retry)
            }
            Phase::ReadyForCardEntry if st.payment_captured() && !st.card.processing => {
                actions.push(ViewAction::Retry)
            }
            _ => {}
        }

        let mounted = st.card.mounted && st.phase == Phase::ReadyForCardEntry;
        let card_form = CardFormView {
            mounted,
            disabled: !mounted || st.card.processing || st.intent_loading || st.payment_captured(),
            processing: st.card.processing,
            button_label: if st.card.processing { PROCESSING_LABEL } else { PAY_LABEL },
            card_error: st.card.card_error.clone(),
        };

        let receipt = match (&st.phase, &st.booking) {
            (Phase::AlreadyPaid, Some(booking)) => Some(ReceiptView::for_booking(booking)),
            _ => None,
        };

        Self {
            booking_ref: st.booking_ref.clone(),
            phase: st.phase,
            version: st.version,
            summary: st.booking.as_ref().map(BookingSummary::from_booking),
            publishable_key: if mounted { st.publishable_key.clone() } else { None },
            status,
            error: st.error.clone(),
            // A notice is only shown when there is no error to show.
            notice: if st.error.is_none() { st.notice.clone() } else { None },
            payment_captured: st.payment_captured(),
            awaiting_action: st.awaiting_action,
            next_action: st.next_action.clone(),
            card_form,
            navigation: st.navigation.clone(),
            receipt,
            actions,
        }
    }
}

// Payment success page: re-reads the booking and renders a receipt summary.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::booking::errors::BackendError;
use crate::booking::BookingApi;
use crate::checkout::view::{format_money, BookingSummary, ReceiptView};

pub const MISSING_SUCCESS_REFERENCE_MESSAGE: &str = "Booking reference missing.";
pub const SUCCESS_LOAD_FAILED_MESSAGE: &str = "Unable to load booking.";

/// Query keys accepted for the booking reference, in priority order.
const REFERENCE_KEYS: [&str; 3] = ["bookingRef", "booking_ref", "bookingId"];

pub fn booking_ref_from_query(query: &HashMap<String, String>) -> Option<String> {
    REFERENCE_KEYS
        .iter()
        .filter_map(|key| query.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessView {
    pub booking_ref: String,
    pub trek_title: String,
    pub travel_dates: String,
    pub days: String,
    pub party_size: u32,
    pub total_paid: String,
    pub lead_email: String,
    pub paid: bool,
    pub receipt: ReceiptView,
}

#[derive(Debug, thiserror::Error)]
pub enum SuccessError {
    #[error("{}", MISSING_SUCCESS_REFERENCE_MESSAGE)]
    MissingReference,
    #[error("{message}")]
    Load {
        message: String,
        #[source]
        source: BackendError,
    },
}

impl SuccessError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, SuccessError::Load { source, .. } if source.is_session_expired())
    }
}

pub async fn load_success_view(
    api: &dyn BookingApi,
    booking_ref: Option<&str>,
) -> Result<SuccessView, SuccessError> {
    let booking_ref = booking_ref
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or(SuccessError::MissingReference)?;

    let booking = api.fetch_booking(booking_ref).await.map_err(|e| {
        warn!(target: "checkout", booking_ref, error = %e, "success page load failed");
        SuccessError::Load {
            message: e.user_message(SUCCESS_LOAD_FAILED_MESSAGE),
            source: e,
        }
    })?;
    info!(target: "checkout", booking_ref, paid = booking.is_paid(), "success page loaded");

    let summary = BookingSummary::from_booking(&booking);
    Ok(SuccessView {
        booking_ref: booking.booking_ref.clone(),
        trek_title: summary.trek_title,
        travel_dates: summary.travel_dates,
        days: summary.days,
        party_size: summary.party_size,
        total_paid: format_money(booking.total_amount, booking.currency_or_default()),
        lead_email: summary.lead_email,
        paid: booking.is_paid(),
        receipt: ReceiptView::for_booking(&booking),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::types::BookingStatus;
    use crate::checkout::testing::{booking, FakeBookingApi, FakeFailure};
    use crate::checkout::view::RECEIPT_PENDING_LABEL;

    #[test]
    fn test_reference_key_priority() {
        let mut q = HashMap::new();
        q.insert("bookingId".to_string(), "EVT-3".to_string());
        assert_eq!(booking_ref_from_query(&q).as_deref(), Some("EVT-3"));
        q.insert("booking_ref".to_string(), "EVT-2".to_string());
        assert_eq!(booking_ref_from_query(&q).as_deref(), Some("EVT-2"));
        q.insert("bookingRef".to_string(), " ".to_string());
        assert_eq!(booking_ref_from_query(&q).as_deref(), Some("EVT-2"));
        q.insert("bookingRef".to_string(), "EVT-1".to_string());
        assert_eq!(booking_ref_from_query(&q).as_deref(), Some("EVT-1"));
    }

    #[tokio::test]
    async fn test_success_view_for_paid_booking() {
        let api = FakeBookingApi::with_booking(booking("EVT-1001", BookingStatus::Paid, None));
        let view = load_success_view(api.as_ref(), Some("EVT-1001")).await.unwrap();
        assert_eq!(view.total_paid, "$2,450.00");
        assert_eq!(view.days, "14 days");
        assert_eq!(view.lead_email, "sam@example.com");
        assert!(view.paid);
        assert_eq!(
            view.receipt,
            ReceiptView::Pending {
                label: RECEIPT_PENDING_LABEL
            }
        );
    }

    #[tokio::test]
    async fn test_missing_reference() {
        let api = FakeBookingApi::empty();
        let err = load_success_view(api.as_ref(), None).await.unwrap_err();
        assert_eq!(err.to_string(), MISSING_SUCCESS_REFERENCE_MESSAGE);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_surfaces_message() {
        let api = FakeBookingApi::empty();
        api.fail_fetch(FakeFailure::SessionExpired);
        let err = load_success_view(api.as_ref(), Some("EVT-1")).await.unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(err.to_string(), "Session expired. Please log in again.");
    }
}

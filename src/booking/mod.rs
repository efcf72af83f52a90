// Booking backend: booking fetch and payment-intent provisioning

pub mod errors;
pub mod rest;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::AuthContext;

use self::errors::BackendError;
use self::types::{Booking, FinalizeAck, HostedSession, IntentGrant};

/// Calls the checkout makes against the booking backend.
#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn fetch_booking(&self, booking_ref: &str) -> Result<Booking, BackendError>;

    /// Request a client secret for the booking's next charge attempt.
    async fn create_payment_intent(&self, booking_ref: &str) -> Result<IntentGrant, BackendError>;

    /// Reconcile a gateway-reported success against the booking record.
    async fn finalize_payment(
        &self,
        booking_ref: &str,
        payment_intent_id: &str,
    ) -> Result<FinalizeAck, BackendError>;

    async fn create_checkout_session(&self, booking_ref: &str) -> Result<HostedSession, BackendError>;
}

/// Builds a `BookingApi` that acts as a given caller.
pub trait BookingApiFactory: Send + Sync {
    fn for_auth(&self, auth: AuthContext) -> Arc<dyn BookingApi>;
}

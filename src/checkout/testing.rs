// In-memory booking backend and gateway used by checkout and server tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::booking::errors::BackendError;
use crate::booking::types::{intent_id_from_secret, AmountCents, Booking, BookingStatus, FinalizeAck, HostedSession, IntentGrant};
use crate::booking::BookingApi;
use crate::gateway::errors::GatewayError;
use crate::gateway::types::{CardConfirmation, ConfirmOutcome, IntentStatus, PaymentIntent};
use crate::gateway::{GatewayProvider, PaymentGateway};
use crate::settings::Config;

pub(crate) fn config() -> Config {
    let mut cfg = Config::default();
    cfg.stripe.publishable_key = String::new();
    cfg.checkout.intent_timeout = Duration::from_secs(2);
    cfg.checkout.confirm_timeout = Duration::from_secs(2);
    cfg.checkout.finalize_timeout = Duration::from_secs(2);
    cfg.checkout.action_timeout = Duration::from_millis(60);
    cfg.checkout.action_poll_interval = Duration::from_millis(5);
    cfg
}

pub(crate) fn booking(booking_ref: &str, status: BookingStatus, key: Option<&str>) -> Booking {
    Booking {
        booking_ref: booking_ref.to_string(),
        trek_title: "Annapurna Circuit".to_string(),
        trek_slug: Some("annapurna-circuit".to_string()),
        start_date: "2025-10-01".to_string(),
        end_date: "2025-10-14".to_string(),
        party_size: 2,
        currency: "USD".to_string(),
        total_amount: AmountCents(245_000),
        lead_name: "Sam Rai".to_string(),
        lead_email: "sam@example.com".to_string(),
        status,
        receipt_url: None,
        stripe_publishable_key: key.map(str::to_string),
    }
}

#[derive(Clone, Debug)]
pub(crate) enum FakeFailure {
    SessionExpired,
    Api(u16, String),
    Http,
}

impl FakeFailure {
    fn to_error(&self) -> BackendError {
        match self {
            FakeFailure::SessionExpired => BackendError::SessionExpired,
            FakeFailure::Api(status, message) => BackendError::Api {
                status: *status,
                message: message.clone(),
            },
            FakeFailure::Http => BackendError::Http("connection refused".to_string()),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeBookingApi {
    booking: Mutex<Option<Booking>>,
    fetch_failure: Mutex<Option<FakeFailure>>,
    intent_failure: Mutex<Option<FakeFailure>>,
    finalize_failure: Mutex<Option<FakeFailure>>,
    secrets: Mutex<VecDeque<String>>,
    hosted: Mutex<HostedSession>,
    paid_on_finalize: AtomicBool,
    delay: Mutex<Duration>,
    intent_delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeBookingApi {
    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_booking(booking: Booking) -> Arc<Self> {
        let api = Self::default();
        *api.booking.lock().unwrap() = Some(booking);
        Arc::new(api)
    }

    pub(crate) fn push_secret(&self, secret: &str) {
        self.secrets.lock().unwrap().push_back(secret.to_string());
    }

    pub(crate) fn mark_paid_on_finalize(&self) {
        self.paid_on_finalize.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_fetch(&self, failure: FakeFailure) {
        *self.fetch_failure.lock().unwrap() = Some(failure);
    }

    pub(crate) fn fail_intent(&self, failure: FakeFailure) {
        *self.intent_failure.lock().unwrap() = Some(failure);
    }

    pub(crate) fn clear_intent_failure(&self) {
        *self.intent_failure.lock().unwrap() = None;
    }

    pub(crate) fn fail_finalize(&self, failure: FakeFailure) {
        *self.finalize_failure.lock().unwrap() = Some(failure);
    }

    pub(crate) fn clear_finalize_failure(&self) {
        *self.finalize_failure.lock().unwrap() = None;
    }

    pub(crate) fn set_hosted(&self, session_id: Option<&str>, url: Option<&str>) {
        *self.hosted.lock().unwrap() = HostedSession {
            session_id: session_id.map(str::to_string),
            url: url.map(str::to_string),
        };
    }

    /// Delay applied to every call.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn set_intent_delay(&self, delay: Duration) {
        *self.intent_delay.lock().unwrap() = delay;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == call).count()
    }

    async fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BookingApi for FakeBookingApi {
    async fn fetch_booking(&self, _booking_ref: &str) -> Result<Booking, BackendError> {
        self.record("fetch".to_string()).await;
        if let Some(failure) = self.fetch_failure.lock().unwrap().as_ref() {
            return Err(failure.to_error());
        }
        self.booking.lock().unwrap().clone().ok_or(BackendError::Api {
            status: 404,
            message: "Not found.".to_string(),
        })
    }

    async fn create_payment_intent(&self, _booking_ref: &str) -> Result<IntentGrant, BackendError> {
        self.record("intent".to_string()).await;
        let delay = *self.intent_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.intent_failure.lock().unwrap().as_ref() {
            return Err(failure.to_error());
        }
        let secret = self.secrets.lock().unwrap().pop_front().unwrap_or_default();
        Ok(IntentGrant {
            client_secret: secret,
            stripe_intent_id: None,
        })
    }

    async fn finalize_payment(&self, _booking_ref: &str, intent_id: &str) -> Result<FinalizeAck, BackendError> {
        self.record(format!("finalize:{intent_id}")).await;
        if let Some(failure) = self.finalize_failure.lock().unwrap().as_ref() {
            return Err(failure.to_error());
        }
        if self.paid_on_finalize.load(Ordering::SeqCst) {
            if let Some(booking) = self.booking.lock().unwrap().as_mut() {
                booking.status = BookingStatus::Paid;
            }
        }
        Ok(FinalizeAck {
            ok: true,
            booking: None,
        })
    }

    async fn create_checkout_session(&self, _booking_ref: &str) -> Result<HostedSession, BackendError> {
        self.record("checkout".to_string()).await;
        Ok(self.hosted.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeGateway {
    confirms: Mutex<VecDeque<Result<ConfirmOutcome, GatewayError>>>,
    retrievals: Mutex<VecDeque<IntentStatus>>,
    confirmed: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

impl FakeGateway {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_confirm(&self, reply: Result<ConfirmOutcome, GatewayError>) {
        self.confirms.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_retrieval(&self, status: IntentStatus) {
        self.retrievals.lock().unwrap().push_back(status);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn confirmed_secrets(&self) -> Vec<String> {
        self.confirmed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        _confirmation: &CardConfirmation,
    ) -> Result<ConfirmOutcome, GatewayError> {
        self.confirmed.lock().unwrap().push(client_secret.to_string());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.confirms
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::Http("no scripted reply".to_string())))
    }

    async fn retrieve_intent(&self, client_secret: &str) -> Result<PaymentIntent, GatewayError> {
        let status = self
            .retrievals
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(IntentStatus::Processing);
        Ok(PaymentIntent {
            id: intent_id_from_secret(client_secret).unwrap_or_default(),
            status,
            amount: 0,
            currency: "usd".to_string(),
            client_secret: None,
            next_action: None,
        })
    }

    async fn redirect_to_checkout(&self, session_id: &str) -> Result<String, GatewayError> {
        Ok(format!("https://checkout.test/pay/{session_id}"))
    }
}

pub(crate) struct FakeProvider {
    gateway: Arc<FakeGateway>,
    keys: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn new(gateway: Arc<FakeGateway>) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            keys: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

impl GatewayProvider for FakeProvider {
    fn gateway_for(&self, publishable_key: &str) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(publishable_key.to_string());
        Ok(self.gateway.clone())
    }
}

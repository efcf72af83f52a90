// Checkout controller: owns one booking's checkout session state machine.
//
// Every network call is made outside the state lock. Results are applied only
// while the controller is live, so a response that lands after `unmount`
// never touches state or reaches subscribers.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::booking::BookingApi;
use crate::checkout::card_form::{
    CardForm, CardFormOutcome, ACTION_PENDING_MESSAGE, CANCELED_MESSAGE, FINALIZE_FAILED_MESSAGE,
};
use crate::checkout::state::{ActiveIntent, CheckoutState, ErrorKind, Navigation, Phase};
use crate::gateway::types::{BillingDetails, CardInput, IntentStatus};
use crate::gateway::{GatewayProvider, PaymentGateway};
use crate::settings::{CheckoutSettings, Config, RouteSettings};

const CHANNEL_CAPACITY: usize = 64;

pub const MISSING_REFERENCE_MESSAGE: &str = "Missing booking reference.";
pub const LOAD_FAILED_MESSAGE: &str = "Unable to load booking details.";
pub const INTENT_FAILED_MESSAGE: &str = "Unable to prepare payment. Please try again.";
pub const INTENT_TIMEOUT_MESSAGE: &str = "Preparing the payment took too long. Please try again.";
pub const GATEWAY_INIT_FAILED_MESSAGE: &str = "Payment form failed to load. Please refresh the page.";
pub const HOSTED_CHECKOUT_FAILED_MESSAGE: &str = "Unable to start checkout. Please try again.";
pub const TERMINAL_INTENT_MESSAGE: &str =
    "Your previous payment session expired. Creating a new payment intent...";
pub const PAYMENT_COMPLETED_NOTICE: &str = "Payment completed. Verifying your booking...";
pub const AWAITING_CONFIRMATION_NOTICE: &str =
    "Payment registered. Refresh this page if the status does not update soon.";
pub const FINALIZE_FAILED_FALLBACK: &str = "Unable to finalize payment.";
pub const PAYMENT_CAPTURED_NOTE: &str =
    "Your card was charged, so please do not pay again. Use retry to confirm your booking.";
pub const ACTION_REQUIRED_MESSAGE: &str = "Additional verification required. Check the Stripe modal.";
pub const ACTION_FAILED_MESSAGE: &str =
    "We could not authenticate your payment. Please try again or use a different card.";
pub const ACTION_TIMEOUT_MESSAGE: &str =
    "We have not heard back about your payment yet. Check your email before trying again.";

/// What a card submission led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Controller unmounted or the card form is not showing.
    Ignored,
    /// A confirmation is already running.
    InFlight,
    NotReady,
    Declined,
    /// The intent was terminal and a replacement was requested.
    IntentRefreshed,
    Unavailable,
    ActionRequired,
    Paid,
    AwaitingConfirmation,
    /// Charged at the gateway, booking not reconciled.
    FinalizeFailed,
    /// Refused: an earlier charge still awaits reconciliation via retry.
    PaymentCaptured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntentRequest {
    /// First request after the booking loads; skipped if an intent exists.
    Initial,
    /// User asked to try again.
    Retry,
    /// Replacement for a terminal intent; keeps the explanatory banner.
    Refresh,
}

enum IntentPlan {
    Skip,
    Hosted,
    Embedded(String),
}

enum SubmitGate {
    Reject(SubmitOutcome),
    Proceed(CardForm, Option<CardInput>),
}

pub struct CheckoutController {
    booking_ref: String,
    api: Arc<dyn BookingApi>,
    gateways: Arc<dyn GatewayProvider>,
    default_key: Option<String>,
    settings: CheckoutSettings,
    routes: RouteSettings,
    state: RwLock<CheckoutState>,
    // Gateway handle cached with the key it was built for.
    gateway: Mutex<Option<(String, Arc<dyn PaymentGateway>)>>,
    alive: AtomicBool,
    tx: broadcast::Sender<CheckoutState>,
}

impl CheckoutController {
    pub fn new(
        booking_ref: impl Into<String>,
        api: Arc<dyn BookingApi>,
        gateways: Arc<dyn GatewayProvider>,
        cfg: &Config,
    ) -> Arc<Self> {
        let booking_ref = booking_ref.into().trim().to_string();
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            state: RwLock::new(CheckoutState::new(booking_ref.clone())),
            booking_ref,
            api,
            gateways,
            default_key: cfg.default_publishable_key().map(str::to_string),
            settings: cfg.checkout.clone(),
            routes: cfg.routes.clone(),
            gateway: Mutex::new(None),
            alive: AtomicBool::new(true),
            tx,
        })
    }

    pub fn booking_ref(&self) -> &str {
        &self.booking_ref
    }

    pub fn routes(&self) -> &RouteSettings {
        &self.routes
    }

    pub fn is_live(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop applying results. In-flight calls finish but their results are dropped.
    pub fn unmount(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!(target: "checkout", booking_ref = %self.booking_ref, "checkout unmounted");
        }
    }

    pub async fn snapshot(&self) -> CheckoutState {
        self.state.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CheckoutState> {
        self.tx.subscribe()
    }

    fn publish(&self, st: &mut CheckoutState) {
        st.version += 1;
        // No subscribers is fine.
        let _ = self.tx.send(st.clone());
    }

    /// Apply `f` and broadcast, unless the controller has been unmounted.
    async fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut CheckoutState),
    {
        if !self.is_live() {
            return false;
        }
        let mut st = self.state.write().await;
        if !self.is_live() {
            return false;
        }
        f(&mut st);
        self.publish(&mut st);
        true
    }

    fn cached_gateway(&self) -> Option<Arc<dyn PaymentGateway>> {
        let guard = self.gateway.lock().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().map(|(_, g)| Arc::clone(g))
    }

    fn gateway_for(&self, key: &str) -> Result<Arc<dyn PaymentGateway>, crate::gateway::errors::GatewayError> {
        let mut guard = self.gateway.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((cached_key, gateway)) = guard.as_ref() {
            if cached_key == key {
                return Ok(Arc::clone(gateway));
            }
        }
        let gateway = self.gateways.gateway_for(key)?;
        *guard = Some((key.to_string(), Arc::clone(&gateway)));
        Ok(gateway)
    }

    /// Load the booking, then provision an intent or a hosted session.
    #[instrument(skip(self), fields(booking_ref = %self.booking_ref))]
    pub async fn mount(&self) -> Phase {
        self.load_booking().await;
        self.request_intent(IntentRequest::Initial).await;
        self.state.read().await.phase
    }

    async fn load_booking(&self) {
        if self.booking_ref.is_empty() {
            self.update(|st| {
                st.phase = Phase::LoadError;
                st.set_error(ErrorKind::MissingReference, MISSING_REFERENCE_MESSAGE);
            })
            .await;
            return;
        }

        let result = self.api.fetch_booking(&self.booking_ref).await;
        self.update(|st| match result {
            Ok(booking) => {
                if booking.is_paid() {
                    info!(target: "checkout", booking_ref = %self.booking_ref, "booking already paid");
                    st.phase = Phase::AlreadyPaid;
                } else {
                    st.publishable_key = booking
                        .publishable_key()
                        .map(str::to_string)
                        .or_else(|| self.default_key.clone());
                    st.phase = Phase::AwaitingIntent;
                }
                st.booking = Some(booking);
            }
            Err(e) => {
                warn!(target: "checkout", booking_ref = %self.booking_ref, error = %e, "booking load failed");
                st.phase = Phase::LoadError;
                if e.is_session_expired() {
                    st.set_error(ErrorKind::SessionExpired, e.user_message(LOAD_FAILED_MESSAGE));
                    st.navigation = Some(Navigation::login_for(&self.routes, &self.booking_ref));
                } else {
                    st.set_error(ErrorKind::LoadFailed, e.user_message(LOAD_FAILED_MESSAGE));
                }
            }
        })
        .await;
    }

    /// User-initiated retry: re-attempt reconciliation of a captured
    /// charge, otherwise provision a fresh intent or hosted session.
    #[instrument(skip(self), fields(booking_ref = %self.booking_ref))]
    pub async fn retry(&self) -> Phase {
        let captured = {
            let mut st = self.state.write().await;
            match st.captured_intent_id.clone() {
                Some(id) if self.is_live() && !st.card.processing => {
                    st.card.processing = true;
                    st.clear_error();
                    self.publish(&mut st);
                    Some(id)
                }
                _ => None,
            }
        };
        match captured {
            Some(intent_id) => {
                self.complete_payment(&intent_id).await;
            }
            None => self.request_intent(IntentRequest::Retry).await,
        }
        self.state.read().await.phase
    }

    /// Decide under the lock whether a request may start, so two callers
    /// can never both issue one.
    async fn plan_intent_request(&self, request: IntentRequest) -> IntentPlan {
        let mut st = self.state.write().await;
        if !self.is_live() || st.booking.is_none() {
            return IntentPlan::Skip;
        }
        let phase_ok = match request {
            IntentRequest::Initial | IntentRequest::Refresh => st.phase == Phase::AwaitingIntent,
            IntentRequest::Retry => matches!(
                st.phase,
                Phase::AwaitingIntent | Phase::IntentError | Phase::HostedCheckoutRedirect
            ),
        };
        if !phase_ok
            || st.intent_loading
            || st.checkout_loading
            || st.card.processing
            || st.payment_captured()
            || (request == IntentRequest::Initial && st.intent.is_some())
        {
            return IntentPlan::Skip;
        }
        if request != IntentRequest::Refresh {
            st.clear_error();
        }
        st.notice = None;
        st.navigation = None;
        let plan = match st.publishable_key.clone() {
            None => {
                st.checkout_loading = true;
                st.phase = Phase::HostedCheckoutRedirect;
                IntentPlan::Hosted
            }
            Some(key) => {
                st.intent_loading = true;
                st.phase = Phase::AwaitingIntent;
                st.discard_intent();
                IntentPlan::Embedded(key)
            }
        };
        self.publish(&mut st);
        plan
    }

    async fn request_intent(&self, request: IntentRequest) {
        match self.plan_intent_request(request).await {
            IntentPlan::Skip => {}
            IntentPlan::Hosted => self.start_hosted_checkout().await,
            IntentPlan::Embedded(key) => self.provision_intent(&key, request).await,
        }
    }

    async fn provision_intent(&self, key: &str, request: IntentRequest) {
        if let Err(e) = self.gateway_for(key) {
            warn!(target: "checkout", booking_ref = %self.booking_ref, error = %e, "gateway init failed");
            self.update(|st| {
                st.intent_loading = false;
                st.phase = Phase::IntentError;
                st.set_error(ErrorKind::IntentProvisioning, GATEWAY_INIT_FAILED_MESSAGE);
            })
            .await;
            return;
        }

        info!(target: "checkout", booking_ref = %self.booking_ref, ?request, "requesting payment intent");
        crate::checkout_counter_inc!("checkout.intent.requested", "reason" => format!("{request:?}"));
        let result = timeout(
            self.settings.intent_timeout,
            self.api.create_payment_intent(&self.booking_ref),
        )
        .await;

        self.update(|st| {
            st.intent_loading = false;
            match result {
                Ok(Ok(grant)) if !grant.client_secret.trim().is_empty() => {
                    let intent = ActiveIntent::from_grant(grant);
                    info!(
                        target: "checkout",
                        booking_ref = %self.booking_ref,
                        intent_id = intent.intent_id.as_deref().unwrap_or(""),
                        "payment intent ready"
                    );
                    st.intent = Some(intent);
                    st.card.mounted = true;
                    st.card.card_error = None;
                    st.phase = Phase::ReadyForCardEntry;
                }
                Ok(Ok(_)) => {
                    warn!(target: "checkout", booking_ref = %self.booking_ref, "intent response missing client secret");
                    st.phase = Phase::IntentError;
                    st.set_error(ErrorKind::IntentProvisioning, INTENT_FAILED_MESSAGE);
                }
                Ok(Err(e)) => {
                    warn!(target: "checkout", booking_ref = %self.booking_ref, error = %e, "intent request failed");
                    st.phase = Phase::IntentError;
                    if e.is_session_expired() {
                        st.set_error(ErrorKind::SessionExpired, e.user_message(INTENT_FAILED_MESSAGE));
                        st.navigation = Some(Navigation::login_for(&self.routes, &self.booking_ref));
                    } else {
                        st.set_error(ErrorKind::IntentProvisioning, e.user_message(INTENT_FAILED_MESSAGE));
                    }
                }
                Err(_) => {
                    warn!(target: "checkout", booking_ref = %self.booking_ref, "intent request timed out");
                    st.phase = Phase::IntentError;
                    st.set_error(ErrorKind::Timeout, INTENT_TIMEOUT_MESSAGE);
                }
            }
        })
        .await;
    }

    async fn start_hosted_checkout(&self) {
        info!(target: "checkout", booking_ref = %self.booking_ref, "starting hosted checkout");
        crate::checkout_counter_inc!("checkout.hosted.requested");
        let result = timeout(
            self.settings.intent_timeout,
            self.api.create_checkout_session(&self.booking_ref),
        )
        .await;
        if !self.is_live() {
            return;
        }

        let destination: Result<String, String> = match result {
            Ok(Ok(session)) => {
                let session_id = session.session_id.filter(|s| !s.trim().is_empty());
                let url = session.url.filter(|u| !u.trim().is_empty());
                match (self.cached_gateway(), session_id, url) {
                    (Some(gateway), Some(session_id), _) => gateway
                        .redirect_to_checkout(&session_id)
                        .await
                        .map_err(|e| {
                            warn!(target: "checkout", error = %e, "gateway redirect failed");
                            HOSTED_CHECKOUT_FAILED_MESSAGE.to_string()
                        }),
                    (_, _, Some(url)) => Ok(url),
                    _ => Err(HOSTED_CHECKOUT_FAILED_MESSAGE.to_string()),
                }
            }
            Ok(Err(e)) => {
                warn!(target: "checkout", booking_ref = %self.booking_ref, error = %e, "checkout session failed");
                Err(e.user_message(HOSTED_CHECKOUT_FAILED_MESSAGE))
            }
            Err(_) => Err(HOSTED_CHECKOUT_FAILED_MESSAGE.to_string()),
        };

        self.update(|st| {
            st.checkout_loading = false;
            match destination {
                Ok(url) => st.navigation = Some(Navigation::External { url }),
                Err(message) => st.set_error(ErrorKind::HostedCheckout, message),
            }
        })
        .await;
    }

    /// Inline card-field validation result; `None` clears card errors.
    pub async fn report_card_validation(&self, error: Option<String>) {
        let error = error.filter(|e| !e.trim().is_empty());
        let mut st = self.state.write().await;
        // The captured-payment banner outranks field validation.
        if !self.is_live() || st.payment_captured() {
            return;
        }
        st.card.card_error = error.clone();
        match error {
            Some(message) => st.set_error(ErrorKind::CardValidation, message),
            None => {
                let clearable = st.error.as_ref().map(|b| {
                    matches!(
                        b.kind,
                        ErrorKind::CardValidation | ErrorKind::CardDeclined | ErrorKind::GatewayUnavailable
                    )
                });
                if clearable == Some(true) {
                    st.clear_error();
                }
            }
        }
        self.publish(&mut st);
    }

    async fn gate_submission(&self, card: Option<CardInput>) -> SubmitGate {
        let mut st = self.state.write().await;
        if !self.is_live() || st.phase != Phase::ReadyForCardEntry || !st.card.mounted {
            return SubmitGate::Reject(SubmitOutcome::Ignored);
        }
        if st.card.processing || st.intent_loading {
            return SubmitGate::Reject(SubmitOutcome::InFlight);
        }
        if st.payment_captured() {
            warn!(
                target: "checkout",
                booking_ref = %self.booking_ref,
                intent_id = st.captured_intent_id.as_deref().unwrap_or_default(),
                "card submission refused, captured payment not reconciled"
            );
            return SubmitGate::Reject(SubmitOutcome::PaymentCaptured);
        }
        let billing = st
            .booking
            .as_ref()
            .map(|b| BillingDetails {
                name: b.lead_name.clone(),
                email: b.lead_email.clone(),
            })
            .unwrap_or_default();
        let form = CardForm::new(
            self.cached_gateway(),
            st.intent.clone(),
            billing,
            self.settings.confirm_timeout,
        );
        if let Err(message) = form.check_ready(card.as_ref()) {
            st.card.card_error = Some(message);
            self.publish(&mut st);
            return SubmitGate::Reject(SubmitOutcome::NotReady);
        }
        st.card.processing = true;
        st.card.card_error = None;
        st.awaiting_action = false;
        st.next_action = None;
        st.clear_error();
        st.notice = None;
        self.publish(&mut st);
        SubmitGate::Proceed(form, card)
    }

    /// Confirm the card against the current intent. At most one
    /// confirmation runs at a time.
    #[instrument(skip(self, card), fields(booking_ref = %self.booking_ref))]
    pub async fn submit_card(self: &Arc<Self>, card: Option<CardInput>) -> SubmitOutcome {
        let (form, card) = match self.gate_submission(card).await {
            SubmitGate::Reject(outcome) => return outcome,
            SubmitGate::Proceed(form, card) => (form, card),
        };

        crate::checkout_counter_inc!("checkout.confirm.attempted");
        let outcome = form.confirm(card).await;
        if !self.is_live() {
            return SubmitOutcome::Ignored;
        }

        match outcome {
            CardFormOutcome::NotReady(message) => {
                self.update(|st| {
                    st.card.processing = false;
                    st.card.card_error = Some(message);
                })
                .await;
                SubmitOutcome::NotReady
            }
            CardFormOutcome::Declined { message, terminal: true } => {
                crate::checkout_counter_inc!("checkout.intent.terminal");
                self.replace_terminal_intent(message).await;
                SubmitOutcome::IntentRefreshed
            }
            CardFormOutcome::Declined { message, terminal: false } => {
                crate::checkout_counter_inc!("checkout.confirm.declined");
                self.update(|st| {
                    st.card.processing = false;
                    st.card.card_error = Some(message.clone());
                    st.set_error(ErrorKind::CardDeclined, message);
                })
                .await;
                SubmitOutcome::Declined
            }
            CardFormOutcome::Unavailable(message) => {
                self.update(|st| {
                    st.card.processing = false;
                    st.card.card_error = Some(message.clone());
                    st.set_error(ErrorKind::GatewayUnavailable, message);
                })
                .await;
                SubmitOutcome::Unavailable
            }
            CardFormOutcome::Pending(pi) => {
                info!(target: "checkout", booking_ref = %self.booking_ref, status = ?pi.status, "payment needs further action");
                self.update(|st| {
                    st.card.processing = false;
                    st.awaiting_action = true;
                    st.next_action = pi.next_action.clone();
                    st.card.card_error = Some(ACTION_PENDING_MESSAGE.to_string());
                    st.set_error(ErrorKind::ActionRequired, ACTION_REQUIRED_MESSAGE);
                })
                .await;
                tokio::spawn(Arc::clone(self).watch_pending_action());
                SubmitOutcome::ActionRequired
            }
            CardFormOutcome::Succeeded(pi) => {
                crate::checkout_counter_inc!("checkout.confirm.succeeded");
                let intent_id = if pi.id.is_empty() {
                    self.state
                        .read()
                        .await
                        .intent
                        .as_ref()
                        .and_then(|i| i.intent_id.clone())
                        .unwrap_or_default()
                } else {
                    pi.id.clone()
                };
                self.update(|st| {
                    st.notice = Some(PAYMENT_COMPLETED_NOTICE.to_string());
                })
                .await;
                self.complete_payment(&intent_id).await
            }
        }
    }

    /// Drop the terminal intent and request exactly one replacement.
    async fn replace_terminal_intent(&self, card_error: String) {
        info!(target: "checkout", booking_ref = %self.booking_ref, "intent is terminal, replacing");
        let applied = self
            .update(|st| {
                st.card.processing = false;
                st.card.card_error = Some(card_error);
                st.discard_intent();
                st.phase = Phase::AwaitingIntent;
                st.set_error(ErrorKind::TerminalIntent, TERMINAL_INTENT_MESSAGE);
            })
            .await;
        if applied {
            self.request_intent(IntentRequest::Refresh).await;
        }
    }

    /// Record a successful charge with the backend, then re-read the booking.
    /// Expects `card.processing` to be set by the caller.
    async fn complete_payment(&self, intent_id: &str) -> SubmitOutcome {
        info!(target: "checkout", booking_ref = %self.booking_ref, intent_id, "finalizing payment");
        let result = timeout(
            self.settings.finalize_timeout,
            self.api.finalize_payment(&self.booking_ref, intent_id),
        )
        .await;

        let failure = match result {
            Ok(Ok(_ack)) => None,
            Ok(Err(e)) => {
                warn!(target: "checkout", booking_ref = %self.booking_ref, intent_id, error = %e, "finalize failed");
                Some(e.user_message(FINALIZE_FAILED_FALLBACK))
            }
            Err(_) => {
                warn!(target: "checkout", booking_ref = %self.booking_ref, intent_id, "finalize timed out");
                Some(FINALIZE_FAILED_FALLBACK.to_string())
            }
        };

        if let Some(message) = failure {
            crate::checkout_counter_inc!("checkout.finalize.failed");
            let intent_id = intent_id.to_string();
            if !self
                .update(|st| {
                    st.card.processing = false;
                    st.captured_intent_id = Some(intent_id);
                    st.notice = None;
                    st.card.card_error = Some(FINALIZE_FAILED_MESSAGE.to_string());
                    st.set_error(ErrorKind::FinalizePending, format!("{message} {PAYMENT_CAPTURED_NOTE}"));
                })
                .await
            {
                return SubmitOutcome::Ignored;
            }
            return SubmitOutcome::FinalizeFailed;
        }

        self.update(|st| st.captured_intent_id = None).await;
        self.reconcile_booking().await
    }

    async fn reconcile_booking(&self) -> SubmitOutcome {
        let fetched = self.api.fetch_booking(&self.booking_ref).await;
        let mut outcome = SubmitOutcome::AwaitingConfirmation;
        let applied = self
            .update(|st| {
                st.card.processing = false;
                match fetched {
                    Ok(booking) if booking.is_paid() => {
                        info!(target: "checkout", booking_ref = %self.booking_ref, "booking confirmed paid");
                        st.booking = Some(booking);
                        st.discard_intent();
                        st.phase = Phase::AlreadyPaid;
                        st.notice = None;
                        st.clear_error();
                        st.navigation = Some(Navigation::success_for(&self.routes, &self.booking_ref));
                        outcome = SubmitOutcome::Paid;
                    }
                    Ok(booking) => {
                        st.booking = Some(booking);
                        st.card.mounted = false;
                        st.notice = Some(AWAITING_CONFIRMATION_NOTICE.to_string());
                    }
                    Err(e) => {
                        warn!(target: "checkout", booking_ref = %self.booking_ref, error = %e, "post-payment refetch failed");
                        st.card.mounted = false;
                        st.notice = Some(AWAITING_CONFIRMATION_NOTICE.to_string());
                        if e.is_session_expired() {
                            st.navigation = Some(Navigation::login_for(&self.routes, &self.booking_ref));
                        }
                    }
                }
            })
            .await;
        if applied {
            outcome
        } else {
            SubmitOutcome::Ignored
        }
    }

    /// Poll the intent while the customer completes a gateway challenge,
    /// bounded by the action timeout.
    async fn watch_pending_action(self: Arc<Self>) {
        let secret = match self.state.read().await.intent.as_ref() {
            Some(intent) => intent.client_secret.clone(),
            None => return,
        };
        let Some(gateway) = self.cached_gateway() else {
            return;
        };
        let started = Instant::now();

        loop {
            sleep(self.settings.action_poll_interval).await;
            if !self.is_live() {
                return;
            }
            {
                let st = self.state.read().await;
                let same_intent = st.intent.as_ref().map(|i| i.client_secret == secret).unwrap_or(false);
                if !st.awaiting_action || !same_intent {
                    return;
                }
            }

            match timeout(self.settings.confirm_timeout, gateway.retrieve_intent(&secret)).await {
                Ok(Ok(pi)) => match pi.status {
                    IntentStatus::Succeeded => {
                        let claimed = {
                            let mut st = self.state.write().await;
                            if self.is_live() && st.awaiting_action && !st.card.processing {
                                st.awaiting_action = false;
                                st.next_action = None;
                                st.card.processing = true;
                                st.card.card_error = None;
                                st.clear_error();
                                st.notice = Some(PAYMENT_COMPLETED_NOTICE.to_string());
                                self.publish(&mut st);
                                true
                            } else {
                                false
                            }
                        };
                        if claimed {
                            self.complete_payment(&pi.id).await;
                        }
                        return;
                    }
                    IntentStatus::RequiresPaymentMethod => {
                        self.update(|st| {
                            st.awaiting_action = false;
                            st.next_action = None;
                            st.card.card_error = Some(ACTION_FAILED_MESSAGE.to_string());
                            st.set_error(ErrorKind::CardDeclined, ACTION_FAILED_MESSAGE);
                        })
                        .await;
                        return;
                    }
                    IntentStatus::Canceled => {
                        self.replace_terminal_intent(CANCELED_MESSAGE.to_string()).await;
                        return;
                    }
                    other => debug!(target: "checkout", status = ?other, "intent still pending"),
                },
                Ok(Err(e)) => warn!(target: "checkout", error = %e, "intent status poll failed"),
                Err(_) => warn!(target: "checkout", "intent status poll timed out"),
            }

            if started.elapsed() >= self.settings.action_timeout {
                warn!(target: "checkout", booking_ref = %self.booking_ref, "gave up waiting for payment action");
                self.update(|st| {
                    st.awaiting_action = false;
                    st.next_action = None;
                    st.card.card_error = None;
                    st.set_error(ErrorKind::Timeout, ACTION_TIMEOUT_MESSAGE);
                })
                .await;
                return;
            }
        }
    }
}

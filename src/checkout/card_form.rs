// Card payment form: readiness checks, confirmation against the gateway,
// and classification of the gateway's answer into a typed outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::checkout::state::ActiveIntent;
use crate::gateway::errors::GatewayError;
use crate::gateway::types::{BillingDetails, CardConfirmation, CardInput, ConfirmOutcome, IntentStatus, PaymentIntent};
use crate::gateway::PaymentGateway;

pub const GATEWAY_LOADING_MESSAGE: &str = "Stripe is still loading. Please wait a moment.";
pub const CARD_NOT_READY_MESSAGE: &str = "Card details are not ready. Please refresh the page.";
pub const PAYMENT_FAILED_MESSAGE: &str = "Payment could not be completed.";
pub const FINALIZE_FAILED_MESSAGE: &str = "Payment completed but finalizing failed.";
pub const ACTION_PENDING_MESSAGE: &str =
    "We are processing your payment. Please follow any additional prompts from Stripe.";
pub const GATEWAY_UNAVAILABLE_MESSAGE: &str = "Payment could not be completed. Please try again.";
pub const CONFIRM_TIMEOUT_MESSAGE: &str =
    "The payment provider did not respond in time. Check your email for a receipt before trying again.";
pub const CANCELED_MESSAGE: &str = "This payment session was canceled.";

/// What a confirmation attempt amounted to.
#[derive(Debug, Clone)]
pub enum CardFormOutcome {
    /// Nothing was sent to the gateway.
    NotReady(String),
    /// The gateway refused. `terminal` means the intent must be replaced.
    Declined { message: String, terminal: bool },
    Succeeded(PaymentIntent),
    /// Further customer action (3-D Secure or similar) or settlement pending.
    Pending(PaymentIntent),
    /// Transport failure or timeout; the charge state is unknown.
    Unavailable(String),
}

/// One card form, bound to the intent it was mounted for.
pub struct CardForm {
    gateway: Option<Arc<dyn PaymentGateway>>,
    intent: Option<ActiveIntent>,
    billing: BillingDetails,
    confirm_timeout: Duration,
}

impl CardForm {
    pub fn new(
        gateway: Option<Arc<dyn PaymentGateway>>,
        intent: Option<ActiveIntent>,
        billing: BillingDetails,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            intent,
            billing,
            confirm_timeout,
        }
    }

    /// Submit is possible only with a gateway handle, a client secret and card data.
    pub fn check_ready(&self, card: Option<&CardInput>) -> Result<(), String> {
        if self.gateway.is_none() || self.intent.is_none() {
            return Err(GATEWAY_LOADING_MESSAGE.to_string());
        }
        match card {
            Some(card) if !card.is_blank() => Ok(()),
            _ => Err(CARD_NOT_READY_MESSAGE.to_string()),
        }
    }

    pub async fn confirm(&self, card: Option<CardInput>) -> CardFormOutcome {
        if let Err(message) = self.check_ready(card.as_ref()) {
            return CardFormOutcome::NotReady(message);
        }
        let (Some(gateway), Some(intent), Some(card)) = (&self.gateway, &self.intent, card) else {
            return CardFormOutcome::NotReady(GATEWAY_LOADING_MESSAGE.to_string());
        };

        let confirmation = CardConfirmation {
            card,
            billing: self.billing.clone(),
        };
        let started = Instant::now();
        let result = timeout(
            self.confirm_timeout,
            gateway.confirm_card_payment(&intent.client_secret, &confirmation),
        )
        .await;
        crate::checkout_histogram_observe_ms!(
            "checkout.confirm.latency_ms",
            started.elapsed().as_millis() as u64
        );

        match result {
            Ok(Ok(outcome)) => Self::classify(outcome),
            Ok(Err(GatewayError::Precondition(reason))) => {
                warn!(target: "checkout", reason, "card confirmation precondition failed");
                CardFormOutcome::NotReady(CARD_NOT_READY_MESSAGE.to_string())
            }
            Ok(Err(e)) => {
                warn!(target: "checkout", error = %e, "card confirmation transport failure");
                CardFormOutcome::Unavailable(GATEWAY_UNAVAILABLE_MESSAGE.to_string())
            }
            Err(_) => {
                warn!(
                    target: "checkout",
                    timeout_ms = self.confirm_timeout.as_millis() as u64,
                    "card confirmation timed out"
                );
                CardFormOutcome::Unavailable(CONFIRM_TIMEOUT_MESSAGE.to_string())
            }
        }
    }

    pub fn classify(outcome: ConfirmOutcome) -> CardFormOutcome {
        match outcome {
            ConfirmOutcome::Failed(details) => {
                let terminal = details.is_terminal_intent();
                info!(
                    target: "checkout",
                    code = details.code.as_deref().unwrap_or(""),
                    decline_code = details.decline_code.as_deref().unwrap_or(""),
                    terminal,
                    "card confirmation declined"
                );
                CardFormOutcome::Declined {
                    message: details.message_or(PAYMENT_FAILED_MESSAGE),
                    terminal,
                }
            }
            ConfirmOutcome::Confirmed(pi) => match pi.status {
                IntentStatus::Succeeded => CardFormOutcome::Succeeded(pi),
                IntentStatus::Canceled => CardFormOutcome::Declined {
                    message: CANCELED_MESSAGE.to_string(),
                    terminal: true,
                },
                IntentStatus::RequiresPaymentMethod => CardFormOutcome::Declined {
                    message: PAYMENT_FAILED_MESSAGE.to_string(),
                    terminal: false,
                },
                _ => CardFormOutcome::Pending(pi),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::errors::{GatewayErrorDetails, GatewayErrorType};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn intent(status: IntentStatus) -> PaymentIntent {
        PaymentIntent {
            id: "pi_1".into(),
            status,
            amount: 1000,
            currency: "usd".into(),
            client_secret: None,
            next_action: None,
        }
    }

    struct ScriptedGateway {
        reply: Mutex<Option<Result<ConfirmOutcome, GatewayError>>>,
        delay: Duration,
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn confirm_card_payment(
            &self,
            _client_secret: &str,
            _confirmation: &CardConfirmation,
        ) -> Result<ConfirmOutcome, GatewayError> {
            tokio::time::sleep(self.delay).await;
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(GatewayError::Http("exhausted".into())))
        }

        async fn retrieve_intent(&self, _client_secret: &str) -> Result<PaymentIntent, GatewayError> {
            Ok(intent(IntentStatus::Processing))
        }

        async fn redirect_to_checkout(&self, session_id: &str) -> Result<String, GatewayError> {
            Ok(format!("https://pay.test/{session_id}"))
        }
    }

    fn form(reply: Result<ConfirmOutcome, GatewayError>, delay: Duration) -> CardForm {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(ScriptedGateway {
            reply: Mutex::new(Some(reply)),
            delay,
        });
        CardForm::new(
            Some(gateway),
            Some(ActiveIntent::from_secret("pi_1_secret_x")),
            BillingDetails::default(),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn test_not_ready_without_gateway() {
        let form = CardForm::new(None, None, BillingDetails::default(), Duration::from_secs(1));
        assert_eq!(
            form.check_ready(Some(&CardInput::PaymentMethod("pm_1".into()))),
            Err(GATEWAY_LOADING_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_not_ready_without_card() {
        let form = form(Ok(ConfirmOutcome::Confirmed(intent(IntentStatus::Succeeded))), Duration::ZERO);
        assert_eq!(form.check_ready(None), Err(CARD_NOT_READY_MESSAGE.to_string()));
        assert_eq!(
            form.check_ready(Some(&CardInput::CardToken(" ".into()))),
            Err(CARD_NOT_READY_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_classify_terminal_decline() {
        let details = GatewayErrorDetails::new(
            GatewayErrorType::InvalidRequestError,
            Some("payment_intent_unexpected_state"),
            Some("This PaymentIntent's status is succeeded."),
        );
        match CardForm::classify(ConfirmOutcome::Failed(details)) {
            CardFormOutcome::Declined { terminal, .. } => assert!(terminal),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_classify_decline_without_message_uses_fallback() {
        let details = GatewayErrorDetails::new(GatewayErrorType::CardError, Some("card_declined"), None);
        match CardForm::classify(ConfirmOutcome::Failed(details)) {
            CardFormOutcome::Declined { message, terminal } => {
                assert_eq!(message, PAYMENT_FAILED_MESSAGE);
                assert!(!terminal);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_classify_requires_action_is_pending() {
        assert!(matches!(
            CardForm::classify(ConfirmOutcome::Confirmed(intent(IntentStatus::RequiresAction))),
            CardFormOutcome::Pending(_)
        ));
        assert!(matches!(
            CardForm::classify(ConfirmOutcome::Confirmed(intent(IntentStatus::Processing))),
            CardFormOutcome::Pending(_)
        ));
    }

    #[tokio::test]
    async fn test_confirm_succeeds() {
        let form = form(Ok(ConfirmOutcome::Confirmed(intent(IntentStatus::Succeeded))), Duration::ZERO);
        let outcome = form.confirm(Some(CardInput::PaymentMethod("pm_1".into()))).await;
        assert!(matches!(outcome, CardFormOutcome::Succeeded(pi) if pi.id == "pi_1"));
    }

    #[tokio::test]
    async fn test_confirm_timeout_is_unavailable() {
        let form = form(
            Ok(ConfirmOutcome::Confirmed(intent(IntentStatus::Succeeded))),
            Duration::from_secs(5),
        );
        let outcome = form.confirm(Some(CardInput::PaymentMethod("pm_1".into()))).await;
        assert!(matches!(outcome, CardFormOutcome::Unavailable(msg) if msg == CONFIRM_TIMEOUT_MESSAGE));
    }

    #[tokio::test]
    async fn test_transport_error_is_unavailable() {
        let form = form(Err(GatewayError::Http("connection reset".into())), Duration::ZERO);
        let outcome = form.confirm(Some(CardInput::PaymentMethod("pm_1".into()))).await;
        assert!(matches!(outcome, CardFormOutcome::Unavailable(_)));
    }
}

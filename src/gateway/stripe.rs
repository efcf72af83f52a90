// Stripe client-side REST calls, authenticated with a publishable key
// and scoped to a single intent by its client secret.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{info, instrument};

use crate::booking::types::intent_id_from_secret;
use crate::gateway::errors::{GatewayError, GatewayErrorDetails, GatewayErrorEnvelope};
use crate::gateway::types::{CardConfirmation, CardInput, ConfirmOutcome, PaymentIntent};
use crate::gateway::PaymentGateway;

#[derive(Clone)]
pub struct StripeGateway {
    pub(crate) http: Client,
    pub(crate) publishable_key: String,
    pub(crate) api_base: String,
    pub(crate) checkout_base_url: String,
}

impl StripeGateway {
    pub fn new(http: Client, publishable_key: impl Into<String>) -> Self {
        Self {
            http,
            publishable_key: publishable_key.into(),
            api_base: "https://api.stripe.com".to_string(),
            checkout_base_url: "https://checkout.stripe.com/c/pay".to_string(),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_checkout_base_url(mut self, base: impl Into<String>) -> Self {
        self.checkout_base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    fn intent_id(client_secret: &str) -> Result<String, GatewayError> {
        intent_id_from_secret(client_secret)
            .ok_or(GatewayError::Precondition("client secret does not name a payment intent"))
    }

    fn confirm_form(client_secret: &str, confirmation: &CardConfirmation) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = vec![("client_secret".into(), client_secret.to_string())];
        match &confirmation.card {
            CardInput::PaymentMethod(pm) => {
                form.push(("payment_method".into(), pm.clone()));
            }
            CardInput::CardToken(token) => {
                form.push(("payment_method_data[type]".into(), "card".into()));
                form.push(("payment_method_data[card][token]".into(), token.clone()));
                if !confirmation.billing.name.is_empty() {
                    form.push((
                        "payment_method_data[billing_details][name]".into(),
                        confirmation.billing.name.clone(),
                    ));
                }
                if !confirmation.billing.email.is_empty() {
                    form.push((
                        "payment_method_data[billing_details][email]".into(),
                        confirmation.billing.email.clone(),
                    ));
                }
            }
        }
        form
    }

    /// Error envelopes are in-band outcomes; anything else non-2xx is a transport failure.
    fn map_response(status: StatusCode, body: &str) -> Result<ConfirmOutcome, GatewayError> {
        if status.is_success() {
            return serde_json::from_str::<PaymentIntent>(body)
                .map(ConfirmOutcome::Confirmed)
                .map_err(|e| GatewayError::Decode(e.to_string()));
        }
        match serde_json::from_str::<GatewayErrorEnvelope>(body) {
            Ok(env) => Ok(ConfirmOutcome::Failed(GatewayErrorDetails::from(env))),
            Err(_) => Err(GatewayError::Http(format!("status={} body={}", status.as_u16(), body))),
        }
    }

    // POST /v1/payment_intents/{id}/confirm
    #[instrument(skip_all, fields(method = "POST", path = "/v1/payment_intents/{id}/confirm"))]
    pub async fn confirm_card_payment(
        &self,
        client_secret: &str,
        confirmation: &CardConfirmation,
    ) -> Result<ConfirmOutcome, GatewayError> {
        let intent_id = Self::intent_id(client_secret)?;
        let form = Self::confirm_form(client_secret, confirmation);

        info!(target: "stripe", method = "POST", intent_id = %intent_id, "stripe confirm request");

        let url = format!("{}/v1/payment_intents/{}/confirm", self.api_base, intent_id);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.publishable_key)
            .form(&form)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| GatewayError::Decode(e.to_string()))?;
        Self::map_response(status, &text)
    }

    // GET /v1/payment_intents/{id}?client_secret=...
    #[instrument(skip_all, fields(method = "GET", path = "/v1/payment_intents/{id}"))]
    pub async fn retrieve_intent(&self, client_secret: &str) -> Result<PaymentIntent, GatewayError> {
        let intent_id = Self::intent_id(client_secret)?;
        info!(target: "stripe", method = "GET", intent_id = %intent_id, "stripe retrieve request");

        let url = format!("{}/v1/payment_intents/{}", self.api_base, intent_id);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.publishable_key)
            .query(&[("client_secret", client_secret)])
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| GatewayError::Decode(e.to_string()))?;
        match Self::map_response(status, &text)? {
            ConfirmOutcome::Confirmed(pi) => Ok(pi),
            ConfirmOutcome::Failed(details) => Err(GatewayError::Rejected(
                details.message_or("Unable to retrieve payment status."),
            )),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        confirmation: &CardConfirmation,
    ) -> Result<ConfirmOutcome, GatewayError> {
        StripeGateway::confirm_card_payment(self, client_secret, confirmation).await
    }

    async fn retrieve_intent(&self, client_secret: &str) -> Result<PaymentIntent, GatewayError> {
        StripeGateway::retrieve_intent(self, client_secret).await
    }

    async fn redirect_to_checkout(&self, session_id: &str) -> Result<String, GatewayError> {
        if session_id.trim().is_empty() {
            return Err(GatewayError::Precondition("checkout session id required"));
        }
        Ok(format!("{}/{}", self.checkout_base_url, session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::errors::GatewayErrorType;
    use crate::gateway::types::{BillingDetails, IntentStatus};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> StripeGateway {
        StripeGateway::new(Client::new(), "pk_test_123").with_api_base(server.uri())
    }

    fn confirmation(card: CardInput) -> CardConfirmation {
        CardConfirmation {
            card,
            billing: BillingDetails {
                name: "Sam Rai".into(),
                email: "sam@example.com".into(),
            },
        }
    }

    #[test]
    fn test_token_confirmation_carries_billing_details() {
        let form = StripeGateway::confirm_form("pi_1_secret_2", &confirmation(CardInput::CardToken("tok_visa".into())));
        assert!(form.contains(&("payment_method_data[card][token]".into(), "tok_visa".into())));
        assert!(form.contains(&("payment_method_data[billing_details][email]".into(), "sam@example.com".into())));
    }

    #[tokio::test]
    async fn test_confirm_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents/pi_1/confirm"))
            .and(header("authorization", "Bearer pk_test_123"))
            .and(body_string_contains("payment_method=pm_card_visa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_1", "status": "succeeded", "amount": 24500, "currency": "usd"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = gateway(&server)
            .confirm_card_payment("pi_1_secret_abc", &confirmation(CardInput::PaymentMethod("pm_card_visa".into())))
            .await
            .unwrap();
        match outcome {
            ConfirmOutcome::Confirmed(pi) => assert_eq!(pi.status, IntentStatus::Succeeded),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_confirm_error_envelope_is_in_band() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "type": "invalid_request_error",
                    "code": "payment_intent_unexpected_state",
                    "message": "This PaymentIntent's status is succeeded."
                }
            })))
            .mount(&server)
            .await;

        let outcome = gateway(&server)
            .confirm_card_payment("pi_1_secret_abc", &confirmation(CardInput::PaymentMethod("pm_x".into())))
            .await
            .unwrap();
        match outcome {
            ConfirmOutcome::Failed(details) => {
                assert_eq!(details.type_, GatewayErrorType::InvalidRequestError);
                assert!(details.is_terminal_intent());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_confirm_rejects_malformed_secret_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = gateway(&server)
            .confirm_card_payment("cs_test_abc", &confirmation(CardInput::PaymentMethod("pm_x".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_retrieve_intent_passes_client_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_9"))
            .and(query_param("client_secret", "pi_9_secret_z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_9", "status": "processing"
            })))
            .mount(&server)
            .await;

        let pi = gateway(&server).retrieve_intent("pi_9_secret_z").await.unwrap();
        assert_eq!(pi.status, IntentStatus::Processing);
    }

    #[tokio::test]
    async fn test_redirect_builds_hosted_url() {
        let gw = StripeGateway::new(Client::new(), "pk").with_checkout_base_url("https://pay.example.com/c/");
        assert_eq!(
            gw.redirect_to_checkout("cs_live_1").await.unwrap(),
            "https://pay.example.com/c/cs_live_1"
        );
        assert!(gw.redirect_to_checkout("").await.is_err());
    }
}

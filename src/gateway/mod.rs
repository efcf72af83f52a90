// Payment gateway abstraction and the Stripe-backed provider

pub mod errors;
pub mod stripe;
pub mod types;

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use crate::settings::StripeSettings;
use self::errors::GatewayError;
use self::stripe::StripeGateway;
use self::types::{CardConfirmation, ConfirmOutcome, PaymentIntent};

/// Client-side gateway handle, bound to one publishable key.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        confirmation: &CardConfirmation,
    ) -> Result<ConfirmOutcome, GatewayError>;

    async fn retrieve_intent(&self, client_secret: &str) -> Result<PaymentIntent, GatewayError>;

    /// Resolve a hosted checkout session to the URL the browser should open.
    async fn redirect_to_checkout(&self, session_id: &str) -> Result<String, GatewayError>;
}

/// Builds gateway handles for whichever publishable key is in effect.
pub trait GatewayProvider: Send + Sync {
    fn gateway_for(&self, publishable_key: &str) -> Result<Arc<dyn PaymentGateway>, GatewayError>;
}

#[derive(Clone)]
pub struct StripeGatewayProvider {
    pub(crate) http: Client,
    pub(crate) cfg: StripeSettings,
}

impl StripeGatewayProvider {
    // Build reqwest client with rustls and timeout from cfg.
    pub fn new(cfg: StripeSettings) -> Result<Self, GatewayError> {
        let timeout = std::time::Duration::from_millis(if cfg.timeout_ms > 0 { cfg.timeout_ms } else { 15_000 });
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        Ok(Self { http, cfg })
    }
}

impl GatewayProvider for StripeGatewayProvider {
    fn gateway_for(&self, publishable_key: &str) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        if publishable_key.trim().is_empty() {
            return Err(GatewayError::Precondition("publishable key required"));
        }
        let gateway = StripeGateway::new(self.http.clone(), publishable_key.trim())
            .with_api_base(self.cfg.api_base.clone())
            .with_checkout_base_url(self.cfg.checkout_base_url.clone());
        Ok(Arc::new(gateway))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_requires_key() {
        let provider = StripeGatewayProvider::new(StripeSettings::default()).unwrap();
        assert!(provider.gateway_for("  ").is_err());
        assert!(provider.gateway_for("pk_test_1").is_ok());
    }
}

// Booking REST client
// Bearer auth from the injected AuthContext; only GETs are retried.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::{info, instrument, warn};
use url::Url;

use crate::auth::AuthContext;
use crate::booking::errors::BackendError;
use crate::booking::types::{Booking, FinalizeAck, HostedSession, IntentGrant};

#[derive(Clone)]
pub struct BookingRestClient {
    pub(crate) http: Client,
    pub(crate) base_url: Url,
    pub(crate) auth: AuthContext,
    pub(crate) max_retries: u32,
    pub(crate) base_delay_ms: u64,
    pub(crate) max_delay_ms: u64,
}

impl BookingRestClient {
    pub fn new(http: Client, base_url: &str, auth: AuthContext) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| BackendError::InvalidRequest(format!("invalid API base url: {e}")))?;
        Ok(Self {
            http,
            base_url,
            auth,
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        })
    }

    pub fn with_retry(mut self, max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.base_delay_ms = base_delay_ms.max(1);
        self.max_delay_ms = max_delay_ms.max(self.base_delay_ms);
        self
    }

    /// Same client, different caller identity.
    pub fn with_auth(&self, auth: AuthContext) -> Self {
        Self {
            auth,
            ..self.clone()
        }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// `{base}/api/bookings/{ref}/{action}/` with the reference percent-encoded.
    fn booking_url(&self, booking_ref: &str, action: Option<&str>) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackendError::InvalidRequest("API base url cannot be a base".into()))?;
            segments.pop_if_empty().extend(["api", "bookings", booking_ref]);
            if let Some(action) = action {
                segments.push(action);
            }
            segments.push("");
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<T, BackendError> {
        let token = self.auth.access_token().ok_or(BackendError::LoginRequired)?;

        let mut req = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| BackendError::Decode(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED {
            self.auth.clear();
            return Err(BackendError::SessionExpired);
        }
        if !status.is_success() {
            let err = BackendError::from_response(status, &text);
            warn!(target: "booking_api", status = status.as_u16(), error = %err, "backend request failed");
            return Err(err);
        }
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str::<T>(text).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn with_retries<F, Fut, T>(&self, desc: &str, mut op: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if !e.is_transient() || attempt >= self.max_retries {
                        return Err(e);
                    }

                    // Exponential backoff with full jitter
                    let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
                    let cap = exp.min(self.max_delay_ms.max(self.base_delay_ms));
                    let mut rng = SmallRng::from_entropy();
                    let delay_ms = if cap > self.base_delay_ms {
                        rng.gen_range(self.base_delay_ms..=cap)
                    } else {
                        self.base_delay_ms
                    };

                    warn!(
                        target: "booking_api",
                        desc = %desc,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        http_status = ?e.status(),
                        next_delay_ms = delay_ms,
                        "retrying transient backend error"
                    );

                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    attempt += 1;
                }
            }
        }
    }

    // GET /api/bookings/{ref}/
    #[instrument(skip(self), fields(method = "GET", path = "/api/bookings/{ref}/"))]
    pub async fn fetch_booking(&self, booking_ref: &str) -> Result<Booking, BackendError> {
        let url = self.booking_url(booking_ref, None)?;
        info!(target: "booking_api", booking_ref = %booking_ref, "fetch booking");
        self.with_retries("fetch_booking", || self.send(Method::GET, url.clone(), None))
            .await
    }

    // POST /api/bookings/{ref}/payment-intent/
    #[instrument(skip(self), fields(method = "POST", path = "/api/bookings/{ref}/payment-intent/"))]
    pub async fn create_payment_intent(&self, booking_ref: &str) -> Result<IntentGrant, BackendError> {
        let url = self.booking_url(booking_ref, Some("payment-intent"))?;
        info!(target: "booking_api", booking_ref = %booking_ref, "create payment intent");
        self.send(Method::POST, url, None).await
    }

    // POST /api/bookings/{ref}/finalize-payment/
    #[instrument(skip(self), fields(method = "POST", path = "/api/bookings/{ref}/finalize-payment/"))]
    pub async fn finalize_payment(
        &self,
        booking_ref: &str,
        payment_intent_id: &str,
    ) -> Result<FinalizeAck, BackendError> {
        let url = self.booking_url(booking_ref, Some("finalize-payment"))?;
        info!(
            target: "booking_api",
            booking_ref = %booking_ref,
            intent_id = %payment_intent_id,
            "finalize payment"
        );
        let body = serde_json::json!({ "payment_intent_id": payment_intent_id });
        let ack: Option<FinalizeAck> = self.send(Method::POST, url, Some(&body)).await?;
        Ok(ack.unwrap_or_default())
    }

    // POST /api/bookings/{ref}/checkout-session/
    #[instrument(skip(self), fields(method = "POST", path = "/api/bookings/{ref}/checkout-session/"))]
    pub async fn create_checkout_session(&self, booking_ref: &str) -> Result<HostedSession, BackendError> {
        let url = self.booking_url(booking_ref, Some("checkout-session"))?;
        info!(target: "booking_api", booking_ref = %booking_ref, "create hosted checkout session");
        let session: Option<HostedSession> = self.send(Method::POST, url, None).await?;
        Ok(session.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl super::BookingApi for BookingRestClient {
    async fn fetch_booking(&self, booking_ref: &str) -> Result<Booking, BackendError> {
        BookingRestClient::fetch_booking(self, booking_ref).await
    }

    async fn create_payment_intent(&self, booking_ref: &str) -> Result<IntentGrant, BackendError> {
        BookingRestClient::create_payment_intent(self, booking_ref).await
    }

    async fn finalize_payment(
        &self,
        booking_ref: &str,
        payment_intent_id: &str,
    ) -> Result<FinalizeAck, BackendError> {
        BookingRestClient::finalize_payment(self, booking_ref, payment_intent_id).await
    }

    async fn create_checkout_session(&self, booking_ref: &str) -> Result<HostedSession, BackendError> {
        BookingRestClient::create_checkout_session(self, booking_ref).await
    }
}

impl super::BookingApiFactory for BookingRestClient {
    fn for_auth(&self, auth: AuthContext) -> std::sync::Arc<dyn super::BookingApi> {
        std::sync::Arc::new(self.with_auth(auth))
    }
}

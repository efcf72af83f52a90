mod auth;
mod booking;
mod checkout;
mod gateway;
mod server;
mod settings;

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::auth::AuthContext;
use crate::booking::rest::BookingRestClient;
use crate::gateway::StripeGatewayProvider;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // config.toml, then environment
    let cfg = settings::Config::load();

    if cfg.default_publishable_key().is_none() {
        tracing::warn!("STRIPE_PUBLISHABLE_KEY not set; bookings without their own key use hosted checkout");
    }
    tracing::info!(api = %cfg.api.base_url, port = cfg.server_port, "Starting trek checkout service");

    let http = Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_millis(cfg.api.timeout_ms.max(1)))
        .build()
        .context("building booking API client")?;
    let bookings = BookingRestClient::new(http, &cfg.api.base_url, AuthContext::new())
        .context("invalid API_BASE_URL")?
        .with_retry(cfg.api.max_retries, 200, 5_000);
    let gateways = StripeGatewayProvider::new(cfg.stripe.clone()).context("building Stripe client")?;

    let port = cfg.server_port;
    let state = AppState::new(cfg, Arc::new(bookings), Arc::new(gateways));
    server::run_server(port, state).await
}

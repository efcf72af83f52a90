// HTTP surface: checkout sessions, live view events, success page, health

pub mod errors;
pub mod sessions;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::booking::BookingApiFactory;
use crate::checkout::success::{booking_ref_from_query, load_success_view};
use crate::checkout::{CheckoutController, CheckoutView, SubmitOutcome};
use crate::gateway::types::CardInput;
use crate::gateway::GatewayProvider;
use crate::settings::Config;

use self::errors::ApiError;
use self::sessions::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub bookings: Arc<dyn BookingApiFactory>,
    pub gateways: Arc<dyn GatewayProvider>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(cfg: Config, bookings: Arc<dyn BookingApiFactory>, gateways: Arc<dyn GatewayProvider>) -> Self {
        let sessions = Arc::new(SessionRegistry::new().with_ttl(cfg.checkout.session_ttl));
        Self {
            cfg: Arc::new(cfg),
            bookings,
            gateways,
            sessions,
        }
    }

    async fn session(&self, id: Uuid) -> Result<Arc<CheckoutController>, ApiError> {
        self.sessions.get(&id).await.ok_or(ApiError::SessionNotFound)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/checkout", post(create_checkout))
        .route("/api/checkout/:id", get(get_checkout).delete(delete_checkout))
        .route("/api/checkout/:id/events", get(checkout_events))
        .route("/api/checkout/:id/card", post(submit_card))
        .route("/api/checkout/:id/card/validation", post(card_validation))
        .route("/api/checkout/:id/retry", post(retry_checkout))
        .route("/api/payment/success", get(payment_success))
        .route("/health", get(health_check))
        .with_state(state)
}

pub async fn run_server(port: u16, state: AppState) -> anyhow::Result<()> {
    spawn_session_cleanup(state.sessions.clone(), state.cfg.checkout.session_ttl);

    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting checkout HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_session_cleanup(sessions: Arc<SessionRegistry>, ttl: Duration) {
    let period = (ttl / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup().await;
            if removed > 0 {
                let active = sessions.len().await;
                debug!(removed, active, "Expired checkout sessions removed");
            }
        }
    });
}

/// Bearer token forwarded from the browser, if any.
fn auth_from_headers(headers: &HeaderMap) -> AuthContext {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(AuthContext::with_access_token)
        .unwrap_or_default()
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutRequest {
    #[serde(default, alias = "bookingRef")]
    booking_ref: String,
}

#[derive(Debug, Serialize)]
struct CheckoutResponse {
    session_id: Uuid,
    view: CheckoutView,
}

async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCheckoutRequest>,
) -> impl IntoResponse {
    let auth = auth_from_headers(&headers);
    let authenticated = auth.is_authenticated();
    let api = state.bookings.for_auth(auth);
    let controller = CheckoutController::new(req.booking_ref, api, state.gateways.clone(), &state.cfg);
    let session_id = state.sessions.insert(controller.clone()).await;
    info!(
        session_id = %session_id,
        booking_ref = %controller.booking_ref(),
        authenticated,
        "Checkout session created"
    );

    controller.mount().await;
    let view = CheckoutView::from_state(&controller.snapshot().await);
    (StatusCode::CREATED, Json(CheckoutResponse { session_id, view }))
}

async fn get_checkout(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<CheckoutView>, ApiError> {
    let controller = state.session(id).await?;
    Ok(Json(CheckoutView::from_state(&controller.snapshot().await)))
}

async fn delete_checkout(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound)
    }
}

/// Server-sent events: the current view, then one event per state change.
async fn checkout_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<ReceiverStream<Result<Event, Infallible>>>, ApiError> {
    let controller = state.session(id).await?;
    let mut rx = controller.subscribe();
    let initial = CheckoutView::from_state(&controller.snapshot().await);
    let (tx, rx_sse) = tokio::sync::mpsc::channel(32);

    debug!(session_id = %id, "Checkout event stream established");

    tokio::spawn(async move {
        if tx.send(Ok(view_event(&initial))).await.is_err() {
            return;
        }
        let mut last_version = initial.version;
        loop {
            tokio::select! {
                update = rx.recv() => {
                    match update {
                        Ok(snapshot) => {
                            if snapshot.version <= last_version {
                                continue;
                            }
                            last_version = snapshot.version;
                            let view = CheckoutView::from_state(&snapshot);
                            if tx.send(Ok(view_event(&view))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // The next snapshot carries the full state.
                            debug!(session_id = %id, skipped, "Checkout event stream lagged");
                            continue;
                        }
                    }
                }
                _ = tx.closed() => {
                    debug!(session_id = %id, "Checkout event stream closed by client");
                    break;
                }
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx_sse)).keep_alive(KeepAlive::default()))
}

fn view_event(view: &CheckoutView) -> Event {
    match Event::default().event("checkout").json_data(view) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Failed to encode checkout view");
            Event::default().event("error").data("encode failed")
        }
    }
}

/// Card data from the browser-side card field: a payment method id or a card token.
#[derive(Debug, Default, Deserialize)]
struct CardSubmission {
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    card_token: Option<String>,
}

impl CardSubmission {
    fn into_card(self) -> Option<CardInput> {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        non_blank(self.payment_method)
            .map(CardInput::PaymentMethod)
            .or_else(|| non_blank(self.card_token).map(CardInput::CardToken))
    }
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    outcome: SubmitOutcome,
    view: CheckoutView,
}

async fn submit_card(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CardSubmission>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let controller = state.session(id).await?;
    let outcome = controller.submit_card(req.into_card()).await;
    info!(session_id = %id, ?outcome, "Card submission handled");
    let view = CheckoutView::from_state(&controller.snapshot().await);
    Ok(Json(SubmitResponse { outcome, view }))
}

#[derive(Debug, Default, Deserialize)]
struct CardValidation {
    #[serde(default)]
    error: Option<String>,
}

async fn card_validation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CardValidation>,
) -> Result<Json<CheckoutView>, ApiError> {
    let controller = state.session(id).await?;
    controller.report_card_validation(req.error).await;
    Ok(Json(CheckoutView::from_state(&controller.snapshot().await)))
}

async fn retry_checkout(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<CheckoutView>, ApiError> {
    let controller = state.session(id).await?;
    controller.retry().await;
    Ok(Json(CheckoutView::from_state(&controller.snapshot().await)))
}

async fn payment_success(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let api = state.bookings.for_auth(auth_from_headers(&headers));
    let booking_ref = booking_ref_from_query(&query);
    match load_success_view(api.as_ref(), booking_ref.as_deref()).await {
        Ok(view) => (StatusCode::OK, Json(json!(view))).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

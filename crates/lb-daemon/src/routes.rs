//! Axum router and all HTTP handlers for lb-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.
//!
//! Error mapping is uniform: the ledger's typed error decides the HTTP status
//! and the body carries the stable machine code.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use lb_ledger::{AdvanceTarget, NewOffer, NewShipment};
use lb_lifecycle::{MarketError, Offer, Shipment, ValidationReason};
use lb_schemas::{LifecycleEvent, OfferWire, ShipmentWire};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    api_types::{
        AdvanceRequest, CreateOfferRequest, CreateShipmentRequest, ErrorResponse, HealthResponse,
        StatusResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/shipments", post(create_shipment))
        .route("/v1/shipments/:id", get(get_shipment))
        .route("/v1/shipments/:id/offers", get(list_offers))
        .route("/v1/shipments/:id/advance", post(advance_shipment))
        .route("/v1/shipments/:id/cancel", post(cancel_shipment))
        .route("/v1/shipments/:id/dispute", post(dispute_shipment))
        .route("/v1/offers", post(create_offer))
        .route("/v1/offers/:id/accept", post(accept_offer))
        .route("/v1/offers/:id/reject", post(reject_offer))
        .route("/v1/offers/:id/withdraw", post(withdraw_offer))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn error_status(err: &MarketError) -> StatusCode {
    match err {
        MarketError::Authentication => StatusCode::UNAUTHORIZED,
        MarketError::Authorization(_) => StatusCode::FORBIDDEN,
        MarketError::NotFound(_) => StatusCode::NOT_FOUND,
        MarketError::Conflict(_) => StatusCode::CONFLICT,
        MarketError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MarketError::State(_) => StatusCode::CONFLICT,
    }
}

fn refuse(err: MarketError) -> Response {
    (
        error_status(&err),
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
        .into_response()
}

/// Caller identity from the `x-caller-id` header. Session management is a
/// collaborator; a missing or garbled header means no identity.
fn caller_id(headers: &HeaderMap) -> Result<Uuid, MarketError> {
    headers
        .get("x-caller-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(MarketError::Authentication)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let (shipments, offers) = {
        let ledger = st.ledger.read().await;
        (ledger.shipments().count(), ledger.offers().count())
    };

    let db_ok = match &st.pool {
        Some(pool) => Some(lb_db::status(pool).await.map(|s| s.ok).unwrap_or(false)),
        None => None,
    };

    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
            shipments,
            offers,
            db_ok,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/shipments
// ---------------------------------------------------------------------------

pub(crate) async fn create_shipment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateShipmentRequest>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(c) => c,
        Err(e) => return refuse(e),
    };

    let now = chrono::Utc::now();
    let created = {
        let mut ledger = st.ledger.write().await;
        ledger.create_shipment(
            caller,
            NewShipment {
                origin: req.origin,
                destination: req.destination,
                stops: req.stops,
                container: req.container,
                weight_kg: req.weight_kg,
                budget_minor: req.budget_minor,
                budget_visible: req.budget_visible,
                currency: req.currency,
            },
            now,
        )
    };

    match created {
        Ok(shipment) => {
            info!(shipment_id = %shipment.id, "shipment created");
            record_shipment_event(&st, "shipment_created", &shipment).await;
            (
                StatusCode::CREATED,
                Json(ShipmentWire::for_viewer(&shipment, true)),
            )
                .into_response()
        }
        Err(e) => refuse(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/shipments/:id
// ---------------------------------------------------------------------------

pub(crate) async fn get_shipment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    // Reads allow anonymous viewers; they just never see a hidden budget.
    let viewer = caller_id(&headers).ok();

    let ledger = st.ledger.read().await;
    match ledger.shipment(id) {
        Some(s) => {
            let is_owner = viewer == Some(s.client_id);
            (StatusCode::OK, Json(ShipmentWire::for_viewer(s, is_owner))).into_response()
        }
        None => refuse(MarketError::NotFound(lb_lifecycle::EntityKind::Shipment)),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/shipments/:id/offers
// ---------------------------------------------------------------------------

pub(crate) async fn list_offers(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    let ledger = st.ledger.read().await;
    if ledger.shipment(id).is_none() {
        return refuse(MarketError::NotFound(lb_lifecycle::EntityKind::Shipment));
    }
    let offers: Vec<OfferWire> = ledger
        .offers_for_shipment(id)
        .into_iter()
        .map(OfferWire::from)
        .collect();
    (StatusCode::OK, Json(offers)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/offers
// ---------------------------------------------------------------------------

pub(crate) async fn create_offer(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateOfferRequest>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(c) => c,
        Err(e) => return refuse(e),
    };

    let now = chrono::Utc::now();
    let created = {
        let mut ledger = st.ledger.write().await;
        ledger.create_offer(
            caller,
            NewOffer {
                shipment_id: req.shipment_id,
                price_minor: req.price_minor,
                estimated_days: req.estimated_days,
                available_from: req.available_from,
                valid_hours: req.valid_hours,
            },
            now,
        )
    };

    match created {
        Ok(offer) => {
            info!(offer_id = %offer.id, shipment_id = %offer.shipment_id, "offer created");
            record_offer_event(&st, "offer_created", &offer).await;
            (StatusCode::CREATED, Json(OfferWire::from(&offer))).into_response()
        }
        Err(e) => refuse(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/offers/:id/accept
// ---------------------------------------------------------------------------

pub(crate) async fn accept_offer(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(c) => c,
        Err(e) => return refuse(e),
    };

    let now = chrono::Utc::now();
    let accepted = {
        let mut ledger = st.ledger.write().await;
        ledger.accept_offer(caller, id, now)
    };

    match accepted {
        Ok(shipment) => {
            info!(offer_id = %id, shipment_id = %shipment.id, "offer accepted");
            record_shipment_event(&st, "offer_accepted", &shipment).await;
            (
                StatusCode::OK,
                Json(ShipmentWire::for_viewer(&shipment, true)),
            )
                .into_response()
        }
        Err(e) => refuse(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/offers/:id/reject  /  POST /v1/offers/:id/withdraw
// ---------------------------------------------------------------------------

pub(crate) async fn reject_offer(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(c) => c,
        Err(e) => return refuse(e),
    };

    let outcome = {
        let mut ledger = st.ledger.write().await;
        ledger.reject_offer(caller, id)
    };

    match outcome {
        Ok(()) => {
            record_plain_event(&st, "offer", "offer_rejected", id).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => refuse(e),
    }
}

pub(crate) async fn withdraw_offer(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(c) => c,
        Err(e) => return refuse(e),
    };

    let outcome = {
        let mut ledger = st.ledger.write().await;
        ledger.withdraw_offer(caller, id)
    };

    match outcome {
        Ok(()) => {
            record_plain_event(&st, "offer", "offer_withdrawn", id).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => refuse(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/shipments/:id/advance
// ---------------------------------------------------------------------------

pub(crate) async fn advance_shipment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<AdvanceRequest>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(c) => c,
        Err(e) => return refuse(e),
    };
    let Some(target) = AdvanceTarget::parse(&req.target) else {
        return refuse(MarketError::Validation(ValidationReason::UnknownStatus));
    };

    let now = chrono::Utc::now();
    let advanced = {
        let mut ledger = st.ledger.write().await;
        ledger.advance_status(caller, id, target, now)
    };

    match advanced {
        Ok(shipment) => {
            info!(shipment_id = %shipment.id, status = shipment.status.as_str(), "shipment advanced");
            record_shipment_event(&st, "shipment_advanced", &shipment).await;
            (
                StatusCode::OK,
                Json(ShipmentWire::for_viewer(&shipment, true)),
            )
                .into_response()
        }
        Err(e) => refuse(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/shipments/:id/cancel  /  POST /v1/shipments/:id/dispute
// ---------------------------------------------------------------------------

pub(crate) async fn cancel_shipment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(c) => c,
        Err(e) => return refuse(e),
    };

    let now = chrono::Utc::now();
    let cancelled = {
        let mut ledger = st.ledger.write().await;
        ledger.cancel_shipment(caller, id, now)
    };

    match cancelled {
        Ok(shipment) => {
            info!(shipment_id = %shipment.id, "shipment cancelled");
            record_shipment_event(&st, "shipment_cancelled", &shipment).await;
            (
                StatusCode::OK,
                Json(ShipmentWire::for_viewer(&shipment, true)),
            )
                .into_response()
        }
        Err(e) => refuse(e),
    }
}

pub(crate) async fn dispute_shipment(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let caller = match caller_id(&headers) {
        Ok(c) => c,
        Err(e) => return refuse(e),
    };

    let now = chrono::Utc::now();
    let disputed = {
        let mut ledger = st.ledger.write().await;
        ledger.raise_dispute(caller, id, now)
    };

    match disputed {
        Ok(shipment) => {
            info!(shipment_id = %shipment.id, "shipment disputed");
            record_shipment_event(&st, "shipment_disputed", &shipment).await;
            (
                StatusCode::OK,
                Json(ShipmentWire::for_viewer(&shipment, true)),
            )
                .into_response()
        }
        Err(e) => refuse(e),
    }
}

// ---------------------------------------------------------------------------
// Event recording
// ---------------------------------------------------------------------------

async fn record_shipment_event(st: &AppState, event_type: &str, shipment: &Shipment) {
    let payload = serde_json::json!({
        "shipment_id": shipment.id,
        "status": shipment.status.as_str(),
        "transporter_id": shipment.transporter_id,
        "agreed_price_minor": shipment.agreed_price_minor,
        "fee_minor": shipment.fee_minor,
    });
    st.record(LifecycleEvent {
        ts_utc: shipment.updated_at,
        topic: "shipment".to_string(),
        event_type: event_type.to_string(),
        entity_id: shipment.id,
        payload,
    })
    .await;
}

async fn record_offer_event(st: &AppState, event_type: &str, offer: &Offer) {
    let payload = serde_json::json!({
        "offer_id": offer.id,
        "shipment_id": offer.shipment_id,
        "price_minor": offer.price_minor,
        "status": offer.status.as_str(),
        "valid_until": offer.valid_until,
    });
    st.record(LifecycleEvent {
        ts_utc: offer.created_at,
        topic: "offer".to_string(),
        event_type: event_type.to_string(),
        entity_id: offer.id,
        payload,
    })
    .await;
}

async fn record_plain_event(st: &AppState, topic: &str, event_type: &str, entity_id: Uuid) {
    st.record(LifecycleEvent {
        ts_utc: chrono::Utc::now(),
        topic: topic.to_string(),
        event_type: event_type.to_string(),
        entity_id,
        payload: serde_json::json!({}),
    })
    .await;
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Lifecycle(_) => "lifecycle",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

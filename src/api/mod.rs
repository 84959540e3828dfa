//! Price HTTP API
//!
//! REST endpoints for providers pushing quotes and for operators managing
//! provider enablement.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::engine::BestPriceEngine;
use crate::providers::{ProviderRegistry, RegistryError};
use crate::types::{pair_id, BestPriceEntry, Quote};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<BestPriceEngine>,
    pub registry: Arc<ProviderRegistry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedQuote {
    pub pair: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestPricesResponse {
    pub pair: String,
    pub bid: Option<BestPriceEntry>,
    pub ask: Option<BestPriceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairToggle {
    pub base: String,
    pub quote: String,
    pub enabled: bool,
}

/// Body of `PUT /providers/:name`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPairsRequest {
    pub pairs: Vec<PairToggle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUpdated {
    pub provider: String,
    pub pairs: BTreeMap<String, bool>,
    /// Best price changes caused by the follow-up recompute
    pub changes: usize,
}

/// Create the API router with all endpoints
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/stats", get(get_stats))
        // Prices
        .route("/prices", post(post_price))
        .route("/prices/recalculate", put(recalculate))
        .route("/prices/:base/:quote", get(get_best_prices))
        // Provider enablement
        .route("/providers", get(get_providers))
        .route("/providers/:name", get(get_provider).put(put_provider))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

// ─────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────

/// GET /ping
async fn ping() -> &'static str {
    "pong"
}

/// GET /stats - Engine counters
async fn get_stats(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.stats()))
}

/// POST /prices - Submit a provider quote
async fn post_price(
    State(state): State<ApiState>,
    body: Result<Json<Quote>, JsonRejection>,
) -> impl IntoResponse {
    let Json(quote) = match body {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<AcceptedQuote>::error(e.body_text())),
            )
        }
    };

    let pair = quote.pair_id();
    match state.engine.submit(quote) {
        Ok(_pending) => (
            StatusCode::OK,
            Json(ApiResponse::success(AcceptedQuote { pair })),
        ),
        Err(rejection) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!(
                "{}: {}",
                rejection.code(),
                rejection
            ))),
        ),
    }
}

/// PUT /prices/recalculate - Start a full recompute and return immediately
async fn recalculate(State(state): State<ApiState>) -> impl IntoResponse {
    let _sweep = state.engine.recompute_in_background();
    (StatusCode::ACCEPTED, Json(ApiResponse::success("recalculating")))
}

/// GET /prices/:base/:quote - Best bid and ask for a pair
async fn get_best_prices(
    State(state): State<ApiState>,
    Path((base, quote)): Path<(String, String)>,
) -> impl IntoResponse {
    let pair = pair_id(&base, &quote);
    match state.engine.book(&pair) {
        Some(book) => (
            StatusCode::OK,
            Json(ApiResponse::success(BestPricesResponse {
                pair,
                bid: book.best_bid,
                ask: book.best_ask,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("No prices for {}", pair))),
        ),
    }
}

/// GET /providers - Enablement of every provider
async fn get_providers(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.registry.providers()))
}

/// GET /providers/:name - Pair flags of one provider (empty when unknown)
async fn get_provider(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let pairs = state
        .registry
        .get_provider(&name)
        .map(|p| p.pairs)
        .unwrap_or_default();
    Json(ApiResponse::success(pairs))
}

/// PUT /providers/:name - Toggle pairs, then recompute best prices
async fn put_provider(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Result<Json<ProviderPairsRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<ProviderUpdated>::error(e.body_text())),
            )
        }
    };

    let changed: HashMap<String, bool> = request
        .pairs
        .iter()
        .map(|p| (pair_id(&p.base, &p.quote), p.enabled))
        .collect();

    if let Err(e) = state.registry.set_pairs_enabled(&name, &changed) {
        let status = match e {
            RegistryError::EmptyProvider => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(provider = %name, error = %e, "Failed to update provider");
        return (status, Json(ApiResponse::error(e.to_string())));
    }

    let summary = match state.engine.recompute_in_background().await {
        Ok(summary) => summary,
        Err(e) => {
            error!(provider = %name, error = %e, "Recompute task failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            );
        }
    };

    info!(provider = %name, pairs = changed.len(), changes = summary.changes.len(), "Provider pairs updated");

    let pairs = state
        .registry
        .get_provider(&name)
        .map(|p| p.pairs)
        .unwrap_or_default();
    (
        StatusCode::OK,
        Json(ApiResponse::success(ProviderUpdated {
            provider: name,
            pairs,
            changes: summary.changes.len(),
        })),
    )
}

/// Start the price API server
pub async fn start_server(state: ApiState, listen_addr: &str) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    info!(addr = %listener.local_addr()?, "Price API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

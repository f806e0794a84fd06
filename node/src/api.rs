//! # REST API
//!
//! Builds the axum router for the node's HTTP interface. Handlers are thin:
//! they pull the network id out of the request, call [`MintForge`], record a
//! metric and translate errors into status codes. Request and response
//! bodies use camelCase field names.
//!
//! ## Endpoints
//!
//! | Method | Path                          | Description                          |
//! |--------|-------------------------------|--------------------------------------|
//! | GET    | `/health`                     | Liveness probe                       |
//! | GET    | `/wallets`                    | Stored wallet addresses              |
//! | GET    | `/update-balance/:walletName` | SOL balance (`?network=`)            |
//! | POST   | `/request-airdrop`            | Devnet airdrop to a stored wallet    |
//! | POST   | `/create-token`               | Create, fund if needed, mint, record |
//! | POST   | `/save-token`                 | Register a token created elsewhere   |
//! | GET    | `/tokens`                     | Registered tokens (`?network=`)      |
//!
//! ## Errors
//!
//! Every error is `{ "error": "<message>" }`. Rate-limited airdrops also
//! carry `faucetUrl`, a web faucet the client can send the user to.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, MatchedPath, Path, Query, Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use mintforge_core::{ForgeError, MintForge, PolicyViolation, ProvisionError};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub forge: Arc<MintForge>,
    pub metrics: SharedMetrics,
    /// Returned as `faucetUrl` when the devnet faucet throttles us.
    pub faucet_url: String,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS, request tracing and request counting.
///
/// An empty `allowed_origins` allows any origin.
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/wallets", get(wallets_handler))
        .route("/update-balance/:wallet_name", get(balance_handler))
        .route("/request-airdrop", post(airdrop_handler))
        .route("/create-token", post(create_token_handler))
        .route("/save-token", post(save_token_handler))
        .route("/tokens", get(tokens_handler))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let response = next.run(request).await;
    state
        .metrics
        .http_requests_total
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();
    response
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// `Json` whose rejections use the API's error body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct NetworkQuery {
    pub network: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirdropRequest {
    pub wallet_name: String,
    pub network: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub selected_wallet: Option<String>,
    pub network: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTokenRequest {
    pub wallet_address: String,
    pub token_mint_address: String,
    pub token_account: String,
    pub network: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub wallet_address: String,
    pub token_mint_address: String,
    pub token_account: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faucet_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// An error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn from_forge(err: &ForgeError, faucet_url: &str) -> Self {
        let status = match err {
            ForgeError::NotFound(_) => StatusCode::NOT_FOUND,
            ForgeError::Policy(PolicyViolation::AirdropForbidden(_)) => StatusCode::FORBIDDEN,
            ForgeError::Policy(PolicyViolation::InsufficientBalance { .. }) => StatusCode::BAD_REQUEST,
            ForgeError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ForgeError::UnknownNetwork(_) | ForgeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ForgeError::Conflict(_) => StatusCode::CONFLICT,
            ForgeError::Network(_) => StatusCode::BAD_GATEWAY,
            ForgeError::Key(_) | ForgeError::Storage(_) | ForgeError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let faucet_url = matches!(err, ForgeError::RateLimited(_)).then(|| faucet_url.to_string());
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        } else {
            tracing::debug!(error = %err, status = %status, "request rejected");
        }
        Self {
            status,
            body: ErrorResponse {
                error: err.to_string(),
                faucet_url,
            },
        }
    }

    fn from_provision(err: &ProvisionError, faucet_url: &str) -> Self {
        let mut api = Self::from_forge(&err.source, faucet_url);
        if let Some(mint) = &err.mint {
            api.body.error = format!("{} (stopped at {}, mint {mint} already exists)", api.body.error, err.state);
        }
        api
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "malformed request body");
        Self {
            status: rejection.status(),
            body: ErrorResponse {
                error: rejection.body_text(),
                faucet_url: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Canonical network name for metric labels, so aliases and casing share a
/// series.
fn network_label(state: &AppState, network: Option<&str>) -> &'static str {
    state
        .forge
        .resolve_network(network)
        .map(|context| context.network.as_str())
        .unwrap_or("unknown")
}

/// `GET /health`: 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /wallets`
async fn wallets_handler(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    state
        .forge
        .wallets()
        .map(Json)
        .map_err(|e| ApiError::from_forge(&e, &state.faucet_url))
}

/// `GET /update-balance/:walletName?network=`
async fn balance_handler(
    Path(wallet_name): Path<String>,
    Query(query): Query<NetworkQuery>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state
        .forge
        .balance(&wallet_name, query.network.as_deref())
        .await
        .map_err(|e| ApiError::from_forge(&e, &state.faucet_url))?;
    Ok(Json(BalanceResponse { balance }))
}

/// `POST /request-airdrop`
async fn airdrop_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AirdropRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let result = state
        .forge
        .request_airdrop(&req.wallet_name, req.network.as_deref())
        .await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(ForgeError::Policy(_)) => "forbidden",
        Err(ForgeError::RateLimited(_)) => "rate_limited",
        Err(_) => "error",
    };
    state.metrics.airdrops_total.with_label_values(&[outcome]).inc();

    match result {
        Ok(signature) => {
            tracing::info!(wallet = %req.wallet_name, %signature, "airdrop served");
            Ok(Json(SuccessResponse { success: true }))
        }
        Err(e) => Err(ApiError::from_forge(&e, &state.faucet_url)),
    }
}

/// `POST /create-token`
///
/// Creates the token and registers it before responding. A wallet is
/// generated when `selectedWallet` is absent or empty.
async fn create_token_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateTokenRequest>,
) -> Result<Json<CreateTokenResponse>, ApiError> {
    let started = Instant::now();
    let result = state
        .forge
        .create_token(req.selected_wallet.as_deref(), req.network.as_deref())
        .await;
    state
        .metrics
        .provision_duration_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(record) => {
            if req.selected_wallet.as_deref().map_or(true, |w| w.trim().is_empty()) {
                state.metrics.wallets_generated_total.inc();
            }
            state
                .metrics
                .tokens_created_total
                .with_label_values(&[network_label(&state, req.network.as_deref())])
                .inc();
            Ok(Json(CreateTokenResponse {
                wallet_address: record.wallet_address,
                token_mint_address: record.token_mint_address,
                token_account: record.token_account,
            }))
        }
        Err(e) => {
            state
                .metrics
                .provision_failures_total
                .with_label_values(&[e.state.as_str()])
                .inc();
            Err(ApiError::from_provision(&e, &state.faucet_url))
        }
    }
}

/// `POST /save-token`
async fn save_token_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SaveTokenRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .forge
        .save_token(
            req.network.as_deref(),
            &req.wallet_address,
            &req.token_mint_address,
            &req.token_account,
        )
        .map_err(|e| ApiError::from_forge(&e, &state.faucet_url))?;
    state
        .metrics
        .tokens_saved_total
        .with_label_values(&[network_label(&state, req.network.as_deref())])
        .inc();
    Ok(Json(SuccessResponse { success: true }))
}

/// `GET /tokens?network=`
async fn tokens_handler(
    Query(query): Query<NetworkQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<mintforge_core::TokenRecord>>, ApiError> {
    state
        .forge
        .tokens(query.network.as_deref())
        .map(Json)
        .map_err(|e| ApiError::from_forge(&e, &state.faucet_url))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

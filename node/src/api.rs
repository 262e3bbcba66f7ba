//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the vault over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! Endpoints marked *auth* act as the account behind the request's bearer
//! key (see [`crate::auth`]). Bodies never name the caller. Privileged
//! endpoints are additionally gated by the vault's own authority check.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Auth | Description                       |
//! |--------|------------------------|------|-----------------------------------|
//! | GET    | `/health`              |      | Liveness check                    |
//! | GET    | `/status`              |      | Vault and asset summary           |
//! | POST   | `/accounts`            |      | Register an address, get a key    |
//! | GET    | `/accounts/:address`   |      | Shares and asset balance          |
//! | POST   | `/faucet`              | auth | Issue devnet asset to the caller  |
//! | POST   | `/approve`             | auth | Let the vault pull caller assets  |
//! | POST   | `/deposit`             | auth | Deposit assets, receive shares    |
//! | POST   | `/mint`                | auth | Mint exact shares                 |
//! | POST   | `/withdraw`            | auth | Withdraw exact assets             |
//! | POST   | `/redeem`              | auth | Redeem exact shares               |
//! | POST   | `/shares/approve`      | auth | Delegate share spending           |
//! | POST   | `/admin/strategy`      | auth | Migrate to a fresh hold strategy  |
//! | POST   | `/admin/model`         | auth | Update the model tag              |
//! | GET    | `/ws`                  |      | WebSocket for live vault events   |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use arca_contracts::token_ledger::TokenInfo;
use arca_contracts::{HoldStrategy, LedgerError, TokenLedger};
use arca_protocol::vault::{
    AssetError, AssetLedger, EventRecord, EventSink, MigrationReport, VaultSnapshot,
};
use arca_protocol::{Address, Amount, Vault, VaultError, VaultResult};

use crate::auth::{AuthError, Credentials};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (e.g., "devnet").
    pub network: String,
    /// The hosted vault.
    pub vault: Vault,
    /// The devnet asset.
    pub ledger: Arc<TokenLedger>,
    /// Identity the faucet mints as.
    pub issuer: Address,
    /// Issued API keys.
    pub credentials: Arc<Credentials>,
    /// Broadcast channel for live vault events.
    pub event_tx: broadcast::Sender<EventRecord>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    fn caller(&self, headers: &HeaderMap) -> Result<Address, ApiError> {
        Ok(self.credentials.authenticate(headers)?)
    }

    /// Addresses no key may be issued for: the vault's own accounts, its
    /// admins, and anything that already holds value.
    fn is_reserved(&self, address: &Address) -> bool {
        address.is_empty()
            || address == self.vault.address()
            || *address == self.issuer
            || *address == self.vault.strategy_id()
            || self.vault.is_authorized(address)
            || self.ledger.balance_of(address) > 0
            || self.vault.balance_of(address) > 0
    }
}

/// Forwards committed vault events to WebSocket subscribers.
pub struct BroadcastSink {
    tx: broadcast::Sender<EventRecord>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<EventRecord>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, record: &EventRecord) {
        // No subscribers is not an error.
        let _ = self.tx.send(record.clone());
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts", post(register_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/faucet", post(faucet_handler))
        .route("/approve", post(approve_handler))
        .route("/deposit", post(deposit_handler))
        .route("/mint", post(mint_handler))
        .route("/withdraw", post(withdraw_handler))
        .route("/redeem", post(redeem_handler))
        .route("/shares/approve", post(share_approve_handler))
        .route("/admin/strategy", post(strategy_handler))
        .route("/admin/model", post(model_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /accounts`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub address: Address,
}

/// Response of `POST /accounts`. The key is shown once.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub address: Address,
    pub api_key: String,
}

/// Body of `POST /faucet` and `POST /approve`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AmountRequest {
    pub amount: Amount,
}

/// Body of `POST /deposit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub assets: Amount,
    /// Defaults to the caller.
    pub receiver: Option<Address>,
}

/// Body of `POST /mint`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MintRequest {
    pub shares: Amount,
    /// Defaults to the caller.
    pub receiver: Option<Address>,
}

/// Body of `POST /withdraw`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub assets: Amount,
    /// Defaults to the caller.
    pub receiver: Option<Address>,
    /// Defaults to the caller. Any other owner must have granted the
    /// caller a share allowance.
    pub owner: Option<Address>,
}

/// Body of `POST /redeem`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub shares: Amount,
    /// Defaults to the caller.
    pub receiver: Option<Address>,
    /// Defaults to the caller.
    pub owner: Option<Address>,
}

/// Body of `POST /shares/approve`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShareApproveRequest {
    pub spender: Address,
    pub shares: Amount,
}

/// Body of `POST /admin/strategy`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StrategyRequest {
    pub strategy_id: Address,
}

/// Body of `POST /admin/model`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model_id: String,
}

/// Response of every value-moving endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Assets moved.
    pub assets: Amount,
    /// Shares minted or burned.
    pub shares: Amount,
    /// Valuation after the operation.
    pub total_assets: Amount,
    /// Share supply after the operation.
    pub total_shares: Amount,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub vault: VaultSnapshot,
    pub asset: TokenInfo,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    /// Vault shares held.
    pub shares: Amount,
    /// Assets those shares redeem for right now.
    pub redeemable_assets: Amount,
    /// Devnet asset balance outside the vault.
    pub asset_balance: Amount,
    /// Assets the vault may still pull from this account.
    pub vault_allowance: Amount,
}

/// Response payload for `POST /admin/model`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelResponse {
    pub old: String,
    pub new: String,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// Failures surfaced by handlers.
#[derive(Debug)]
pub enum ApiError {
    Vault(VaultError),
    Ledger(LedgerError),
    Asset(AssetError),
    Auth(AuthError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Vault(err) => match err {
                VaultError::Unauthorized { .. } => StatusCode::FORBIDDEN,
                VaultError::ReentrantCall
                | VaultError::InsufficientLiquidity { .. }
                | VaultError::InsolventVault => StatusCode::CONFLICT,
                VaultError::StrategyCallFailed { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::BAD_REQUEST,
            },
            ApiError::Ledger(LedgerError::UnauthorizedMint { .. }) => StatusCode::FORBIDDEN,
            ApiError::Ledger(_) | ApiError::Asset(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(err) => match err {
                AuthError::MissingCredentials | AuthError::UnknownKey => StatusCode::UNAUTHORIZED,
                AuthError::AddressTaken(_) => StatusCode::CONFLICT,
                AuthError::ReservedAddress(_) => StatusCode::BAD_REQUEST,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Vault(err) => err.code(),
            ApiError::Ledger(_) | ApiError::Asset(_) => "E100_LEDGER",
            ApiError::Auth(err) => err.code(),
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        ApiError::Vault(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        ApiError::Asset(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Vault(err) => err.to_string(),
            ApiError::Ledger(err) => err.to_string(),
            ApiError::Asset(err) => err.to_string(),
            ApiError::Auth(err) => err.to_string(),
        };
        let body = ErrorResponse {
            error: message,
            code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Runs one vault operation, recording latency, outcome, and supply.
fn instrumented<T>(
    state: &AppState,
    operation: &str,
    f: impl FnOnce(&Vault) -> VaultResult<T>,
) -> Result<T, ApiError> {
    let started = Instant::now();
    let result = f(&state.vault);
    state
        .metrics
        .operation_latency_seconds
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(value) => {
            state
                .metrics
                .operations_total
                .with_label_values(&[operation])
                .inc();
            if let Ok(total_assets) = state.vault.total_assets() {
                state
                    .metrics
                    .record_supply(total_assets, state.vault.total_shares());
            }
            Ok(value)
        }
        Err(err) => {
            tracing::warn!(operation, code = err.code(), error = %err, "vault operation failed");
            state
                .metrics
                .operation_failures_total
                .with_label_values(&[err.code()])
                .inc();
            Err(err.into())
        }
    }
}

fn operation_response(
    state: &AppState,
    assets: Amount,
    shares: Amount,
) -> Result<Json<OperationResponse>, ApiError> {
    Ok(Json(OperationResponse {
        assets,
        shares,
        total_assets: state.vault.total_assets()?,
        total_shares: state.vault.total_shares(),
    }))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — vault snapshot plus asset metadata.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        vault: state.vault.snapshot()?,
        asset: state.ledger.info(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `POST /accounts` — issues the API key for a new address.
async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let address = req.address;
    if state.is_reserved(&address) {
        return Err(AuthError::ReservedAddress(address).into());
    }
    let api_key = state.credentials.register(&address)?;
    tracing::info!(%address, "account registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { address, api_key })))
}

/// `GET /accounts/:address` — shares and asset balance. Unknown addresses
/// return zeroes.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address = Address::new(address);
    Ok(Json(AccountResponse {
        shares: state.vault.balance_of(&address),
        redeemable_assets: state.vault.max_withdraw(&address)?,
        asset_balance: state.ledger.balance_of(&address),
        vault_allowance: state.ledger.allowance(&address, state.vault.address()),
        address,
    }))
}

/// `POST /faucet` — mints devnet asset to the caller.
async fn faucet_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = state.caller(&headers)?;
    state.ledger.mint(&state.issuer, &caller, req.amount)?;
    tracing::info!(to = %caller, amount = req.amount, "faucet issued");
    Ok(Json(serde_json::json!({
        "to": caller,
        "amount": req.amount,
        "balance": state.ledger.balance_of(&caller),
    })))
}

/// `POST /approve` — sets how much of the caller's asset the vault may pull.
async fn approve_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = state.caller(&headers)?;
    state
        .ledger
        .approve(&caller, state.vault.address(), req.amount)?;
    Ok(Json(serde_json::json!({
        "owner": caller,
        "spender": state.vault.address(),
        "amount": req.amount,
    })))
}

async fn deposit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DepositRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let caller = state.caller(&headers)?;
    let receiver = req.receiver.unwrap_or_else(|| caller.clone());
    let shares = instrumented(&state, "deposit", |v| {
        v.deposit(&caller, req.assets, &receiver)
    })?;
    operation_response(&state, req.assets, shares)
}

async fn mint_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MintRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let caller = state.caller(&headers)?;
    let receiver = req.receiver.unwrap_or_else(|| caller.clone());
    let assets = instrumented(&state, "mint", |v| v.mint(&caller, req.shares, &receiver))?;
    operation_response(&state, assets, req.shares)
}

async fn withdraw_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let caller = state.caller(&headers)?;
    let receiver = req.receiver.unwrap_or_else(|| caller.clone());
    let owner = req.owner.unwrap_or_else(|| caller.clone());
    let shares = instrumented(&state, "withdraw", |v| {
        v.withdraw(&caller, req.assets, &receiver, &owner)
    })?;
    operation_response(&state, req.assets, shares)
}

async fn redeem_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    let caller = state.caller(&headers)?;
    let receiver = req.receiver.unwrap_or_else(|| caller.clone());
    let owner = req.owner.unwrap_or_else(|| caller.clone());
    let assets = instrumented(&state, "redeem", |v| {
        v.redeem(&caller, req.shares, &receiver, &owner)
    })?;
    operation_response(&state, assets, req.shares)
}

/// `POST /shares/approve` — lets `spender` burn or move the caller's shares.
async fn share_approve_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ShareApproveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = state.caller(&headers)?;
    instrumented(&state, "approve_shares", |v| {
        v.approve_shares(&caller, &req.spender, req.shares)
    })?;
    Ok(Json(serde_json::json!({
        "owner": caller,
        "spender": req.spender,
        "shares": req.shares,
    })))
}

/// `POST /admin/strategy` — migrates the vault to a fresh [`HoldStrategy`].
///
/// The target id must not be an account anyone holds a key for. The vault
/// itself refuses targets that already hold assets.
async fn strategy_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StrategyRequest>,
) -> Result<Json<MigrationReport>, ApiError> {
    let caller = state.caller(&headers)?;
    if state.credentials.is_registered(&req.strategy_id) || req.strategy_id == state.issuer {
        return Err(AuthError::ReservedAddress(req.strategy_id).into());
    }
    let strategy = Arc::new(HoldStrategy::new(
        req.strategy_id.clone(),
        state.vault.address().clone(),
        state.ledger.clone(),
    ));
    let report = instrumented(&state, "set_strategy", |v| v.set_strategy(&caller, strategy))?;
    Ok(Json(report))
}

/// `POST /admin/model` — replaces the opaque model tag.
async fn model_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ModelRequest>,
) -> Result<Json<ModelResponse>, ApiError> {
    let caller = state.caller(&headers)?;
    let new = req.model_id.clone();
    let old = instrumented(&state, "set_model_id", |v| v.set_model_id(&caller, req.model_id))?;
    Ok(Json(ModelResponse { old, new }))
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`EventRecord`] messages for each committed
/// vault event. The connection is read-only from the server's perspective;
/// client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            // Client disconnected.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {
                        // Push-only channel.
                    }
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use arca_protocol::vault::VaultEvent;
    use arca_protocol::VaultConfig;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const ISSUER: &str = "arca:faucet";
    const ADMIN_KEY: &str = "devnet-admin-token-0001";

    /// Builds a devnet vault with the default config. `ADMIN_KEY` is bound
    /// to its admin, `arca:governance`.
    fn test_app_state() -> AppState {
        let config = VaultConfig {
            admin_token: Some(ADMIN_KEY.to_string()),
            ..VaultConfig::default()
        };
        let ledger = Arc::new(TokenLedger::new("ausd", 6, ISSUER));
        let strategy = Arc::new(HoldStrategy::new(
            "arca:hold-0",
            config.vault_address.clone(),
            ledger.clone(),
        ));
        let vault = Vault::new(&config, ledger.clone(), strategy, config.authority()).unwrap();
        let (event_tx, _) = broadcast::channel(16);
        vault.add_event_sink(Arc::new(BroadcastSink::new(event_tx.clone())));
        let metrics = Arc::new(crate::metrics::VaultMetrics::new().unwrap());
        let credentials = Arc::new(Credentials::new());
        credentials
            .insert(ADMIN_KEY.to_string(), &config.admins[0])
            .unwrap();

        AppState {
            version: "0.1.0-test".into(),
            network: "devnet".into(),
            vault,
            ledger,
            issuer: Address::from(ISSUER),
            credentials,
            event_tx,
            metrics,
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    /// Sends a POST request with JSON body, optionally as the holder of
    /// `key`, and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        key: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(key) = key {
            req = req.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        let req = req
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    async fn register(router: &Router, who: &str) -> String {
        let (status, body) = post_json(
            router,
            "/accounts",
            None,
            serde_json::json!({ "address": who }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let resp: RegisterResponse = serde_json::from_slice(&body).unwrap();
        resp.api_key
    }

    /// Issues `amount` to the key's holder and lets the vault pull all of it.
    async fn fund(router: &Router, key: &str, amount: Amount) {
        let body = serde_json::json!({ "amount": amount });
        let (status, _) = post_json(router, "/faucet", Some(key), body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post_json(router, "/approve", Some(key), body).await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn account(router: &Router, who: &str) -> AccountResponse {
        let (status, body) = get(router, &format!("/accounts/{who}")).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }

    fn error_code(body: &[u8]) -> String {
        let err: ErrorResponse = serde_json::from_slice(body).unwrap();
        err.code
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_empty_vault() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/status").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["network"], "devnet");
        assert_eq!(json["vault"]["total_shares"], 0);
        assert_eq!(json["vault"]["strategy"], "arca:hold-0");
        assert_eq!(json["vault"]["allowance_policy"], "per_operation");
        assert_eq!(json["asset"]["symbol"], "AUSD");
    }

    #[tokio::test]
    async fn deposit_then_redeem_round_trip() {
        let router = create_router(test_app_state());
        let alice = register(&router, "alice").await;
        fund(&router, &alice, 10_000).await;

        let (status, body) = post_json(
            &router,
            "/deposit",
            Some(&alice),
            serde_json::json!({ "assets": 4_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: OperationResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.shares, 4_000);
        assert_eq!(resp.total_assets, 4_000);

        let held = account(&router, "alice").await;
        assert_eq!(held.shares, 4_000);
        assert_eq!(held.redeemable_assets, 4_000);
        assert_eq!(held.asset_balance, 6_000);
        assert_eq!(held.vault_allowance, 6_000);

        let (status, body) = post_json(
            &router,
            "/redeem",
            Some(&alice),
            serde_json::json!({ "shares": 4_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: OperationResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.assets, 4_000);
        assert_eq!(resp.total_shares, 0);
    }

    #[tokio::test]
    async fn value_moving_routes_require_a_known_key() {
        let router = create_router(test_app_state());
        let body = serde_json::json!({ "assets": 100 });

        let (status, resp) = post_json(&router, "/deposit", None, body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&resp), "E101_MISSING_CREDENTIALS");

        let (status, resp) = post_json(&router, "/deposit", Some("forged"), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&resp), "E102_UNKNOWN_KEY");

        let (status, _) = post_json(
            &router,
            "/faucet",
            None,
            serde_json::json!({ "amount": 1_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn addresses_are_registered_once() {
        let router = create_router(test_app_state());
        register(&router, "alice").await;

        let (status, body) = post_json(
            &router,
            "/accounts",
            None,
            serde_json::json!({ "address": "alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "E103_ADDRESS_TAKEN");
    }

    #[tokio::test]
    async fn vault_accounts_cannot_be_registered() {
        let router = create_router(test_app_state());
        for reserved in ["arca:vault", "arca:hold-0", ISSUER, "arca:governance", " "] {
            let (status, body) = post_json(
                &router,
                "/accounts",
                None,
                serde_json::json!({ "address": reserved }),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{reserved:?}");
            assert_eq!(error_code(&body), "E104_RESERVED_ADDRESS");
        }
    }

    #[tokio::test]
    async fn deposit_pulls_only_from_the_authenticated_caller() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let alice = register(&router, "alice").await;
        let bob = register(&router, "bob").await;
        fund(&router, &alice, 5_000).await;
        fund(&router, &bob, 100).await;

        // a body-level caller is not part of the request type
        let (status, body) = post_json(
            &router,
            "/deposit",
            Some(&bob),
            serde_json::json!({ "caller": "alice", "assets": 5_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "E020_TRANSFER_FAILED");
        assert_eq!(state.ledger.balance_of(&Address::from("alice")), 5_000);
        assert_eq!(state.vault.total_shares(), 0);
    }

    #[tokio::test]
    async fn withdrawing_for_another_owner_needs_a_share_allowance() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let alice = register(&router, "alice").await;
        let bob = register(&router, "bob").await;
        fund(&router, &alice, 1_000).await;
        post_json(
            &router,
            "/deposit",
            Some(&alice),
            serde_json::json!({ "assets": 1_000 }),
        )
        .await;

        let withdraw = serde_json::json!({ "assets": 400, "owner": "alice" });
        let (status, body) = post_json(&router, "/withdraw", Some(&bob), withdraw.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "E080_INSUFFICIENT_ALLOWANCE");

        let (status, _) = post_json(
            &router,
            "/shares/approve",
            Some(&alice),
            serde_json::json!({ "spender": "bob", "shares": 400 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(&router, "/withdraw", Some(&bob), withdraw).await;
        assert_eq!(status, StatusCode::OK);
        let resp: OperationResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.shares, 400);
        assert_eq!(state.ledger.balance_of(&Address::from("bob")), 500);
        assert_eq!(state.vault.balance_of(&Address::from("alice")), 600);
    }

    #[tokio::test]
    async fn faucet_does_not_approve_the_vault() {
        let router = create_router(test_app_state());
        let alice = register(&router, "alice").await;
        let (status, _) = post_json(
            &router,
            "/faucet",
            Some(&alice),
            serde_json::json!({ "amount": 1_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let held = account(&router, "alice").await;
        assert_eq!(held.asset_balance, 1_000);
        assert_eq!(held.vault_allowance, 0);

        let (status, body) = post_json(
            &router,
            "/deposit",
            Some(&alice),
            serde_json::json!({ "assets": 1_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "E020_TRANSFER_FAILED");
    }

    #[tokio::test]
    async fn zero_deposit_maps_to_bad_request() {
        let router = create_router(test_app_state());
        let alice = register(&router, "alice").await;
        let (status, body) = post_json(
            &router,
            "/deposit",
            Some(&alice),
            serde_json::json!({ "assets": 0 }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "E010_INVALID_AMOUNT");
    }

    #[tokio::test]
    async fn withdraw_beyond_valuation_maps_to_conflict() {
        let router = create_router(test_app_state());
        let alice = register(&router, "alice").await;
        fund(&router, &alice, 1_000).await;
        post_json(
            &router,
            "/deposit",
            Some(&alice),
            serde_json::json!({ "assets": 1_000 }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            "/withdraw",
            Some(&alice),
            serde_json::json!({ "assets": 5_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "E040_INSUFFICIENT_LIQUIDITY");
    }

    #[tokio::test]
    async fn strategy_migration_requires_governance() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let alice = register(&router, "alice").await;
        fund(&router, &alice, 1_000).await;
        post_json(
            &router,
            "/deposit",
            Some(&alice),
            serde_json::json!({ "assets": 1_000 }),
        )
        .await;

        let target = serde_json::json!({ "strategy_id": "arca:hold-1" });
        let (status, _) = post_json(&router, "/admin/strategy", Some(&alice), target.clone()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = post_json(&router, "/admin/strategy", Some(ADMIN_KEY), target).await;
        assert_eq!(status, StatusCode::OK);
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["migrated_assets"], 1_000);
        assert_eq!(state.vault.strategy_id(), Address::from("arca:hold-1"));
    }

    #[tokio::test]
    async fn migration_cannot_target_a_registered_account() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let alice = register(&router, "alice").await;
        register(&router, "mallory").await;
        fund(&router, &alice, 1_000).await;
        post_json(
            &router,
            "/deposit",
            Some(&alice),
            serde_json::json!({ "assets": 1_000 }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            "/admin/strategy",
            Some(ADMIN_KEY),
            serde_json::json!({ "strategy_id": "mallory" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body), "E104_RESERVED_ADDRESS");
        assert_eq!(state.vault.strategy_id(), Address::from("arca:hold-0"));
        assert_eq!(state.ledger.balance_of(&Address::from("mallory")), 0);
    }

    #[tokio::test]
    async fn model_update_returns_previous_tag() {
        let router = create_router(test_app_state());
        let (status, body) = post_json(
            &router,
            "/admin/model",
            Some(ADMIN_KEY),
            serde_json::json!({ "model_id": "llama-3-8b" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let resp: ModelResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.old, arca_protocol::config::DEFAULT_MODEL_ID);
        assert_eq!(resp.new, "llama-3-8b");
    }

    #[tokio::test]
    async fn committed_events_reach_broadcast_subscribers() {
        let state = test_app_state();
        let mut rx = state.event_tx.subscribe();
        let router = create_router(state);
        let alice = register(&router, "alice").await;
        fund(&router, &alice, 500).await;
        post_json(
            &router,
            "/deposit",
            Some(&alice),
            serde_json::json!({ "assets": 500 }),
        )
        .await;

        let record = rx.recv().await.unwrap();
        assert!(matches!(record.event, VaultEvent::Deposit { assets: 500, .. }));
    }

    #[tokio::test]
    async fn failures_are_counted_by_code() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let alice = register(&router, "alice").await;
        post_json(
            &router,
            "/redeem",
            Some(&alice),
            serde_json::json!({ "shares": 0 }),
        )
        .await;

        let text = state.metrics.encode().unwrap();
        assert!(text.contains("arca_operation_failures_total{code=\"E010_INVALID_AMOUNT\"} 1"));
    }
}

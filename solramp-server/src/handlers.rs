//! HTTP surface: router, handlers, and the payment-success page.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use solramp::{RampError, SessionPatch, SessionStatus, SessionStore, StoreError, display_sol};
use solramp_svm::executor::{SettlementExecutor, SwapOutcome, TransferOutcome};
use solramp_svm::lend::LendingDepositBuilder;
use solramp_svm::quote::{DEFAULT_SLIPPAGE_BPS, QuoteParams, SwapQuoteClient};
use solramp_svm::{LAMPORTS_PER_SOL, SOL_MINT};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::checkout::{CheckoutService, CreateSessionRequest};
use crate::error::ApiError;
use crate::payments::PaymentProvider;

/// Shared handler state.
pub struct AppState {
    /// Session persistence.
    pub store: Arc<dyn SessionStore>,
    /// Session creation service.
    pub checkout: CheckoutService,
    /// On-chain settlement.
    pub executor: SettlementExecutor,
    /// Fiat provider, used as a status fallback.
    pub payments: Arc<dyn PaymentProvider>,
    /// Quote client for the standalone quote endpoint.
    pub quotes: SwapQuoteClient,
    /// Lending deposit builder.
    pub lending: Arc<LendingDepositBuilder>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// State handle cloned into every handler.
pub type SharedState = Arc<AppState>;

/// Builds the service router with permissive CORS, matching the browser
/// checkout widget that calls these endpoints cross-origin.
pub fn app_router(state: SharedState) -> Router {
    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/payment-success", get(payment_success))
        .route("/payment-status/{session_id}", get(payment_status))
        .route("/transfer-sol", post(transfer_sol))
        .route("/swap-tokens", post(swap_tokens))
        .route("/get-swap-quote", post(get_swap_quote))
        .route("/solend-lend", post(solend_lend))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn create_checkout_session(
    State(state): State<SharedState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.checkout.create_session(request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct SuccessQuery {
    #[serde(default)]
    session_id: Option<String>,
}

/// Landing page the payment provider redirects to. Marks the session
/// paid and posts a completion message back to the opening window.
async fn payment_success(
    State(state): State<SharedState>,
    Query(query): Query<SuccessQuery>,
) -> Html<String> {
    let session = query
        .session_id
        .as_deref()
        .and_then(|id| state.store.get(id));

    let Some(session) = session else {
        return Html(success_page(&json!({ "type": "PAYMENT_COMPLETE", "status": "success" })));
    };

    // A duplicate redirect after settlement started is not an error; the
    // forward-only store rejects the stale transition and we just render.
    match state
        .store
        .update(&session.id, SessionPatch::status(SessionStatus::PaymentCompleted))
    {
        Ok(_) => info!(session_id = %session.id, "payment completed"),
        Err(StoreError::InvalidTransition { from, .. }) => {
            info!(session_id = %session.id, status = ?from, "duplicate success redirect");
        }
        Err(error) => warn!(session_id = %session.id, %error, "payment completion not recorded"),
    }

    let mut message = json!({
        "type": "PAYMENT_COMPLETE",
        "sessionId": session.id,
        "walletAddress": session.wallet_address,
        "amount": display_sol(session.sol_amount),
        "status": "success",
        "isTokenSwap": session.is_token_swap,
    });
    if let Some(token) = &session.token {
        message["tokenSymbol"] = json!(token.symbol);
        message["tokenAddress"] = json!(token.mint);
        if let Some(amount) = token.amount {
            message["tokenAmount"] = json!(amount);
        }
    }
    Html(success_page(&message))
}

fn success_page(message: &serde_json::Value) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Payment Complete</title></head>
<body>
<p>Payment complete. You can close this window.</p>
<script>
  if (window.opener) {{
    window.opener.postMessage({message}, "*");
  }}
  setTimeout(function () {{ window.close(); }}, 1500);
</script>
</body>
</html>"#
    )
}

/// Session status, from the store first and the payment provider second.
async fn payment_status(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(session) = state.store.get(&session_id) {
        let mut body = serde_json::to_value(&session)
            .map_err(|e| RampError::Configuration(format!("session encode: {e}")))?;
        body["message"] = json!(session.status.message());
        return Ok(Json(body));
    }

    // Not in the store; the provider may still know it (e.g. after a
    // restart lost the in-memory sessions).
    match state.payments.fetch_status(&session_id).await? {
        Some(provider) => Ok(Json(json!({
            "id": session_id,
            "status": if provider.paid { "payment_completed" } else { "created" },
            "message": provider.status,
        }))),
        None => Err(RampError::SessionNotFound(session_id).into()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
    #[serde(default)]
    wallet_address: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    retry_count: Option<u32>,
}

/// Claims `session_id` for settlement. A retried attempt already holds
/// the claim, so `AlreadyClaimed` passes through when `retrying`.
fn claim_for_settlement(
    store: &dyn SessionStore,
    session_id: &str,
    retrying: bool,
) -> Result<solramp::PaymentSession, ApiError> {
    match store.claim(session_id) {
        Ok(session) => Ok(session),
        Err(StoreError::AlreadyClaimed(id)) if retrying => store
            .get(&id)
            .ok_or_else(|| ApiError::Store(StoreError::NotFound(id))),
        Err(error) => Err(error.into()),
    }
}

async fn transfer_sol(
    State(state): State<SharedState>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let retry_count = request.retry_count.unwrap_or(0);

    // With a session id the session is claimed first and supplies the
    // wallet and amount defaults; without one this is a bare transfer.
    let (wallet, amount) = match &request.session_id {
        Some(id) => {
            let session = claim_for_settlement(&*state.store, id, retry_count > 0)?;
            (
                request
                    .wallet_address
                    .clone()
                    .unwrap_or(session.wallet_address),
                request.amount.unwrap_or(session.sol_amount),
            )
        }
        None => {
            let wallet = request
                .wallet_address
                .clone()
                .ok_or_else(|| RampError::Validation("walletAddress is required".into()))?;
            let amount = request
                .amount
                .ok_or_else(|| RampError::Validation("amount is required".into()))?;
            (wallet, amount)
        }
    };

    let TransferOutcome {
        signature,
        explorer_link,
        amount,
    } = state
        .executor
        .transfer_sol(&wallet, amount, request.session_id.as_deref(), retry_count)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "transaction": signature,
        "explorerLink": explorer_link,
        "amount": amount,
        "message": format!("Transferred {} SOL", display_sol(amount)),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest {
    #[serde(default)]
    wallet_address: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    to_token: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
}

async fn swap_tokens(
    State(state): State<SharedState>,
    Json(request): Json<SwapRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (wallet, to_token, amount) = match &request.session_id {
        Some(id) => {
            let session = claim_for_settlement(&*state.store, id, false)?;
            let token = session.token.as_ref().ok_or_else(|| {
                RampError::Validation(format!("session {id} is not a token-swap session"))
            })?;
            (
                request
                    .wallet_address
                    .clone()
                    .unwrap_or_else(|| session.wallet_address.clone()),
                request.to_token.clone().unwrap_or_else(|| token.mint.clone()),
                request.amount.unwrap_or(session.sol_amount),
            )
        }
        None => {
            let wallet = request
                .wallet_address
                .clone()
                .ok_or_else(|| RampError::Validation("walletAddress is required".into()))?;
            let to_token = request
                .to_token
                .clone()
                .ok_or_else(|| RampError::Validation("toToken is required".into()))?;
            let amount = request
                .amount
                .ok_or_else(|| RampError::Validation("amount is required".into()))?;
            (wallet, to_token, amount)
        }
    };

    let SwapOutcome {
        transactions,
        final_token,
        delivered_amount,
        message,
    } = state
        .executor
        .swap_and_deliver(&wallet, request.session_id.as_deref(), &to_token, amount)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "transactions": transactions,
        "finalToken": final_token,
        "deliveredAmount": delivered_amount,
        "message": message,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest {
    #[serde(default)]
    input_mint: Option<String>,
    output_mint: String,
    /// Input amount in SOL.
    amount: f64,
    #[serde(default)]
    slippage_bps: Option<u16>,
}

async fn get_swap_quote(
    State(state): State<SharedState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(RampError::Validation(format!(
            "amount must be a positive number of SOL, got {}",
            request.amount
        ))
        .into());
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lamports = (request.amount * LAMPORTS_PER_SOL).round() as u64;
    let params = QuoteParams {
        input_mint: request.input_mint.unwrap_or_else(|| SOL_MINT.to_owned()),
        output_mint: request.output_mint,
        amount: lamports,
        slippage_bps: request.slippage_bps.unwrap_or(DEFAULT_SLIPPAGE_BPS),
    };
    let quote = state.quotes.quote(&params).await?;

    Ok(Json(json!({
        "inputMint": params.input_mint,
        "outputMint": params.output_mint,
        "inAmount": lamports,
        "outAmount": quote.out_amount,
        "uiOutAmount": quote.ui_out_amount(),
        "priceImpactPct": quote.price_impact_pct,
        "quote": quote.raw,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LendRequest {
    pool: String,
    amount: f64,
    user_public_key: String,
}

async fn solend_lend(
    State(state): State<SharedState>,
    Json(request): Json<LendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = request
        .user_public_key
        .parse()
        .map_err(|_| RampError::Validation(format!("invalid userPublicKey: {}", request.user_public_key)))?;
    let transaction = state
        .lending
        .build_deposit(&request.pool, request.amount, &user)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "pool": request.pool,
        "transaction": transaction,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use solana_pubkey::Pubkey;
    use solramp::{MemoryStore, PaymentSession, RetryPolicy, TokenDescriptor};
    use solramp_svm::executor::ConfirmationStrategy;
    use solramp_svm::provider::{
        BoxFuture, FeeSample, ProbeStatus, ProviderError, SolanaProvider,
    };
    use solramp_svm::signer::FundingSigner;
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt as _;
    use url::Url;

    use crate::config::CheckoutConfig;
    use crate::oracle::PriceOracle;
    use crate::payments::ProviderSessionStatus;

    const WALLET: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    struct StubProvider;

    impl SolanaProvider for StubProvider {
        fn latest_blockhash(
            &self,
        ) -> BoxFuture<'_, Result<solana_hash::Hash, ProviderError>> {
            Box::pin(async { Ok(solana_hash::Hash::new_unique()) })
        }

        fn recent_prioritization_fees(
            &self,
        ) -> BoxFuture<'_, Result<Vec<FeeSample>, ProviderError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn send_transaction(
            &self,
            transaction: &solana_transaction::versioned::VersionedTransaction,
        ) -> BoxFuture<'_, Result<solana_signature::Signature, ProviderError>> {
            let signature = transaction.signatures[0];
            Box::pin(async move { Ok(signature) })
        }

        fn probe_signature(
            &self,
            _signature: &solana_signature::Signature,
        ) -> BoxFuture<'_, Result<ProbeStatus, ProviderError>> {
            Box::pin(async { Ok(ProbeStatus::Landed) })
        }

        fn confirm_finalized(
            &self,
            _signature: &solana_signature::Signature,
        ) -> BoxFuture<'_, Result<(), ProviderError>> {
            Box::pin(async { Ok(()) })
        }

        fn account_exists(&self, _pubkey: &Pubkey) -> BoxFuture<'_, Result<bool, ProviderError>> {
            Box::pin(async { Ok(true) })
        }

        fn mint_decimals(&self, _mint: &Pubkey) -> BoxFuture<'_, Result<u8, ProviderError>> {
            Box::pin(async { Ok(6) })
        }
    }

    struct FixedOracle;

    impl PriceOracle for FixedOracle {
        fn sol_price<'a>(&'a self, _currency: &'a str) -> BoxFuture<'a, Result<f64, RampError>> {
            Box::pin(async { Ok(100.0) })
        }
    }

    struct FakePayments;

    impl PaymentProvider for FakePayments {
        fn create_checkout<'a>(
            &'a self,
            session: &'a PaymentSession,
            _success_url: &'a Url,
        ) -> BoxFuture<'a, Result<String, RampError>> {
            let url = format!("https://pay.example/c/{}", session.id);
            Box::pin(async move { Ok(url) })
        }

        fn fetch_status<'a>(
            &'a self,
            _session_id: &'a str,
        ) -> BoxFuture<'a, Result<Option<ProviderSessionStatus>, RampError>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn test_state() -> (SharedState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let provider: Arc<dyn SolanaProvider> = Arc::new(StubProvider);
        let keypair = solana_keypair::Keypair::new();
        let secret = bs58::encode(keypair.to_bytes()).into_string();
        let signer = Arc::new(FundingSigner::from_secret(&secret).unwrap());
        let payments: Arc<dyn PaymentProvider> = Arc::new(FakePayments);
        let aggregator = Url::parse("http://127.0.0.1:9/").unwrap();
        let quotes = SwapQuoteClient::new(&aggregator).unwrap();
        let executor = SettlementExecutor::new(
            Arc::clone(&provider),
            signer,
            Arc::clone(&store) as Arc<dyn SessionStore>,
            quotes.clone(),
            ConfirmationStrategy::Optimistic,
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        });
        let checkout = CheckoutService::new(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::new(FixedOracle),
            Arc::clone(&payments),
            CheckoutConfig::default(),
            Url::parse("https://ramp.example/payment-success").unwrap(),
        );
        let lending = Arc::new(LendingDepositBuilder::new(
            Arc::clone(&provider),
            HashMap::new(),
        ));
        let state = Arc::new(AppState {
            store: Arc::clone(&store) as Arc<dyn SessionStore>,
            checkout,
            executor,
            payments,
            quotes,
            lending,
        });
        (state, store)
    }

    fn paid_session(store: &MemoryStore, id: &str) -> PaymentSession {
        let session = PaymentSession::new(
            id.to_owned(),
            WALLET.to_owned(),
            500,
            "usd".to_owned(),
            0.05,
            None,
        );
        store.create(session.clone()).unwrap();
        store
            .update(id, SessionPatch::status(SessionStatus::PaymentCompleted))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (state, _) = test_state();
        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn create_checkout_session_returns_hosted_url() {
        let (state, store) = test_state();
        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/create-checkout-session")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({ "walletAddress": WALLET })).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["fiatAmount"], 500);
        assert_eq!(body["solAmount"], 0.05);
        let id = body["sessionId"].as_str().unwrap();
        assert!(store.get(id).is_some());
    }

    #[tokio::test]
    async fn create_checkout_session_rejects_missing_wallet() {
        let (state, _) = test_state();
        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/create-checkout-session")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({ "walletAddress": "" })).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn payment_success_marks_session_paid() {
        let (state, store) = test_state();
        let session = PaymentSession::new(
            "cs_success".to_owned(),
            WALLET.to_owned(),
            500,
            "usd".to_owned(),
            0.05,
            None,
        );
        store.create(session).unwrap();

        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .uri("/payment-success?session_id=cs_success")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            store.get("cs_success").unwrap().status,
            SessionStatus::PaymentCompleted
        );
    }

    #[tokio::test]
    async fn payment_status_includes_message() {
        let (state, store) = test_state();
        paid_session(&store, "cs_status");

        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .uri("/payment-status/cs_status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "payment_completed");
        assert_eq!(body["message"], "Payment received, settlement pending");
    }

    #[tokio::test]
    async fn payment_status_unknown_everywhere_is_404() {
        let (state, _) = test_state();
        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .uri("/payment-status/cs_missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn transfer_sol_settles_claimed_session() {
        let (state, store) = test_state();
        paid_session(&store, "cs_transfer");

        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transfer-sol")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({ "sessionId": "cs_transfer" })).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["amount"], 0.05);
        assert!(body["transaction"].is_string());
        assert!(
            body["explorerLink"]
                .as_str()
                .unwrap()
                .starts_with("https://solscan.io/tx/")
        );

        let session = store.get("cs_transfer").unwrap();
        assert_eq!(session.status, SessionStatus::SolTransferred);
        assert!(session.signature.is_some());
    }

    #[tokio::test]
    async fn bare_transfer_without_session_works() {
        let (state, _) = test_state();
        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transfer-sol")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({
                            "walletAddress": WALLET,
                            "amount": 0.1
                        }))
                        .unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["amount"], 0.1);
    }

    #[tokio::test]
    async fn bare_transfer_requires_wallet_and_amount() {
        let (state, _) = test_state();
        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transfer-sol")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({ "amount": 0.1 })).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_transfer_for_same_session_conflicts() {
        let (state, store) = test_state();
        paid_session(&store, "cs_double");
        store.claim("cs_double").unwrap();

        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/transfer-sol")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({ "sessionId": "cs_double" })).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn retried_transfer_passes_the_existing_claim() {
        let (_, store) = test_state();
        paid_session(&store, "cs_retry");
        store.claim("cs_retry").unwrap();

        let session = claim_for_settlement(&*store, "cs_retry", true).unwrap();
        assert_eq!(session.status, SessionStatus::Settling);
    }

    #[tokio::test]
    async fn swap_tokens_requires_a_token_session() {
        let (state, store) = test_state();
        paid_session(&store, "cs_plain");

        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/swap-tokens")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({ "sessionId": "cs_plain" })).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn solend_lend_rejects_bad_user_key() {
        let (state, _) = test_state();
        let response = app_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/solend-lend")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&json!({
                            "pool": "main-usdc",
                            "amount": 2.5,
                            "userPublicKey": "nope"
                        }))
                        .unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn success_page_embeds_the_message() {
        let page = success_page(&json!({ "type": "PAYMENT_COMPLETE", "sessionId": "cs_1" }));
        assert!(page.contains("postMessage"));
        assert!(page.contains("\"sessionId\":\"cs_1\""));
    }

    #[tokio::test]
    async fn swap_session_token_descriptor_flows_through_claim() {
        let (_, store) = test_state();
        let session = PaymentSession::new(
            "cs_swap".to_owned(),
            WALLET.to_owned(),
            500,
            "usd".to_owned(),
            0.05,
            Some(TokenDescriptor {
                symbol: "USDC".to_owned(),
                mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_owned(),
                amount: Some(5.0),
            }),
        );
        store.create(session).unwrap();
        store
            .update("cs_swap", SessionPatch::status(SessionStatus::PaymentCompleted))
            .unwrap();

        let claimed = claim_for_settlement(&*store, "cs_swap", false).unwrap();
        assert!(claimed.is_token_swap);
        assert_eq!(claimed.token.unwrap().symbol, "USDC");
    }
}

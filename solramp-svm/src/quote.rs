//! HTTP client for the external liquidity aggregator.
//!
//! Requests swap quotes (`GET /quote`) and swap transactions
//! (`POST /swap`). Quotes are kept both parsed and raw: the raw JSON is
//! echoed back verbatim when requesting the swap transaction, so fields this
//! client does not model survive the round trip.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use solana_pubkey::Pubkey;
use solramp::RampError;
use solramp::retry::EXTERNAL_CALL_TIMEOUT;
use url::Url;

/// Upstream name used in error reporting.
const SERVICE: &str = "swap aggregator";

/// Default slippage tolerance in basis points.
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

/// Parameters for a quote request.
#[derive(Debug, Clone)]
pub struct QuoteParams {
    /// Input mint address (base58).
    pub input_mint: String,
    /// Output mint address (base58).
    pub output_mint: String,
    /// Input amount in the mint's smallest unit.
    pub amount: u64,
    /// Slippage tolerance in basis points.
    pub slippage_bps: u16,
}

/// Typed view over the fields this service needs from a quote.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteFields {
    out_amount: String,
    #[serde(default)]
    in_amount: Option<String>,
    #[serde(default)]
    output_mint: Option<String>,
    #[serde(default)]
    price_impact_pct: Option<String>,
    #[serde(default)]
    output_decimals: Option<u8>,
}

/// A swap quote: parsed essentials plus the raw aggregator response.
#[derive(Debug, Clone)]
pub struct SwapQuote {
    /// Quoted output amount in the output mint's smallest unit.
    pub out_amount: u64,
    /// Quoted input amount in lamports, when echoed by the aggregator.
    pub in_amount: Option<u64>,
    /// Output mint, as echoed by the aggregator.
    pub output_mint: Option<String>,
    /// Price impact percentage, passed through for display.
    pub price_impact_pct: Option<String>,
    /// Output mint decimals, when the aggregator includes them.
    pub output_decimals: Option<u8>,
    /// The raw quote response, echoed back in the swap request.
    pub raw: serde_json::Value,
}

impl SwapQuote {
    /// Output amount in UI units. Decimals default to 6 when the quote
    /// response does not carry them.
    #[must_use]
    pub fn ui_out_amount(&self) -> f64 {
        let decimals = self.output_decimals.unwrap_or(6);
        self.out_amount as f64 / 10f64.powi(i32::from(decimals))
    }

    fn from_raw(raw: serde_json::Value) -> Result<Self, RampError> {
        let fields: QuoteFields = serde_json::from_value(raw.clone())
            .map_err(|e| RampError::upstream(SERVICE, format!("malformed quote: {e}")))?;
        let out_amount = fields
            .out_amount
            .parse::<u64>()
            .map_err(|e| RampError::upstream(SERVICE, format!("bad outAmount: {e}")))?;
        let in_amount = fields.in_amount.and_then(|v| v.parse::<u64>().ok());
        Ok(Self {
            out_amount,
            in_amount,
            output_mint: fields.output_mint,
            price_impact_pct: fields.price_impact_pct,
            output_decimals: fields.output_decimals,
            raw,
        })
    }
}

/// A built swap transaction ready for signing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransaction {
    /// Base64-encoded serialized transaction.
    pub swap_transaction: String,
    /// Last block height at which the transaction is valid.
    #[serde(default)]
    pub last_valid_block_height: Option<u64>,
}

/// Client for the aggregator's quote and swap endpoints.
#[derive(Debug, Clone)]
pub struct SwapQuoteClient {
    client: reqwest::Client,
    quote_url: Url,
    swap_url: Url,
    timeout: Duration,
}

impl SwapQuoteClient {
    /// Creates a client for the given aggregator base URL.
    ///
    /// # Errors
    ///
    /// Returns [`RampError::Configuration`] when the base URL cannot form
    /// the endpoint URLs.
    pub fn new(base_url: &Url) -> Result<Self, RampError> {
        let join = |segment: &str| {
            base_url
                .join(segment)
                .map_err(|e| RampError::Configuration(format!("bad aggregator url: {e}")))
        };
        Ok(Self {
            client: reqwest::Client::new(),
            quote_url: join("quote")?,
            swap_url: join("swap")?,
            timeout: EXTERNAL_CALL_TIMEOUT,
        })
    }

    /// Overrides the per-request timeout (tests use short ones).
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches a quote for the given parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RampError::UpstreamUnavailable`] on transport failure,
    /// non-success status, or a malformed body.
    pub async fn quote(&self, params: &QuoteParams) -> Result<SwapQuote, RampError> {
        let response = self
            .client
            .get(self.quote_url.clone())
            .query(&[
                ("inputMint", params.input_mint.as_str()),
                ("outputMint", params.output_mint.as_str()),
                ("amount", &params.amount.to_string()),
                ("slippageBps", &params.slippage_bps.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RampError::upstream(SERVICE, format!("GET /quote: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RampError::upstream(
                SERVICE,
                format!("GET /quote returned {status}: {body}"),
            ));
        }
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RampError::upstream(SERVICE, format!("GET /quote body: {e}")))?;
        SwapQuote::from_raw(raw)
    }

    /// Builds a swap transaction from a quote, with the funding account as
    /// the executing party and automatic wrap/unwrap of native SOL.
    ///
    /// # Errors
    ///
    /// Returns [`RampError::UpstreamUnavailable`] on transport failure,
    /// non-success status, or a malformed body.
    pub async fn swap_transaction(
        &self,
        quote: &SwapQuote,
        user: &Pubkey,
    ) -> Result<SwapTransaction, RampError> {
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user.to_string(),
            "wrapAndUnwrapSol": true,
        });
        let response = self
            .client
            .post(self.swap_url.clone())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RampError::upstream(SERVICE, format!("POST /swap: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RampError::upstream(
                SERVICE,
                format!("POST /swap returned {status}: {text}"),
            ));
        }
        response
            .json::<SwapTransaction>()
            .await
            .map_err(|e| RampError::upstream(SERVICE, format!("POST /swap body: {e}")))
    }
}

//! Session creation: amount resolution, validation, and hand-off to the
//! hosted payment provider.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use solramp::{PaymentSession, RampError, SessionStore, TokenDescriptor, round_sol};
use tracing::info;
use url::Url;

use crate::config::CheckoutConfig;
use crate::oracle::PriceOracle;
use crate::payments::PaymentProvider;

/// Request body for `POST /create-checkout-session`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateSessionRequest {
    /// Destination wallet, base58.
    pub wallet_address: String,
    /// Optional buyer email, passed to the provider receipt.
    #[serde(default)]
    pub email: Option<String>,
    /// Optional ISO 3166-1 alpha-2 country, selects the charge currency.
    #[serde(default)]
    pub country: Option<String>,
    /// Explicit fiat amount in whole currency units.
    #[serde(default)]
    pub dollar_amount: Option<f64>,
    /// Explicit SOL amount. Takes precedence over `dollar_amount`.
    #[serde(default)]
    pub sol_amount: Option<f64>,
    /// Output token symbol for swap-and-deliver sessions.
    #[serde(default)]
    pub token_symbol: Option<String>,
    /// Output token mint for swap-and-deliver sessions.
    #[serde(default)]
    pub token_address: Option<String>,
    /// Requested output token amount, informational.
    #[serde(default)]
    pub token_amount: Option<f64>,
}

/// Response body for `POST /create-checkout-session`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    /// Hosted checkout URL to redirect the buyer to.
    pub url: String,
    /// Session id, also embedded in the provider's success redirect.
    pub session_id: String,
    /// SOL to deliver, rounded to 8 decimals.
    pub sol_amount: f64,
    /// Charge in minor units.
    pub fiat_amount: u64,
    /// Charge currency code.
    pub fiat_currency: String,
    /// Whether settlement will swap into a token.
    pub is_token_swap: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_amount: Option<f64>,
}

/// Creates payment sessions and hosted checkouts.
pub struct CheckoutService {
    store: Arc<dyn SessionStore>,
    oracle: Arc<dyn PriceOracle>,
    payments: Arc<dyn PaymentProvider>,
    config: CheckoutConfig,
    success_url: Url,
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService")
            .field("config", &self.config)
            .field("success_url", &self.success_url)
            .finish_non_exhaustive()
    }
}

impl CheckoutService {
    /// Creates the service over its collaborators.
    pub fn new(
        store: Arc<dyn SessionStore>,
        oracle: Arc<dyn PriceOracle>,
        payments: Arc<dyn PaymentProvider>,
        config: CheckoutConfig,
        success_url: Url,
    ) -> Self {
        Self {
            store,
            oracle,
            payments,
            config,
            success_url,
        }
    }

    /// Resolves amounts, persists the session, and creates the hosted
    /// checkout.
    ///
    /// # Errors
    ///
    /// Returns [`RampError::Validation`] for malformed input and
    /// [`RampError::UpstreamUnavailable`] when the oracle or provider
    /// fails.
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CreateSessionResponse, RampError> {
        validate_request(&request)?;

        let currency = self.currency_for(request.country.as_deref());
        let rate = self.oracle.sol_price(&currency).await?;
        let (fiat_amount, sol_amount) = self.resolve_amounts(&request, &currency, rate)?;

        let token = match (&request.token_symbol, &request.token_address) {
            (Some(symbol), Some(mint)) => Some(TokenDescriptor {
                symbol: symbol.clone(),
                mint: mint.clone(),
                amount: request.token_amount,
            }),
            _ => None,
        };

        let session = PaymentSession::new(
            new_session_id(),
            request.wallet_address,
            fiat_amount,
            currency,
            sol_amount,
            token,
        );
        info!(
            session_id = %session.id,
            fiat_amount,
            currency = %session.fiat_currency,
            sol_amount = session.sol_amount,
            is_token_swap = session.is_token_swap,
            "creating checkout session"
        );

        self.store.create(session.clone())?;
        let url = self
            .payments
            .create_checkout(&session, &self.success_url)
            .await?;

        Ok(CreateSessionResponse {
            url,
            session_id: session.id,
            sol_amount: session.sol_amount,
            fiat_amount: session.fiat_amount,
            fiat_currency: session.fiat_currency,
            is_token_swap: session.is_token_swap,
            token_symbol: session.token.as_ref().map(|t| t.symbol.clone()),
            token_amount: session.token.as_ref().and_then(|t| t.amount),
        })
    }

    fn currency_for(&self, country: Option<&str>) -> String {
        match country {
            Some(c) if c.eq_ignore_ascii_case(&self.config.regional_country) => {
                self.config.regional_currency.clone()
            }
            _ => self.config.default_currency.clone(),
        }
    }

    /// Returns `(fiat minor units, SOL)`. Precedence: explicit SOL, then
    /// explicit fiat, then the per-currency default charge.
    fn resolve_amounts(
        &self,
        request: &CreateSessionRequest,
        currency: &str,
        rate: f64,
    ) -> Result<(u64, f64), RampError> {
        let (fiat_minor, sol) = match (request.sol_amount, request.dollar_amount) {
            (Some(sol), _) if sol > 0.0 => {
                let minor = (sol * rate * 100.0).round();
                (minor, sol)
            }
            (_, Some(fiat)) if fiat > 0.0 => ((fiat * 100.0).round(), fiat / rate),
            _ => {
                let minor = if currency == self.config.regional_currency {
                    self.config.regional_amount_minor
                } else {
                    self.config.default_amount_minor
                };
                #[allow(clippy::cast_precision_loss)]
                let sol = (minor as f64 / 100.0) / rate;
                (minor as f64, sol)
            }
        };

        if !fiat_minor.is_finite() || fiat_minor < 1.0 {
            return Err(RampError::Configuration(format!(
                "resolved charge of {fiat_minor} minor units is not billable"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok((fiat_minor as u64, round_sol(sol)))
    }
}

fn validate_request(request: &CreateSessionRequest) -> Result<(), RampError> {
    if request.wallet_address.trim().is_empty() {
        return Err(RampError::Validation("walletAddress is required".into()));
    }
    if let Some(email) = &request.email {
        validate_email(email)?;
    }
    if let Some(country) = &request.country {
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RampError::Validation(format!(
                "country must be a 2-letter code, got {country:?}"
            )));
        }
    }
    for (name, value) in [
        ("solAmount", request.sol_amount),
        ("dollarAmount", request.dollar_amount),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(RampError::Validation(format!("{name} must be non-negative")));
            }
        }
    }
    if request.token_symbol.is_some() != request.token_address.is_some() {
        return Err(RampError::Validation(
            "tokenSymbol and tokenAddress must be provided together".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), RampError> {
    let invalid = || RampError::Validation(format!("invalid email: {email}"));
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(invalid());
    }
    Ok(())
}

fn new_session_id() -> String {
    format!(
        "cs_{}_{:08x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

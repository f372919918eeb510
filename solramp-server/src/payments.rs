//! Hosted checkout provider integration.
//!
//! The service never touches card data itself. It hands the buyer to a
//! hosted checkout page keyed by our session id, and later polls the
//! provider for payment status when a webhook has not arrived yet.

use std::time::Duration;

use serde::Deserialize;
use solramp::{PaymentSession, RampError};
use solramp_svm::BoxFuture;
use url::Url;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

/// Payment status as reported by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSessionStatus {
    /// Whether the fiat payment has settled on the provider side.
    pub paid: bool,
    /// Provider's own status string, passed through for diagnostics.
    pub status: String,
}

/// External fiat payment provider.
pub trait PaymentProvider: Send + Sync {
    /// Creates a hosted checkout for `session` and returns the URL the
    /// buyer should be redirected to. `success_url` is where the provider
    /// sends the buyer afterwards.
    fn create_checkout<'a>(
        &'a self,
        session: &'a PaymentSession,
        success_url: &'a Url,
    ) -> BoxFuture<'a, Result<String, RampError>>;

    /// Looks up payment status by our session id. `Ok(None)` means the
    /// provider does not know the session.
    fn fetch_status<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ProviderSessionStatus>, RampError>>;
}

/// HTTP client for a hosted-checkout provider with bearer-token auth.
#[derive(Debug, Clone)]
pub struct HostedCheckoutClient {
    client: reqwest::Client,
    checkout_url: Url,
    status_url: Url,
    secret_key: String,
}

#[derive(Deserialize)]
struct CheckoutCreated {
    url: String,
}

impl HostedCheckoutClient {
    /// Creates a client against the provider's API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`RampError::Configuration`] if the base URL cannot be joined.
    pub fn new(base_url: &Url, secret_key: impl Into<String>) -> Result<Self, RampError> {
        let join = |path: &str| {
            base_url
                .join(path)
                .map_err(|e| RampError::Configuration(format!("invalid provider url: {e}")))
        };
        Ok(Self {
            client: reqwest::Client::new(),
            checkout_url: join("checkout/sessions")?,
            status_url: join("checkout/sessions/")?,
            secret_key: secret_key.into(),
        })
    }

    async fn create(
        &self,
        session: &PaymentSession,
        success_url: &Url,
    ) -> Result<String, RampError> {
        let body = serde_json::json!({
            "clientReferenceId": session.id,
            "amount": session.fiat_amount,
            "currency": session.fiat_currency,
            "successUrl": format!("{success_url}?session_id={}", session.id),
        });
        let response = self
            .client
            .post(self.checkout_url.clone())
            .bearer_auth(&self.secret_key)
            .json(&body)
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .map_err(|e| RampError::upstream("payment provider", e.to_string()))?;

        if !response.status().is_success() {
            return Err(RampError::upstream(
                "payment provider",
                format!("checkout creation failed: status {}", response.status()),
            ));
        }
        let created: CheckoutCreated = response
            .json()
            .await
            .map_err(|e| RampError::upstream("payment provider", e.to_string()))?;
        Ok(created.url)
    }

    async fn status(&self, session_id: &str) -> Result<Option<ProviderSessionStatus>, RampError> {
        let url = self
            .status_url
            .join(session_id)
            .map_err(|e| RampError::Validation(format!("invalid session id: {e}")))?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.secret_key)
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .map_err(|e| RampError::upstream("payment provider", e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RampError::upstream(
                "payment provider",
                format!("status lookup failed: status {}", response.status()),
            ));
        }
        let status = response
            .json()
            .await
            .map_err(|e| RampError::upstream("payment provider", e.to_string()))?;
        Ok(Some(status))
    }
}

impl PaymentProvider for HostedCheckoutClient {
    fn create_checkout<'a>(
        &'a self,
        session: &'a PaymentSession,
        success_url: &'a Url,
    ) -> BoxFuture<'a, Result<String, RampError>> {
        Box::pin(self.create(session, success_url))
    }

    fn fetch_status<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ProviderSessionStatus>, RampError>> {
        Box::pin(self.status(session_id))
    }
}

//! SOL spot-price lookup against a CoinGecko-style price API.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use solramp::RampError;
use solramp_svm::BoxFuture;
use url::Url;

const ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of SOL/fiat exchange rates.
pub trait PriceOracle: Send + Sync {
    /// Returns the price of one SOL in `currency` (lowercase ISO code).
    fn sol_price<'a>(&'a self, currency: &'a str) -> BoxFuture<'a, Result<f64, RampError>>;
}

/// HTTP price oracle using the `simple/price` endpoint shape:
/// `GET {base}simple/price?ids=solana&vs_currencies={currency}` returning
/// `{"solana": {"usd": 171.23}}`.
#[derive(Debug, Clone)]
pub struct HttpPriceOracle {
    client: reqwest::Client,
    price_url: Url,
}

#[derive(Deserialize)]
struct PriceResponse {
    solana: HashMap<String, f64>,
}

impl HttpPriceOracle {
    /// Creates an oracle against `base_url` (trailing slash required for
    /// relative joins to work).
    ///
    /// # Errors
    ///
    /// Returns [`RampError::Configuration`] if the base URL cannot be joined.
    pub fn new(base_url: &Url) -> Result<Self, RampError> {
        let price_url = base_url
            .join("simple/price")
            .map_err(|e| RampError::Configuration(format!("invalid price oracle url: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            price_url,
        })
    }

    async fn fetch(&self, currency: &str) -> Result<f64, RampError> {
        let currency = currency.to_ascii_lowercase();
        let response = self
            .client
            .get(self.price_url.clone())
            .query(&[("ids", "solana"), ("vs_currencies", currency.as_str())])
            .timeout(ORACLE_TIMEOUT)
            .send()
            .await
            .map_err(|e| RampError::upstream("price oracle", e.to_string()))?;

        if !response.status().is_success() {
            return Err(RampError::upstream(
                "price oracle",
                format!("status {}", response.status()),
            ));
        }

        let prices: PriceResponse = response
            .json()
            .await
            .map_err(|e| RampError::upstream("price oracle", e.to_string()))?;

        let rate = prices
            .solana
            .get(&currency)
            .copied()
            .ok_or_else(|| RampError::upstream("price oracle", format!("no {currency} rate")))?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RampError::upstream(
                "price oracle",
                format!("unusable {currency} rate: {rate}"),
            ));
        }
        Ok(rate)
    }
}

impl PriceOracle for HttpPriceOracle {
    fn sol_price<'a>(&'a self, currency: &'a str) -> BoxFuture<'a, Result<f64, RampError>> {
        Box::pin(self.fetch(currency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn oracle_for(server: &MockServer) -> HttpPriceOracle {
        let base = Url::parse(&server.uri()).unwrap();
        HttpPriceOracle::new(&base).unwrap()
    }

    #[tokio::test]
    async fn fetches_rate_for_requested_currency() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "solana"))
            .and(query_param("vs_currencies", "brl"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "solana": { "brl": 845.5 }
                })),
            )
            .mount(&server)
            .await;

        let oracle = oracle_for(&server).await;
        let rate = oracle.sol_price("BRL").await.unwrap();
        assert_eq!(rate, 845.5);
    }

    #[tokio::test]
    async fn missing_currency_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "solana": { "usd": 171.0 }
                })),
            )
            .mount(&server)
            .await;

        let oracle = oracle_for(&server).await;
        let err = oracle.sol_price("eur").await.unwrap_err();
        assert!(matches!(err, RampError::UpstreamUnavailable { .. }));
    }

    #[tokio::test]
    async fn http_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let oracle = oracle_for(&server).await;
        let err = oracle.sol_price("usd").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn zero_rate_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "solana": { "usd": 0.0 }
                })),
            )
            .mount(&server)
            .await;

        let oracle = oracle_for(&server).await;
        assert!(oracle.sol_price("usd").await.is_err());
    }
}

//! Server configuration.
//!
//! Loaded from a TOML file with `$VAR` / `${VAR}` environment expansion in
//! string values, so secrets stay out of the file itself.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4080
//! rpc_url = "https://api.mainnet-beta.solana.com"
//! funding_secret = "$FUNDING_SECRET"
//! confirmation = "optimistic"
//!
//! [payment_provider]
//! base_url = "https://api.payments.example/"
//! secret_key = "$PAYMENT_PROVIDER_KEY"
//!
//! [checkout]
//! default_currency = "usd"
//! default_amount_minor = 500
//! regional_currency = "brl"
//! regional_country = "BR"
//! regional_amount_minor = 2500
//!
//! [lend.pools.main-usdc]
//! program_id = "So1endDq2YkqhipRh3WViPa8hdiSpxWy6z3Z6tMCpAo"
//! # ... remaining pool accounts
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to configuration file (default: `config.toml`)
//! - `HOST` / `PORT` — Override server bind address and port
//! - Secrets referenced by `$VAR` in the config file

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;
use solana_pubkey::Pubkey;
use solramp::RampError;
use solramp_svm::executor::ConfirmationStrategy;
use solramp_svm::lend::LendingPool;
use url::Url;

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4080`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Solana RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Swap aggregator base URL.
    #[serde(default = "default_aggregator_url")]
    pub aggregator_url: Url,

    /// Price oracle base URL.
    #[serde(default = "default_oracle_url")]
    pub price_oracle_url: Url,

    /// Funding account secret (base58 or JSON keyfile bytes). Supports
    /// `$VAR` expansion; left unresolved it fails at call time, not load.
    #[serde(default)]
    pub funding_secret: String,

    /// Broadcast confirmation policy.
    #[serde(default)]
    pub confirmation: ConfirmationStrategy,

    /// External payment provider settings.
    pub payment_provider: PaymentProviderConfig,

    /// Checkout amount and currency defaults.
    #[serde(default)]
    pub checkout: CheckoutConfig,

    /// Lending protocol settings.
    #[serde(default)]
    pub lend: LendConfig,
}

/// Hosted payment provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentProviderConfig {
    /// Provider API base URL.
    pub base_url: Url,

    /// Provider API secret.
    #[serde(default)]
    pub secret_key: String,

    /// Where the provider sends the buyer after a successful payment.
    /// Defaults to this service's own `/payment-success` page.
    #[serde(default)]
    pub success_url: Option<Url>,
}

/// Checkout defaults: supported currencies and their default charges.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    /// Default fiat currency code.
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Default charge in minor units of the default currency.
    #[serde(default = "default_amount_minor")]
    pub default_amount_minor: u64,

    /// Alternate regional currency code.
    #[serde(default = "regional_currency")]
    pub regional_currency: String,

    /// Country code that selects the regional currency.
    #[serde(default = "regional_country")]
    pub regional_country: String,

    /// Default charge in minor units of the regional currency.
    #[serde(default = "regional_amount_minor")]
    pub regional_amount_minor: u64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            default_currency: default_currency(),
            default_amount_minor: default_amount_minor(),
            regional_currency: regional_currency(),
            regional_country: regional_country(),
            regional_amount_minor: regional_amount_minor(),
        }
    }
}

/// Lending protocol configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LendConfig {
    /// Pools keyed by name, as used in `POST /solend-lend`.
    #[serde(default)]
    pub pools: HashMap<String, LendingPoolConfig>,
}

/// One lending pool, with base58-encoded account addresses.
#[derive(Debug, Clone, Deserialize)]
pub struct LendingPoolConfig {
    /// Lending program id.
    pub program_id: String,
    /// Reserve account.
    pub reserve: String,
    /// Deposited liquidity mint.
    pub liquidity_mint: String,
    /// Reserve liquidity supply account.
    pub liquidity_supply: String,
    /// Reserve collateral mint.
    pub collateral_mint: String,
    /// Lending market account.
    pub lending_market: String,
    /// Lending market authority PDA.
    pub market_authority: String,
}

impl LendingPoolConfig {
    /// Parses the base58 addresses into a typed pool descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RampError::Configuration`] for any unparseable address.
    pub fn parse(&self, name: &str) -> Result<LendingPool, RampError> {
        let key = |label: &str, value: &str| -> Result<Pubkey, RampError> {
            value.parse().map_err(|_| {
                RampError::Configuration(format!("pool {name}: invalid {label}: {value}"))
            })
        };
        Ok(LendingPool {
            program_id: key("program_id", &self.program_id)?,
            reserve: key("reserve", &self.reserve)?,
            liquidity_mint: key("liquidity_mint", &self.liquidity_mint)?,
            liquidity_supply: key("liquidity_supply", &self.liquidity_supply)?,
            collateral_mint: key("collateral_mint", &self.collateral_mint)?,
            lending_market: key("lending_market", &self.lending_market)?,
            market_authority: key("market_authority", &self.market_authority)?,
        })
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4080
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_owned()
}

fn default_aggregator_url() -> Url {
    Url::parse("https://quote-api.jup.ag/v6/").expect("static url")
}

fn default_oracle_url() -> Url {
    Url::parse("https://api.coingecko.com/api/v3/").expect("static url")
}

fn default_currency() -> String {
    "usd".to_owned()
}

fn default_amount_minor() -> u64 {
    500
}

fn regional_currency() -> String {
    "brl".to_owned()
}

fn regional_country() -> String {
    "BR".to_owned()
}

fn regional_amount_minor() -> u64 {
    2500
}

impl ServerConfig {
    /// Loads configuration from the path in the `CONFIG` environment
    /// variable, falling back to `config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path, expanding `$VAR` /
    /// `${VAR}` references and applying `HOST` / `PORT` overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };
        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        Ok(config)
    }
}

/// Expands `$VAR` and `${VAR}` references from the process environment.
/// Unresolved references are left in place.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 1..];

        let (braced, name_src) = match rest.strip_prefix('{') {
            Some(inner) => (true, inner),
            None => (false, rest),
        };
        let name_len = name_src
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(name_src.len());
        let name = &name_src[..name_len];
        let closed = braced && name_src[name_len..].starts_with('}');

        let consumed = if braced {
            // `${NAME}` needs the closing brace to count as a reference.
            if closed { 1 + name_len + 1 } else { 0 }
        } else {
            name_len
        };

        if consumed == 0 || name.is_empty() {
            out.push('$');
            continue;
        }
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
                out.push('$');
                if braced {
                    out.push('{');
                }
                out.push_str(name);
                if braced {
                    out.push('}');
                }
            }
        }
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_both_reference_styles() {
        // Safety: test-local env var names are unique to this test binary.
        unsafe {
            std::env::set_var("SOLRAMP_TEST_KEY", "sk_123");
        }
        assert_eq!(expand_env_vars("key = \"$SOLRAMP_TEST_KEY\""), "key = \"sk_123\"");
        assert_eq!(
            expand_env_vars("key = \"${SOLRAMP_TEST_KEY}\""),
            "key = \"sk_123\""
        );
    }

    #[test]
    fn leaves_unresolved_references() {
        assert_eq!(
            expand_env_vars("key = \"$SOLRAMP_TEST_MISSING\""),
            "key = \"$SOLRAMP_TEST_MISSING\""
        );
        assert_eq!(
            expand_env_vars("key = \"${SOLRAMP_TEST_MISSING}\""),
            "key = \"${SOLRAMP_TEST_MISSING}\""
        );
        assert_eq!(expand_env_vars("100$ and $"), "100$ and $");
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [payment_provider]
            base_url = "https://api.payments.example/"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 4080);
        assert_eq!(config.checkout.default_currency, "usd");
        assert_eq!(config.checkout.regional_country, "BR");
        assert_eq!(config.confirmation, ConfirmationStrategy::Optimistic);
        assert!(config.lend.pools.is_empty());
    }

    #[test]
    fn confirmation_strategy_parses_kebab_case() {
        let config: ServerConfig = toml::from_str(
            r#"
            confirmation = "wait-for-finalized"
            [payment_provider]
            base_url = "https://api.payments.example/"
            "#,
        )
        .unwrap();
        assert_eq!(config.confirmation, ConfirmationStrategy::WaitForFinalized);
    }

    #[test]
    fn pool_config_parses_addresses() {
        let pool = LendingPoolConfig {
            program_id: "So1endDq2YkqhipRh3WViPa8hdiSpxWy6z3Z6tMCpAo".to_owned(),
            reserve: "BgxfHJDzm44T7XG68MYKx7YisTjZu73tVovyZSjJMpmw".to_owned(),
            liquidity_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_owned(),
            liquidity_supply: "8SheGtsopRUDzdiD6v6BR9a6bqZ9QwywYQY99Fp5meNf".to_owned(),
            collateral_mint: "993dVFL2uXWYeoXuEBFXR4BijeXdTv4s6BzsCjJZuwqk".to_owned(),
            lending_market: "4UpD2fh7xH3VP9QQaXtsS1YY3bxzWhtfpks7FatyKvdY".to_owned(),
            market_authority: "DdZR6zRFiUt4S5mg7AV1uKB2z1f1WzcNYCaTEEWPAuby".to_owned(),
        };
        assert!(pool.parse("main-usdc").is_ok());

        let mut bad = pool;
        bad.reserve = "not-a-key".to_owned();
        assert!(matches!(
            bad.parse("main-usdc"),
            Err(RampError::Configuration(_))
        ));
    }
}

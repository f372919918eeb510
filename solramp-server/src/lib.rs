//! HTTP service for the solramp on-ramp.
//!
//! Exposes the checkout and settlement API over axum: checkout session
//! creation, the payment-success callback page, session status, direct SOL
//! transfers, swap-and-deliver, raw swap quotes and lending deposits.
//!
//! The binary in `main.rs` wires the real collaborators (RPC provider,
//! funding signer, price oracle, payment provider, swap aggregator); tests
//! substitute fakes behind the same traits.

pub mod checkout;
pub mod config;
pub mod error;
pub mod handlers;
pub mod oracle;
pub mod payments;

pub use config::ServerConfig;
pub use error::ApiError;
pub use handlers::{AppState, SharedState, app_router};

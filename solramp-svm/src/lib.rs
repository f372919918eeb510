//! Solana settlement layer for the solramp on-ramp.
//!
//! Everything that touches the chain or the liquidity aggregator lives here:
//!
//! - [`provider`] — RPC provider abstraction and the real client over
//!   `solana-client`.
//! - [`signer`] — the funding account signer, configured from a secret.
//! - [`fees`] — bounded priority-fee estimation from recent network samples.
//! - [`quote`] — HTTP client for swap quotes and swap transactions.
//! - [`executor`] — the settlement executor: direct SOL transfers and the
//!   swap-and-deliver pipeline, with session updates.
//! - [`lend`] — unsigned lending-protocol deposit transactions.
//! - [`explorer`] — explorer link formatting.
//!
//! Broadcasts do not wait for finality by default: the executor submits,
//! performs one status probe and returns, trading certainty for perceived
//! latency. Deployments that need stronger guarantees set
//! [`executor::ConfirmationStrategy::WaitForFinalized`].

pub mod executor;
pub mod explorer;
pub mod fees;
pub mod lend;
pub mod provider;
pub mod quote;
pub mod signer;

pub use executor::{ConfirmationStrategy, SettlementExecutor};
pub use provider::{BoxFuture, FeeSample, ProbeStatus, ProviderError, RpcProvider, SolanaProvider};
pub use signer::FundingSigner;

/// Native SOL wrapped mint address.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Lamports per SOL.
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

//! RPC provider abstraction.
//!
//! The executor and fee estimator talk to the chain through
//! [`SolanaProvider`], so tests can substitute an in-memory fake.
//! [`RpcProvider`] is the production implementation over the non-blocking
//! `solana-client` RPC client.

use std::future::Future;
use std::pin::Pin;

use solana_commitment_config::CommitmentConfig;
use solana_hash::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;

/// Boxed future used to keep [`SolanaProvider`] object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from the RPC provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// RPC transport or node error.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The referenced account does not exist or cannot be parsed.
    #[error("account error: {0}")]
    Account(String),
}

impl ProviderError {
    /// Whether the error is a transient network/expiry condition worth a
    /// bounded retry (checkpoint expiry, timeouts, node congestion).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rpc(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("blockhash")
                    || msg.contains("block height exceeded")
                    || msg.contains("expired")
                    || msg.contains("timed out")
                    || msg.contains("timeout")
                    || msg.contains("node is behind")
            }
            Self::Account(_) => false,
        }
    }
}

/// One recent prioritization-fee observation.
#[derive(Debug, Clone, Copy)]
pub struct FeeSample {
    /// Slot the observation was taken in.
    pub slot: u64,
    /// Per-compute-unit price paid, in micro-lamports.
    pub micro_lamports: u64,
}

/// Outcome of a single non-blocking signature probe.
#[derive(Debug, Clone)]
pub enum ProbeStatus {
    /// The transaction has been seen and processed without error.
    Landed,
    /// The transaction is not visible yet; submission may still succeed.
    Pending,
    /// The transaction was processed and failed.
    Failed(String),
}

/// Chain access needed by settlement.
///
/// Object-safe so executors can hold `Arc<dyn SolanaProvider>`; methods
/// return [`BoxFuture`]s for that reason.
pub trait SolanaProvider: Send + Sync {
    /// Fetches a recent blockhash with a short validity window.
    fn latest_blockhash(&self) -> BoxFuture<'_, Result<Hash, ProviderError>>;

    /// Samples recent prioritization fees observed by the node.
    fn recent_prioritization_fees(&self) -> BoxFuture<'_, Result<Vec<FeeSample>, ProviderError>>;

    /// Broadcasts a signed transaction without waiting for confirmation.
    fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> BoxFuture<'_, Result<Signature, ProviderError>>;

    /// One best-effort status probe; never blocks for finality.
    fn probe_signature(
        &self,
        signature: &Signature,
    ) -> BoxFuture<'_, Result<ProbeStatus, ProviderError>>;

    /// Blocks until the transaction reaches finalized commitment.
    fn confirm_finalized(&self, signature: &Signature)
    -> BoxFuture<'_, Result<(), ProviderError>>;

    /// Whether an account exists on chain.
    fn account_exists(&self, pubkey: &Pubkey) -> BoxFuture<'_, Result<bool, ProviderError>>;

    /// Decimal count of an SPL token mint.
    fn mint_decimals(&self, mint: &Pubkey) -> BoxFuture<'_, Result<u8, ProviderError>>;
}

/// Production provider over the non-blocking RPC client.
pub struct RpcProvider {
    rpc: solana_client::nonblocking::rpc_client::RpcClient,
}

impl std::fmt::Debug for RpcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcProvider")
            .field("url", &self.rpc.url())
            .finish()
    }
}

impl RpcProvider {
    /// Creates a provider for the given RPC endpoint.
    #[must_use]
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc: solana_client::nonblocking::rpc_client::RpcClient::new_with_commitment(
                rpc_url,
                CommitmentConfig::confirmed(),
            ),
        }
    }
}

impl SolanaProvider for RpcProvider {
    fn latest_blockhash(&self) -> BoxFuture<'_, Result<Hash, ProviderError>> {
        Box::pin(async move {
            self.rpc
                .get_latest_blockhash()
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))
        })
    }

    fn recent_prioritization_fees(&self) -> BoxFuture<'_, Result<Vec<FeeSample>, ProviderError>> {
        Box::pin(async move {
            let fees = self
                .rpc
                .get_recent_prioritization_fees(&[])
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))?;
            Ok(fees
                .into_iter()
                .map(|f| FeeSample {
                    slot: f.slot,
                    micro_lamports: f.prioritization_fee,
                })
                .collect())
        })
    }

    fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> BoxFuture<'_, Result<Signature, ProviderError>> {
        let transaction = transaction.clone();
        Box::pin(async move {
            self.rpc
                .send_transaction(&transaction)
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))
        })
    }

    fn probe_signature(
        &self,
        signature: &Signature,
    ) -> BoxFuture<'_, Result<ProbeStatus, ProviderError>> {
        let signature = *signature;
        Box::pin(async move {
            let status = self
                .rpc
                .get_signature_status(&signature)
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))?;
            Ok(match status {
                Some(Ok(())) => ProbeStatus::Landed,
                Some(Err(e)) => ProbeStatus::Failed(e.to_string()),
                None => ProbeStatus::Pending,
            })
        })
    }

    fn confirm_finalized(
        &self,
        signature: &Signature,
    ) -> BoxFuture<'_, Result<(), ProviderError>> {
        let signature = *signature;
        Box::pin(async move {
            self.rpc
                .poll_for_signature_with_commitment(&signature, CommitmentConfig::finalized())
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))
        })
    }

    fn account_exists(&self, pubkey: &Pubkey) -> BoxFuture<'_, Result<bool, ProviderError>> {
        let pubkey = *pubkey;
        Box::pin(async move {
            let response = self
                .rpc
                .get_account_with_commitment(&pubkey, CommitmentConfig::confirmed())
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))?;
            Ok(response.value.is_some())
        })
    }

    fn mint_decimals(&self, mint: &Pubkey) -> BoxFuture<'_, Result<u8, ProviderError>> {
        let mint = *mint;
        Box::pin(async move {
            let account = self
                .rpc
                .get_account(&mint)
                .await
                .map_err(|e| ProviderError::Rpc(e.to_string()))?;
            let state = spl_token::state::Mint::unpack(&account.data)
                .map_err(|e| ProviderError::Account(format!("failed to unpack mint {mint}: {e}")))?;
            Ok(state.decimals)
        })
    }
}

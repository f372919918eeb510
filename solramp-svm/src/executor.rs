//! Settlement execution.
//!
//! Converts a completed fiat payment into an on-chain action: either a
//! direct SOL transfer to the destination wallet, or a SOL-to-token swap
//! followed by a delivery transfer of the swapped tokens.
//!
//! The executor never claims sessions itself; callers claim through the
//! store before invoking it, so at most one execution is in flight per
//! session id. Broadcasts follow the configured [`ConfirmationStrategy`]:
//! the default submits and performs one non-blocking status probe, so a
//! reported success guarantees submission, not finality.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_instruction::Instruction;
use solana_message::VersionedMessage;
use solana_message::v0::Message as MessageV0;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use solramp::RampError;
use solramp::retry::{RetryPolicy, retry_with_backoff};
use solramp::session::{SessionPatch, SessionStatus};
use solramp::store::SessionStore;

use crate::LAMPORTS_PER_SOL;
use crate::explorer;
use crate::fees::PriorityFeeEstimator;
use crate::provider::{ProbeStatus, ProviderError, SolanaProvider};
use crate::quote::{DEFAULT_SLIPPAGE_BPS, QuoteParams, SwapQuoteClient};
use crate::signer::FundingSigner;

/// Maximum caller-driven retry attempts for a transient transfer failure.
pub const MAX_TRANSFER_RETRIES: u32 = 3;

/// How broadcasts wait (or don't) for network confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationStrategy {
    /// Submit, probe once, return. Optimizes perceived latency; the user
    /// holds an explorer link to check later.
    #[default]
    Optimistic,
    /// Block until the transaction reaches finalized commitment.
    WaitForFinalized,
}

/// Successful direct transfer result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    /// Broadcast transaction signature.
    pub signature: String,
    /// Solscan link for the signature.
    pub explorer_link: String,
    /// Transferred amount in SOL.
    pub amount: f64,
}

/// Failed direct transfer attempt.
///
/// Retry orchestration belongs to the caller: for transient failures under
/// the retry cap, `retry_scheduled` is set and `retry_count` incremented.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct TransferError {
    /// Underlying failure.
    #[source]
    pub source: RampError,
    /// Whether the caller should retry this attempt.
    pub retry_scheduled: bool,
    /// Attempt counter to pass to the retried call.
    pub retry_count: u32,
}

/// Step kind of a swap-and-deliver transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// The aggregator swap transaction.
    Swap,
    /// The token delivery transfer.
    Transfer,
}

/// One broadcast step of the swap-and-deliver pipeline.
///
/// Partial progress stays visible through these records: a swap that
/// broadcasts before delivery fails leaves a distinguishable id behind for
/// manual reconciliation (on-chain transactions are not reversible).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Transaction signature.
    pub id: String,
    /// Which pipeline step produced it.
    #[serde(rename = "type")]
    pub kind: TxKind,
    /// Submission status.
    pub status: String,
    /// Human-readable description of the step.
    pub description: String,
    /// Solscan link.
    pub explorer_link: String,
}

/// Successful swap-and-deliver result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOutcome {
    /// The broadcast transactions, in pipeline order.
    pub transactions: Vec<TransactionRecord>,
    /// Output token mint address.
    pub final_token: String,
    /// Realized output amount in UI units.
    pub delivered_amount: f64,
    /// Human-readable summary.
    pub message: String,
}

/// Failed swap-and-deliver attempt, carrying whatever already broadcast.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct SwapError {
    /// Underlying failure.
    #[source]
    pub source: RampError,
    /// Transactions broadcast before the failure.
    pub transactions: Vec<TransactionRecord>,
}

/// Executes settlements against the chain and records them in the store.
pub struct SettlementExecutor {
    provider: Arc<dyn SolanaProvider>,
    signer: Arc<FundingSigner>,
    store: Arc<dyn SessionStore>,
    quotes: SwapQuoteClient,
    confirmation: ConfirmationStrategy,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SettlementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementExecutor")
            .field("funding", &self.signer.pubkey())
            .field("confirmation", &self.confirmation)
            .finish_non_exhaustive()
    }
}

impl SettlementExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        provider: Arc<dyn SolanaProvider>,
        signer: Arc<FundingSigner>,
        store: Arc<dyn SessionStore>,
        quotes: SwapQuoteClient,
        confirmation: ConfirmationStrategy,
    ) -> Self {
        Self {
            provider,
            signer,
            store,
            quotes,
            confirmation,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy for external calls (tests shorten it).
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Transfers SOL from the funding account to `wallet_address`.
    ///
    /// On success, updates the session (when `session_id` is given and
    /// known) to `sol_transferred`, or `sol_received` for swap sessions.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`]: validation failures never reach
    /// broadcast; transient network/expiry failures set `retry_scheduled`
    /// while `retry_count` is under [`MAX_TRANSFER_RETRIES`]; everything
    /// else is fatal for this attempt.
    pub async fn transfer_sol(
        &self,
        wallet_address: &str,
        amount: f64,
        session_id: Option<&str>,
        retry_count: u32,
    ) -> Result<TransferOutcome, TransferError> {
        let result = self
            .transfer_sol_inner(wallet_address, amount, session_id)
            .await;
        match result {
            Ok(outcome) => Ok(outcome),
            Err(source) => {
                let retry_scheduled = source.is_transient() && retry_count < MAX_TRANSFER_RETRIES;
                if !retry_scheduled {
                    self.record_failure(session_id, &source);
                }
                Err(TransferError {
                    source,
                    retry_scheduled,
                    retry_count: retry_count + 1,
                })
            }
        }
    }

    async fn transfer_sol_inner(
        &self,
        wallet_address: &str,
        amount: f64,
        session_id: Option<&str>,
    ) -> Result<TransferOutcome, RampError> {
        let destination: Pubkey = wallet_address
            .parse()
            .map_err(|_| RampError::Validation(format!("invalid wallet address: {wallet_address}")))?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(RampError::Validation(format!(
                "transfer amount must be a positive number, got {amount}"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let lamports = (amount * LAMPORTS_PER_SOL).round() as u64;

        let funding = self.signer.pubkey();
        let blockhash = self
            .provider
            .latest_blockhash()
            .await
            .map_err(submission_error)?;
        let priority_fee = PriorityFeeEstimator::estimate(self.provider.as_ref()).await;

        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_price(priority_fee),
            solana_system_interface::instruction::transfer(&funding, &destination, lamports),
        ];
        let message = MessageV0::try_compile(&funding, &instructions, &[], blockhash)
            .map_err(|e| RampError::fatal_submission(format!("message compile: {e}")))?;
        let transaction = self.signer.sign_versioned(VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::V0(message),
        })?;

        let signature = self.broadcast(&transaction).await?;
        let signature_str = signature.to_string();
        tracing::info!(
            signature = %signature_str,
            wallet = %destination,
            amount,
            "SOL transfer broadcast"
        );

        if let Some(id) = session_id {
            self.record_transfer(id, &signature_str);
        }

        Ok(TransferOutcome {
            explorer_link: explorer::tx_link(&signature_str),
            signature: signature_str,
            amount,
        })
    }

    /// Swaps SOL for `output_token_address` and delivers the output to
    /// `wallet_address`.
    ///
    /// Each external step retries with capped exponential backoff. Quote or
    /// swap-build exhaustion surfaces as `UpstreamUnavailable` without
    /// touching state beyond what prior steps committed.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError`] carrying any transactions already broadcast.
    pub async fn swap_and_deliver(
        &self,
        wallet_address: &str,
        session_id: Option<&str>,
        output_token_address: &str,
        sol_amount: f64,
    ) -> Result<SwapOutcome, SwapError> {
        let mut records: Vec<TransactionRecord> = Vec::with_capacity(2);
        match self
            .swap_and_deliver_inner(wallet_address, session_id, output_token_address, sol_amount, &mut records)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(source) => {
                self.record_failure(session_id, &source);
                Err(SwapError {
                    source,
                    transactions: records,
                })
            }
        }
    }

    async fn swap_and_deliver_inner(
        &self,
        wallet_address: &str,
        session_id: Option<&str>,
        output_token_address: &str,
        sol_amount: f64,
        records: &mut Vec<TransactionRecord>,
    ) -> Result<SwapOutcome, RampError> {
        let recipient: Pubkey = wallet_address
            .parse()
            .map_err(|_| RampError::Validation(format!("invalid wallet address: {wallet_address}")))?;
        let output_mint: Pubkey = output_token_address.parse().map_err(|_| {
            RampError::Validation(format!("invalid token address: {output_token_address}"))
        })?;
        if !sol_amount.is_finite() || sol_amount <= 0.0 {
            return Err(RampError::Validation(format!(
                "swap amount must be a positive number, got {sol_amount}"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let lamports = (sol_amount * LAMPORTS_PER_SOL).round() as u64;
        let funding = self.signer.pubkey();

        // Step 1: quote.
        let params = QuoteParams {
            input_mint: crate::SOL_MINT.to_owned(),
            output_mint: output_token_address.to_owned(),
            amount: lamports,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
        };
        let quote = retry_with_backoff(self.retry, "quote", RampError::is_transient, || {
            self.quotes.quote(&params)
        })
        .await?;

        // Step 2: swap transaction built by the aggregator.
        let swap_tx = retry_with_backoff(self.retry, "swap", RampError::is_transient, || {
            self.quotes.swap_transaction(&quote, &funding)
        })
        .await?;

        // Step 3: deserialize, sign, broadcast. Resending the identical
        // transaction is idempotent (same signature), so transient
        // broadcast errors retry safely.
        let transaction = decode_transaction(&swap_tx.swap_transaction)?;
        let transaction = self.signer.sign_versioned(transaction)?;
        let swap_sig = retry_with_backoff(
            self.retry,
            "swap broadcast",
            RampError::is_transient,
            || self.broadcast(&transaction),
        )
        .await?;
        let swap_sig = swap_sig.to_string();
        records.push(TransactionRecord {
            id: swap_sig.clone(),
            kind: TxKind::Swap,
            status: "submitted".to_owned(),
            description: format!("Swap {sol_amount} SOL for {output_token_address}"),
            explorer_link: explorer::tx_link(&swap_sig),
        });
        if let Some(id) = session_id {
            self.update_session(
                id,
                SessionPatch {
                    status: Some(SessionStatus::SolReceived),
                    swap_tx_id: Some(swap_sig.clone()),
                    explorer_link: Some(explorer::tx_link(&swap_sig)),
                    ..SessionPatch::default()
                },
            );
        }

        // Step 4: resolve token accounts; create the recipient's if absent.
        let funding_ata = spl_associated_token_account::get_associated_token_address(
            &funding,
            &output_mint,
        );
        let recipient_ata = spl_associated_token_account::get_associated_token_address(
            &recipient,
            &output_mint,
        );
        let recipient_ata_exists = self
            .provider
            .account_exists(&recipient_ata)
            .await
            .map_err(submission_error)?;

        // Step 5: delivery transfer, fee-paid and signed by funding.
        let decimals = quote.output_decimals.unwrap_or(6);
        let priority_fee = PriorityFeeEstimator::estimate(self.provider.as_ref()).await;
        let mut instructions: Vec<Instruction> =
            vec![ComputeBudgetInstruction::set_compute_unit_price(priority_fee)];
        if !recipient_ata_exists {
            instructions.push(
                spl_associated_token_account::instruction::create_associated_token_account(
                    &funding,
                    &recipient,
                    &output_mint,
                    &spl_token::ID,
                ),
            );
        }
        instructions.push(
            spl_token::instruction::transfer_checked(
                &spl_token::ID,
                &funding_ata,
                &output_mint,
                &recipient_ata,
                &funding,
                &[],
                quote.out_amount,
                decimals,
            )
            .map_err(|e| RampError::fatal_submission(format!("transfer instruction: {e}")))?,
        );

        let blockhash = self
            .provider
            .latest_blockhash()
            .await
            .map_err(submission_error)?;
        let message = MessageV0::try_compile(&funding, &instructions, &[], blockhash)
            .map_err(|e| RampError::fatal_submission(format!("message compile: {e}")))?;
        let delivery = self.signer.sign_versioned(VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::V0(message),
        })?;
        let delivery_sig = retry_with_backoff(
            self.retry,
            "delivery broadcast",
            RampError::is_transient,
            || self.broadcast(&delivery),
        )
        .await?;
        let delivery_sig = delivery_sig.to_string();
        let delivered_amount = quote.ui_out_amount();
        records.push(TransactionRecord {
            id: delivery_sig.clone(),
            kind: TxKind::Transfer,
            status: "submitted".to_owned(),
            description: format!("Deliver {delivered_amount} tokens to {recipient}"),
            explorer_link: explorer::tx_link(&delivery_sig),
        });

        // Step 6: both broadcasts done; settle the session.
        if let Some(id) = session_id {
            self.update_session(
                id,
                SessionPatch {
                    status: Some(SessionStatus::TokenSwapCompleted),
                    transfer_tx_id: Some(delivery_sig.clone()),
                    delivery_explorer_link: Some(explorer::tx_link(&delivery_sig)),
                    delivered_amount: Some(delivered_amount),
                    transfer_timestamp: Some(Utc::now()),
                    ..SessionPatch::default()
                },
            );
        }
        tracing::info!(
            swap = %swap_sig,
            delivery = %delivery_sig,
            token = %output_mint,
            delivered_amount,
            "Swap-and-deliver complete"
        );

        Ok(SwapOutcome {
            transactions: std::mem::take(records),
            final_token: output_token_address.to_owned(),
            delivered_amount,
            message: format!(
                "Swapped {sol_amount} SOL and delivered {delivered_amount} tokens"
            ),
        })
    }

    /// Broadcasts per the configured confirmation strategy.
    async fn broadcast(&self, transaction: &VersionedTransaction) -> Result<Signature, RampError> {
        let signature = self
            .provider
            .send_transaction(transaction)
            .await
            .map_err(submission_error)?;
        match self.confirmation {
            ConfirmationStrategy::Optimistic => {
                // Best effort: a probe error never fails the settlement,
                // but a probed on-chain failure does.
                match self.provider.probe_signature(&signature).await {
                    Ok(ProbeStatus::Failed(reason)) => {
                        return Err(RampError::fatal_submission(format!(
                            "transaction {signature} failed: {reason}"
                        )));
                    }
                    Ok(ProbeStatus::Landed | ProbeStatus::Pending) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "Status probe failed, continuing");
                    }
                }
            }
            ConfirmationStrategy::WaitForFinalized => {
                self.provider
                    .confirm_finalized(&signature)
                    .await
                    .map_err(submission_error)?;
            }
        }
        Ok(signature)
    }

    /// Records a successful direct transfer on the session.
    fn record_transfer(&self, session_id: &str, signature: &str) {
        let Some(session) = self.store.get(session_id) else {
            tracing::warn!(session_id, "Transfer done but session unknown");
            return;
        };
        let status = if session.is_token_swap {
            SessionStatus::SolReceived
        } else {
            SessionStatus::SolTransferred
        };
        self.update_session(
            session_id,
            SessionPatch {
                status: Some(status),
                signature: Some(signature.to_owned()),
                explorer_link: Some(explorer::tx_link(signature)),
                transfer_timestamp: Some(Utc::now()),
                ..SessionPatch::default()
            },
        );
    }

    /// Moves a known session to `error` with the captured message.
    /// Transient failures awaiting a caller retry never reach here.
    fn record_failure(&self, session_id: Option<&str>, error: &RampError) {
        let Some(id) = session_id else { return };
        if self.store.get(id).is_none() {
            return;
        }
        self.update_session(id, SessionPatch::error(error.to_string()));
    }

    fn update_session(&self, session_id: &str, patch: SessionPatch) {
        if let Err(e) = self.store.update(session_id, patch) {
            tracing::warn!(session_id, error = %e, "Session update rejected");
        }
    }
}

/// Maps provider errors onto the submission taxonomy.
fn submission_error(e: ProviderError) -> RampError {
    if e.is_transient() {
        RampError::transient_submission(e.to_string())
    } else {
        RampError::fatal_submission(e.to_string())
    }
}

/// Decodes a base64 bincode-serialized transaction from the aggregator.
fn decode_transaction(b64: &str) -> Result<VersionedTransaction, RampError> {
    use base64::Engine as _;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| RampError::upstream("swap aggregator", format!("transaction base64: {e}")))?;
    bincode::deserialize(&bytes)
        .map_err(|e| RampError::upstream("swap aggregator", format!("transaction decode: {e}")))
}

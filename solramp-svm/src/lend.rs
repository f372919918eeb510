//! Unsigned lending-protocol deposit transactions.
//!
//! Builds a deposit-reserve-liquidity transaction against a configured pool
//! and returns it base64-encoded for the caller to sign. Pools are plain
//! configuration: the account layout of the deposit instruction is the only
//! protocol knowledge, and it stays inside this module.

use std::collections::HashMap;

use solana_instruction::{AccountMeta, Instruction};
use solana_message::VersionedMessage;
use solana_message::v0::Message as MessageV0;
use solana_pubkey::Pubkey;
use solana_transaction::versioned::VersionedTransaction;
use solramp::RampError;

use crate::provider::SolanaProvider;

/// Deposit-reserve-liquidity instruction tag.
const DEPOSIT_RESERVE_LIQUIDITY_TAG: u8 = 4;

/// One lending pool's account descriptor, from configuration.
#[derive(Debug, Clone)]
pub struct LendingPool {
    /// Lending program id.
    pub program_id: Pubkey,
    /// Reserve account.
    pub reserve: Pubkey,
    /// Mint of the deposited liquidity (e.g. USDC).
    pub liquidity_mint: Pubkey,
    /// Reserve liquidity supply account.
    pub liquidity_supply: Pubkey,
    /// Reserve collateral mint (the cToken).
    pub collateral_mint: Pubkey,
    /// Lending market account.
    pub lending_market: Pubkey,
    /// Lending market authority PDA.
    pub market_authority: Pubkey,
}

/// Builds unsigned deposit transactions for configured pools.
pub struct LendingDepositBuilder {
    provider: std::sync::Arc<dyn SolanaProvider>,
    pools: HashMap<String, LendingPool>,
}

impl std::fmt::Debug for LendingDepositBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LendingDepositBuilder")
            .field("pools", &self.pools.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl LendingDepositBuilder {
    /// Creates a builder over the configured pools, keyed by pool name.
    #[must_use]
    pub fn new(
        provider: std::sync::Arc<dyn SolanaProvider>,
        pools: HashMap<String, LendingPool>,
    ) -> Self {
        Self { provider, pools }
    }

    /// Builds an unsigned deposit of `amount` (UI units of the liquidity
    /// mint) into the named pool, fee-paid by `user`. Returns the
    /// base64-encoded transaction for the caller to sign.
    ///
    /// # Errors
    ///
    /// Returns [`RampError::Validation`] for unknown pools or non-positive
    /// amounts, [`RampError::OnChainSubmission`] when chain lookups fail.
    pub async fn build_deposit(
        &self,
        pool_name: &str,
        amount: f64,
        user: &Pubkey,
    ) -> Result<String, RampError> {
        let pool = self
            .pools
            .get(pool_name)
            .ok_or_else(|| RampError::Validation(format!("unknown lending pool: {pool_name}")))?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(RampError::Validation(format!(
                "deposit amount must be a positive number, got {amount}"
            )));
        }

        let decimals = self
            .provider
            .mint_decimals(&pool.liquidity_mint)
            .await
            .map_err(|e| RampError::fatal_submission(e.to_string()))?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let base_units = (amount * 10f64.powi(i32::from(decimals))).round() as u64;

        let source_liquidity = spl_associated_token_account::get_associated_token_address(
            user,
            &pool.liquidity_mint,
        );
        let destination_collateral = spl_associated_token_account::get_associated_token_address(
            user,
            &pool.collateral_mint,
        );

        let instruction = deposit_instruction(pool, base_units, user, &source_liquidity, &destination_collateral);

        let blockhash = self
            .provider
            .latest_blockhash()
            .await
            .map_err(|e| RampError::fatal_submission(e.to_string()))?;
        let message = MessageV0::try_compile(user, &[instruction], &[], blockhash)
            .map_err(|e| RampError::fatal_submission(format!("message compile: {e}")))?;
        let num_required = message.header.num_required_signatures as usize;
        let transaction = VersionedTransaction {
            signatures: vec![solana_signature::Signature::default(); num_required],
            message: VersionedMessage::V0(message),
        };

        let bytes = bincode::serialize(&transaction)
            .map_err(|e| RampError::fatal_submission(format!("transaction encode: {e}")))?;
        use base64::Engine as _;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Names of the configured pools.
    #[must_use]
    pub fn pool_names(&self) -> Vec<&str> {
        self.pools.keys().map(String::as_str).collect()
    }
}

/// Deposit-reserve-liquidity: one-byte tag plus little-endian amount.
fn deposit_instruction(
    pool: &LendingPool,
    amount: u64,
    user: &Pubkey,
    source_liquidity: &Pubkey,
    destination_collateral: &Pubkey,
) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(DEPOSIT_RESERVE_LIQUIDITY_TAG);
    data.extend_from_slice(&amount.to_le_bytes());
    Instruction {
        program_id: pool.program_id,
        accounts: vec![
            AccountMeta::new(*source_liquidity, false),
            AccountMeta::new(*destination_collateral, false),
            AccountMeta::new(pool.reserve, false),
            AccountMeta::new(pool.liquidity_supply, false),
            AccountMeta::new(pool.collateral_mint, false),
            AccountMeta::new_readonly(pool.lending_market, false),
            AccountMeta::new_readonly(pool.market_authority, false),
            AccountMeta::new_readonly(*user, true),
            AccountMeta::new_readonly(spl_token::ID, false),
        ],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BoxFuture, FeeSample, ProbeStatus, ProviderError};
    use base64::Engine as _;
    use solana_hash::Hash;
    use solana_signature::Signature;

    struct StubProvider;

    impl SolanaProvider for StubProvider {
        fn latest_blockhash(&self) -> BoxFuture<'_, Result<Hash, ProviderError>> {
            Box::pin(async { Ok(Hash::new_unique()) })
        }
        fn recent_prioritization_fees(
            &self,
        ) -> BoxFuture<'_, Result<Vec<FeeSample>, ProviderError>> {
            Box::pin(async { Ok(vec![]) })
        }
        fn send_transaction(
            &self,
            _transaction: &VersionedTransaction,
        ) -> BoxFuture<'_, Result<Signature, ProviderError>> {
            Box::pin(async { Err(ProviderError::Rpc("not supported".to_owned())) })
        }
        fn probe_signature(
            &self,
            _signature: &Signature,
        ) -> BoxFuture<'_, Result<ProbeStatus, ProviderError>> {
            Box::pin(async { Ok(ProbeStatus::Pending) })
        }
        fn confirm_finalized(
            &self,
            _signature: &Signature,
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

    fn pool() -> LendingPool {
        LendingPool {
            program_id: Pubkey::new_unique(),
            reserve: Pubkey::new_unique(),
            liquidity_mint: Pubkey::new_unique(),
            liquidity_supply: Pubkey::new_unique(),
            collateral_mint: Pubkey::new_unique(),
            lending_market: Pubkey::new_unique(),
            market_authority: Pubkey::new_unique(),
        }
    }

    fn builder() -> LendingDepositBuilder {
        let mut pools = HashMap::new();
        pools.insert("main-usdc".to_owned(), pool());
        LendingDepositBuilder::new(std::sync::Arc::new(StubProvider), pools)
    }

    #[tokio::test]
    async fn unknown_pool_is_a_validation_error() {
        let err = builder()
            .build_deposit("nope", 1.0, &Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, RampError::Validation(_)));
    }

    #[tokio::test]
    async fn deposit_builds_unsigned_transaction() {
        let user = Pubkey::new_unique();
        let b64 = builder().build_deposit("main-usdc", 2.5, &user).await.unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        let tx: VersionedTransaction = bincode::deserialize(&bytes).unwrap();
        // Unsigned: signature slots present but defaulted, user is payer.
        assert!(tx.signatures.iter().all(|s| *s == Signature::default()));
        assert_eq!(tx.message.static_account_keys()[0], user);
        let ix = &tx.message.instructions()[0];
        // Tag 4 + 2.5 tokens at 6 decimals = 2_500_000 base units LE.
        assert_eq!(ix.data[0], DEPOSIT_RESERVE_LIQUIDITY_TAG);
        assert_eq!(u64::from_le_bytes(ix.data[1..9].try_into().unwrap()), 2_500_000);
    }

    #[tokio::test]
    async fn non_positive_amount_rejected() {
        for bad in [0.0, -1.0, f64::NAN] {
            let err = builder()
                .build_deposit("main-usdc", bad, &Pubkey::new_unique())
                .await
                .unwrap_err();
            assert!(matches!(err, RampError::Validation(_)));
        }
    }
}

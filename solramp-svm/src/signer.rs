//! Funding account signer.
//!
//! The platform-controlled account that holds settlement liquidity. Modeled
//! as an explicit object passed into constructors rather than a module-scope
//! singleton; a missing or malformed secret is a configuration error
//! surfaced at call time.

use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use solramp::RampError;

/// The funding keypair and signing helpers.
pub struct FundingSigner {
    keypair: Keypair,
}

impl std::fmt::Debug for FundingSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FundingSigner")
            .field("pubkey", &self.keypair.pubkey())
            .finish_non_exhaustive()
    }
}

impl FundingSigner {
    /// Decodes the funding secret. Accepts a base58-encoded 64-byte secret
    /// or a JSON byte array (the CLI keyfile format).
    ///
    /// # Errors
    ///
    /// Returns [`RampError::Configuration`] when the secret is empty,
    /// unresolved (`$VAR` left in config) or not a valid keypair.
    pub fn from_secret(secret: &str) -> Result<Self, RampError> {
        let secret = secret.trim();
        if secret.is_empty() || secret.starts_with('$') {
            return Err(RampError::Configuration(
                "funding secret not configured".to_owned(),
            ));
        }
        let bytes: Vec<u8> = if secret.starts_with('[') {
            serde_json::from_str(secret).map_err(|e| {
                RampError::Configuration(format!("invalid funding secret json: {e}"))
            })?
        } else {
            bs58::decode(secret).into_vec().map_err(|e| {
                RampError::Configuration(format!("invalid funding secret base58: {e}"))
            })?
        };
        let keypair = Keypair::try_from(bytes.as_slice())
            .map_err(|e| RampError::Configuration(format!("invalid funding keypair: {e}")))?;
        Ok(Self { keypair })
    }

    /// The funding account address.
    #[must_use]
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Signs a message's serialized bytes.
    #[must_use]
    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }

    /// Signs a versioned transaction, placing the funding signature at its
    /// position among the required signers.
    ///
    /// # Errors
    ///
    /// Returns [`RampError::OnChainSubmission`] (fatal) when the funding
    /// account is not among the transaction's required signers.
    pub fn sign_versioned(
        &self,
        mut transaction: VersionedTransaction,
    ) -> Result<VersionedTransaction, RampError> {
        let message_bytes = transaction.message.serialize();
        let signature = self.keypair.sign_message(&message_bytes);

        let num_required = transaction.message.header().num_required_signatures as usize;
        let static_keys = transaction.message.static_account_keys();
        let position = static_keys[..num_required.min(static_keys.len())]
            .iter()
            .position(|k| *k == self.keypair.pubkey())
            .ok_or_else(|| {
                RampError::fatal_submission("funding account is not a required signer")
            })?;

        if transaction.signatures.len() < num_required {
            transaction
                .signatures
                .resize(num_required, Signature::default());
        }
        transaction.signatures[position] = signature;
        Ok(transaction)
    }
}

//! Solscan explorer link formatting.

/// Link to a transaction on solscan.
#[must_use]
pub fn tx_link(signature: &str) -> String {
    format!("https://solscan.io/tx/{signature}")
}

/// Link to an account on solscan.
#[must_use]
pub fn account_link(address: &str) -> String {
    format!("https://solscan.io/account/{address}")
}

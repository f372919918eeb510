//! Payment-session record and status machine.
//!
//! A [`PaymentSession`] is the unit of work from fiat checkout to on-chain
//! settlement. The token-swap flag and token descriptor are fixed at
//! creation; settlement only ever appends transaction identifiers and moves
//! the status forward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of fractional digits kept when storing a SOL amount.
pub const SOL_STORE_DECIMALS: u32 = 8;

/// Number of fractional digits used in human-facing SOL strings.
pub const SOL_DISPLAY_DECIMALS: usize = 4;

/// Lifecycle status of a payment session.
///
/// Statuses are rank-ordered. [`SessionStatus::can_transition`] permits only
/// forward movement; the three terminal statuses are never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Checkout session registered, payment not yet made.
    Created,
    /// The external payment provider reported a completed fiat payment.
    PaymentCompleted,
    /// A settlement attempt holds the claim on this session.
    Settling,
    /// Swap path: SOL reserved for the swap, token delivery still pending.
    SolReceived,
    /// Terminal: direct SOL transfer broadcast.
    SolTransferred,
    /// Terminal: swap executed and output token delivered.
    TokenSwapCompleted,
    /// Terminal: settlement failed after the session was known.
    Error,
}

impl SessionStatus {
    /// Whether this status ends the session lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::SolTransferred | Self::TokenSwapCompleted | Self::Error
        )
    }

    /// Position in the forward-only ordering. `Error` is reachable from any
    /// non-terminal status and so carries no rank of its own.
    const fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::PaymentCompleted => 1,
            Self::Settling => 2,
            Self::SolReceived => 3,
            Self::SolTransferred | Self::TokenSwapCompleted | Self::Error => 4,
        }
    }

    /// Whether a transition from `self` to `to` is allowed.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(to, Self::Error) {
            return true;
        }
        to.rank() > self.rank()
    }

    /// Human-readable message for status responses.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Created => "Awaiting payment",
            Self::PaymentCompleted => "Payment received, settlement pending",
            Self::Settling => "Settlement in progress",
            Self::SolReceived => "SOL reserved, token swap in progress",
            Self::SolTransferred => "SOL transferred to your wallet",
            Self::TokenSwapCompleted => "Tokens delivered to your wallet",
            Self::Error => "Settlement failed",
        }
    }
}

/// Destination token descriptor, present only for swap sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDescriptor {
    /// Token ticker symbol, e.g. `USDC`.
    pub symbol: String,
    /// Token mint address (base58).
    pub mint: String,
    /// Requested token amount, if the caller specified one.
    pub amount: Option<f64>,
}

/// A single checkout-to-settlement unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    /// Opaque unique identifier, immutable after creation.
    pub id: String,
    /// Destination wallet address (base58), immutable after creation.
    pub wallet_address: String,
    /// Charged fiat amount in minor units (cents).
    pub fiat_amount: u64,
    /// ISO currency code of the charge.
    pub fiat_currency: String,
    /// SOL quantity derived at creation, rounded to 8 decimal places.
    pub sol_amount: f64,
    /// True iff a destination token was specified at creation.
    pub is_token_swap: bool,
    /// Destination token, fixed at creation for swap sessions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenDescriptor>,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Transaction signature for the direct transfer path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Swap transaction id for the swap path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap_tx_id: Option<String>,
    /// Token delivery transaction id for the swap path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_tx_id: Option<String>,
    /// Explorer link for the primary transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
    /// Explorer link for the delivery transaction, swap path only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_explorer_link: Option<String>,
    /// Realized output token amount in UI units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_amount: Option<f64>,
    /// Captured failure message when status is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Settlement time, set when a terminal success status is reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_timestamp: Option<DateTime<Utc>>,
}

impl PaymentSession {
    /// Creates a fresh session in `created` status.
    #[must_use]
    pub fn new(
        id: String,
        wallet_address: String,
        fiat_amount: u64,
        fiat_currency: String,
        sol_amount: f64,
        token: Option<TokenDescriptor>,
    ) -> Self {
        Self {
            id,
            wallet_address,
            fiat_amount,
            fiat_currency,
            sol_amount: round_sol(sol_amount),
            is_token_swap: token.is_some(),
            token,
            status: SessionStatus::Created,
            signature: None,
            swap_tx_id: None,
            transfer_tx_id: None,
            explorer_link: None,
            delivery_explorer_link: None,
            delivered_amount: None,
            error_message: None,
            timestamp: Utc::now(),
            transfer_timestamp: None,
        }
    }
}

/// Partial update applied through [`crate::store::SessionStore::update`].
///
/// `None` fields are left untouched. Retries may overwrite transaction-id
/// fields, but a status change must satisfy
/// [`SessionStatus::can_transition`].
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New status, validated against the current one.
    pub status: Option<SessionStatus>,
    /// Transfer signature.
    pub signature: Option<String>,
    /// Swap transaction id.
    pub swap_tx_id: Option<String>,
    /// Delivery transaction id.
    pub transfer_tx_id: Option<String>,
    /// Primary explorer link.
    pub explorer_link: Option<String>,
    /// Delivery explorer link.
    pub delivery_explorer_link: Option<String>,
    /// Realized output amount.
    pub delivered_amount: Option<f64>,
    /// Failure message.
    pub error_message: Option<String>,
    /// Settlement time.
    pub transfer_timestamp: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// Patch that only moves the status.
    #[must_use]
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that records a failure message alongside the `error` status.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some(SessionStatus::Error),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Applies the patch to a session in place.
    pub fn apply(self, session: &mut PaymentSession) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(v) = self.signature {
            session.signature = Some(v);
        }
        if let Some(v) = self.swap_tx_id {
            session.swap_tx_id = Some(v);
        }
        if let Some(v) = self.transfer_tx_id {
            session.transfer_tx_id = Some(v);
        }
        if let Some(v) = self.explorer_link {
            session.explorer_link = Some(v);
        }
        if let Some(v) = self.delivery_explorer_link {
            session.delivery_explorer_link = Some(v);
        }
        if let Some(v) = self.delivered_amount {
            session.delivered_amount = Some(v);
        }
        if let Some(v) = self.error_message {
            session.error_message = Some(v);
        }
        if let Some(v) = self.transfer_timestamp {
            session.transfer_timestamp = Some(v);
        }
    }
}

/// Rounds a SOL amount to the stored precision (8 decimal places).
#[must_use]
pub fn round_sol(amount: f64) -> f64 {
    let scale = 10f64.powi(SOL_STORE_DECIMALS as i32);
    (amount * scale).round() / scale
}

/// Formats a SOL amount at display precision (4 decimal places).
#[must_use]
pub fn display_sol(amount: f64) -> String {
    format!("{amount:.prec$}", prec = SOL_DISPLAY_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_do_not_transition() {
        for terminal in [
            SessionStatus::SolTransferred,
            SessionStatus::TokenSwapCompleted,
            SessionStatus::Error,
        ] {
            assert!(!terminal.can_transition(SessionStatus::Created));
            assert!(!terminal.can_transition(SessionStatus::PaymentCompleted));
            assert!(!terminal.can_transition(SessionStatus::Error));
        }
    }

    #[test]
    fn status_never_moves_backward() {
        assert!(!SessionStatus::Settling.can_transition(SessionStatus::Created));
        assert!(!SessionStatus::SolReceived.can_transition(SessionStatus::PaymentCompleted));
        assert!(!SessionStatus::PaymentCompleted.can_transition(SessionStatus::PaymentCompleted));
    }

    #[test]
    fn forward_and_error_transitions_allowed() {
        assert!(SessionStatus::Created.can_transition(SessionStatus::PaymentCompleted));
        assert!(SessionStatus::PaymentCompleted.can_transition(SessionStatus::Settling));
        assert!(SessionStatus::Settling.can_transition(SessionStatus::SolTransferred));
        assert!(SessionStatus::Settling.can_transition(SessionStatus::SolReceived));
        assert!(SessionStatus::SolReceived.can_transition(SessionStatus::TokenSwapCompleted));
        assert!(SessionStatus::SolReceived.can_transition(SessionStatus::Error));
    }

    #[test]
    fn sol_rounding_is_eight_places() {
        assert_eq!(round_sol(0.123_456_789_9), 0.123_456_79);
        assert_eq!(round_sol(1.0), 1.0);
    }

    #[test]
    fn sol_display_is_four_places() {
        assert_eq!(display_sol(0.123_456_78), "0.1235");
        assert_eq!(display_sol(2.0), "2.0000");
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&SessionStatus::TokenSwapCompleted).unwrap();
        assert_eq!(s, "\"token_swap_completed\"");
        let s = serde_json::to_string(&SessionStatus::SolTransferred).unwrap();
        assert_eq!(s, "\"sol_transferred\"");
    }
}

//! Core domain types for the solramp fiat-to-Solana on-ramp.
//!
//! This crate holds everything the settlement layers share and nothing that
//! touches the network: the payment-session record and its status machine,
//! the session store abstraction with an in-memory implementation, the error
//! taxonomy, and the retry/backoff utility used by every external call path.
//!
//! # Session lifecycle
//!
//! ```text
//! created ──► payment_completed ──► settling ──► sol_transferred
//!                                      │
//!                                      └──► sol_received ──► token_swap_completed
//! (any non-terminal) ──► error
//! ```
//!
//! `settling` is the claim state: settlement code must atomically claim a
//! session before broadcasting anything, so a duplicated payment-completion
//! callback can never trigger two independent transfers.

pub mod error;
pub mod retry;
pub mod session;
pub mod store;

pub use error::RampError;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use session::{PaymentSession, SessionPatch, SessionStatus, TokenDescriptor, display_sol, round_sol};
pub use store::{MemoryStore, SessionStore, StoreError};

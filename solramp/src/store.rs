//! Session store abstraction and the in-memory implementation.
//!
//! The store is the single source of truth for settlement status. The trait
//! keeps executors testable against a fake; production deployments should
//! back it with persistent storage (externalizing the store is a known
//! scaling limit, out of scope here).

use crate::session::{PaymentSession, SessionPatch, SessionStatus};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Errors from session store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A session with this id already exists.
    #[error("session id already exists: {0}")]
    DuplicateId(String),

    /// No session with this id.
    #[error("session not found: {0}")]
    NotFound(String),

    /// The requested status change would move the session backward or
    /// overwrite a terminal status.
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status.
        from: SessionStatus,
        /// Rejected target status.
        to: SessionStatus,
    },

    /// Another settlement attempt already holds the claim.
    #[error("session already claimed: {0}")]
    AlreadyClaimed(String),
}

/// Keyed access to payment sessions.
///
/// Implementations must make [`SessionStore::claim`] atomic with respect to
/// concurrent claims for the same id: exactly one caller wins.
pub trait SessionStore: Send + Sync {
    /// Registers a new session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateId`] if the id is taken.
    fn create(&self, session: PaymentSession) -> Result<(), StoreError>;

    /// Returns a snapshot of the session, if known.
    fn get(&self, id: &str) -> Option<PaymentSession>;

    /// Applies a partial update and returns the updated snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown ids and
    /// [`StoreError::InvalidTransition`] for backward status moves.
    fn update(&self, id: &str, patch: SessionPatch) -> Result<PaymentSession, StoreError>;

    /// Atomically claims the session for settlement, moving
    /// `created`/`payment_completed` to `settling`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyClaimed`] when a concurrent attempt
    /// holds the claim, [`StoreError::InvalidTransition`] for terminal
    /// sessions and [`StoreError::NotFound`] for unknown ids.
    fn claim(&self, id: &str) -> Result<PaymentSession, StoreError>;
}

/// Single-process, in-memory store. No eviction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, PaymentSession>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn create(&self, session: PaymentSession) -> Result<(), StoreError> {
        match self.sessions.entry(session.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(session.id)),
            Entry::Vacant(entry) => {
                entry.insert(session);
                Ok(())
            }
        }
    }

    fn get(&self, id: &str) -> Option<PaymentSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    fn update(&self, id: &str, patch: SessionPatch) -> Result<PaymentSession, StoreError> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        if let Some(to) = patch.status {
            let from = entry.status;
            if !from.can_transition(to) {
                return Err(StoreError::InvalidTransition { from, to });
            }
        }
        patch.apply(entry.value_mut());
        Ok(entry.clone())
    }

    fn claim(&self, id: &str) -> Result<PaymentSession, StoreError> {
        // The dashmap entry guard serializes concurrent claimants.
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        match entry.status {
            SessionStatus::Created | SessionStatus::PaymentCompleted => {
                entry.status = SessionStatus::Settling;
                Ok(entry.clone())
            }
            SessionStatus::Settling | SessionStatus::SolReceived => {
                Err(StoreError::AlreadyClaimed(id.to_owned()))
            }
            from @ (SessionStatus::SolTransferred
            | SessionStatus::TokenSwapCompleted
            | SessionStatus::Error) => Err(StoreError::InvalidTransition {
                from,
                to: SessionStatus::Settling,
            }),
        }
    }
}

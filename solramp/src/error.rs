//! Error taxonomy for on-ramp operations.
//!
//! Four classes, matching how callers must react: reject the input, retry
//! later, retry the attempt with a bounded counter, or page an operator.

/// Base error type for on-ramp operations.
#[derive(Debug, thiserror::Error)]
pub enum RampError {
    /// Malformed caller input. Surfaced as 4xx, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced session is unknown everywhere.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// An upstream provider (price feed, quote aggregator, payment
    /// provider) was unreachable or kept erroring after retries were
    /// exhausted. Safe for the caller to retry later.
    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable {
        /// Which upstream failed.
        service: &'static str,
        /// Underlying failure detail.
        message: String,
    },

    /// Signing or broadcast of an on-chain transaction failed.
    #[error("on-chain submission failed: {message}")]
    OnChainSubmission {
        /// Underlying failure detail.
        message: String,
        /// Transient subtypes (blockhash expiry, timeout) may be retried
        /// by the caller with a bounded counter.
        transient: bool,
    },

    /// Missing or invalid operator-supplied configuration, e.g. the
    /// funding account secret. Not recoverable without intervention.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RampError {
    /// Builds an upstream-unavailable error.
    #[must_use]
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service,
            message: message.into(),
        }
    }

    /// Builds a transient on-chain submission error.
    #[must_use]
    pub fn transient_submission(message: impl Into<String>) -> Self {
        Self::OnChainSubmission {
            message: message.into(),
            transient: true,
        }
    }

    /// Builds a fatal on-chain submission error.
    #[must_use]
    pub fn fatal_submission(message: impl Into<String>) -> Self {
        Self::OnChainSubmission {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether the caller may retry the same operation.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::UpstreamUnavailable { .. } => true,
            Self::OnChainSubmission { transient, .. } => *transient,
            Self::Validation(_) | Self::SessionNotFound(_) | Self::Configuration(_) => false,
        }
    }
}

impl From<crate::store::StoreError> for RampError {
    fn from(e: crate::store::StoreError) -> Self {
        match e {
            crate::store::StoreError::NotFound(id) => Self::SessionNotFound(id),
            other => Self::Validation(other.to_string()),
        }
    }
}

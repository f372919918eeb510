//! Bounded priority-fee estimation.
//!
//! Takes the five most recent prioritization-fee observations by slot,
//! applies a 1.2x headroom to their median and clamps the result. Never
//! fails: sampling errors and empty windows fall back to the default.

use crate::provider::{FeeSample, SolanaProvider};

/// Fee used when no observations are available or sampling fails.
pub const DEFAULT_PRIORITY_FEE: u64 = 200_000;

/// Lower clamp bound, micro-lamports per compute unit.
pub const MIN_PRIORITY_FEE: u64 = 100_000;

/// Upper clamp bound, micro-lamports per compute unit.
pub const MAX_PRIORITY_FEE: u64 = 1_000_000;

/// Number of most-recent samples considered.
const SAMPLE_WINDOW: usize = 5;

/// Headroom multiplier over the sampled median.
const HEADROOM: f64 = 1.2;

/// Derives a bounded priority-fee recommendation from recent samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityFeeEstimator;

impl PriorityFeeEstimator {
    /// Estimates the fee from the provider's recent observations.
    /// Infallible; errors degrade to [`DEFAULT_PRIORITY_FEE`].
    pub async fn estimate(provider: &dyn SolanaProvider) -> u64 {
        match provider.recent_prioritization_fees().await {
            Ok(samples) => Self::from_samples(&samples),
            Err(e) => {
                tracing::warn!(error = %e, "Priority fee sampling failed, using default");
                DEFAULT_PRIORITY_FEE
            }
        }
    }

    /// Median of the 5 newest samples by slot, x1.2, clamped.
    #[must_use]
    pub fn from_samples(samples: &[FeeSample]) -> u64 {
        if samples.is_empty() {
            return DEFAULT_PRIORITY_FEE;
        }
        let mut recent: Vec<FeeSample> = samples.to_vec();
        recent.sort_by(|a, b| b.slot.cmp(&a.slot));
        recent.truncate(SAMPLE_WINDOW);

        let mut fees: Vec<u64> = recent.iter().map(|s| s.micro_lamports).collect();
        fees.sort_unstable();
        let mid = fees.len() / 2;
        let median = if fees.len() % 2 == 1 {
            fees[mid] as f64
        } else {
            (fees[mid - 1] as f64 + fees[mid] as f64) / 2.0
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let with_headroom = (median * HEADROOM).round() as u64;
        with_headroom.clamp(MIN_PRIORITY_FEE, MAX_PRIORITY_FEE)
    }
}

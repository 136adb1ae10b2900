//! Weighted risk scoring.
//!
//! The scorer is a pure function of the transaction and a snapshot of
//! deterministic signals gathered by the pipeline. The original system's
//! random velocity and device-fingerprint checks are replaced by the real
//! velocity counter and device-recognition lookup carried in
//! `RiskSignals`, so every assessment is reproducible.

use crate::types::{
    BehaviorClass, LocationStatus, MerchantCategory, Recommendation, RiskAssessment, Transaction,
};
use fraudguard_core::config::ScoringWeights;

/// Probability cap after summing factors.
pub const PROBABILITY_CAP: u8 = 95;

/// Human-readable factor labels, in detection order.
pub mod factors {
    /// Amount above the high threshold.
    pub const HIGH_AMOUNT: &str = "High transaction amount";
    /// Amount in the elevated band.
    pub const ELEVATED_AMOUNT: &str = "Above-average transaction amount";
    /// Location classified suspicious or unknown.
    pub const SUSPICIOUS_LOCATION: &str = "Unknown transaction location";
    /// Late-night hour.
    pub const LATE_NIGHT: &str = "Unusual transaction time (late night)";
    /// Online merchant category.
    pub const ONLINE_MERCHANT: &str = "Online merchant (higher risk category)";
    /// Velocity threshold reached.
    pub const VELOCITY: &str = "Velocity check: multiple transactions in the last minute";
    /// Unrecognized device.
    pub const NEW_DEVICE: &str = "Device fingerprint: unrecognized device";
}

/// Deterministic signal snapshot consumed by the scorer.
///
/// Collected by the pipeline from the behavioral profiler, the location
/// tracker, and the per-user activity window before any state mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskSignals {
    /// Behavioral classification of the transaction.
    pub behavior: BehaviorClass,
    /// Trust status of the (location, device) pair.
    pub location: LocationStatus,
    /// Transactions for this user in the trailing velocity window,
    /// including the one under evaluation.
    pub velocity_in_window: u32,
    /// Whether the device has previously been seen for this user.
    pub device_known: bool,
}

/// Produces a `RiskAssessment` from a transaction and its signals.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    weights: ScoringWeights,
    velocity_min_count: u32,
}

impl RiskScorer {
    /// Create a scorer with the given weights and velocity threshold.
    #[must_use]
    pub fn new(weights: ScoringWeights, velocity_min_count: u32) -> Self {
        Self {
            weights,
            velocity_min_count,
        }
    }

    /// Score a transaction. Pure and deterministic.
    #[must_use]
    pub fn score(&self, tx: &Transaction, signals: &RiskSignals) -> RiskAssessment {
        let w = &self.weights;
        let mut points: u32 = 0;
        let mut risk_factors = Vec::new();

        let mut fire = |weight: u8, label: &str, factors: &mut Vec<String>| {
            points += u32::from(weight);
            factors.push(label.to_string());
        };

        if tx.amount > 2_000.0 {
            fire(w.amount_high, factors::HIGH_AMOUNT, &mut risk_factors);
        } else if tx.amount > 1_000.0 {
            fire(w.amount_elevated, factors::ELEVATED_AMOUNT, &mut risk_factors);
        }

        if signals.location == LocationStatus::Suspicious {
            fire(w.location_suspicious, factors::SUSPICIOUS_LOCATION, &mut risk_factors);
        }

        if (2..=5).contains(&tx.hour()) {
            fire(w.late_night, factors::LATE_NIGHT, &mut risk_factors);
        }

        if tx.category == MerchantCategory::Online {
            fire(w.online_merchant, factors::ONLINE_MERCHANT, &mut risk_factors);
        }

        if signals.velocity_in_window >= self.velocity_min_count {
            fire(w.velocity, factors::VELOCITY, &mut risk_factors);
        }

        if !signals.device_known {
            fire(w.new_device, factors::NEW_DEVICE, &mut risk_factors);
        }

        let fraud_probability = points.min(u32::from(PROBABILITY_CAP)) as u8;
        let confidence_level = (100u8 - fraud_probability.abs_diff(50)).max(85);

        RiskAssessment {
            fraud_probability,
            confidence_level,
            risk_factors,
            recommendation: Recommendation::from_probability(fraud_probability),
        }
    }
}

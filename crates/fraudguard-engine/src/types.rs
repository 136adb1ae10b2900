//! Data model for the decision engine.

use fraudguard_core::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Transaction Types
// ============================================================================

/// A card transaction submitted for evaluation.
///
/// Immutable value created by the external producer; the engine only
/// reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction id.
    pub id: String,
    /// Transaction amount. Must be non-negative.
    pub amount: f64,
    /// Merchant name.
    pub merchant: String,
    /// Merchant category.
    pub category: MerchantCategory,
    /// Location label (resolution to coordinates is external).
    pub location: String,
    /// Device label.
    pub device: String,
    /// Timestamp (Unix epoch seconds, UTC).
    pub timestamp: u64,
    /// Owning user id.
    pub user_id: String,
    /// Last four digits of the card.
    pub card_last4: String,
}

impl Transaction {
    /// Hour of day [0, 23] in UTC.
    #[must_use]
    pub fn hour(&self) -> u8 {
        ((self.timestamp % 86_400) / 3_600) as u8
    }

    /// Validate the transaction before evaluation.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(EngineError::validation("transaction id must not be empty"));
        }
        if self.user_id.is_empty() {
            return Err(EngineError::validation("user id must not be empty"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(EngineError::validation(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Merchant category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MerchantCategory {
    /// In-person retail.
    Retail,
    /// Online merchant.
    Online,
    /// ATM withdrawal.
    Atm,
    /// Restaurant.
    Restaurant,
    /// Anything else.
    Other,
}

// ============================================================================
// Location Types
// ============================================================================

/// Resolved location context for a transaction.
///
/// Geolocation lookup is an external concern; the producer supplies this
/// alongside the transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    /// Location label, matching `Transaction::location`.
    pub label: String,
    /// Resolved coordinates (latitude, longitude), when available.
    pub coordinates: Option<(f64, f64)>,
    /// Trust marker from the resolver.
    pub marker: LocationMarker,
}

impl LocationInfo {
    /// A known location with coordinates.
    #[must_use]
    pub fn known(label: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            label: label.into(),
            coordinates: Some((lat, lon)),
            marker: LocationMarker::Known,
        }
    }

    /// A location the resolver could not identify.
    #[must_use]
    pub fn unknown(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            coordinates: None,
            marker: LocationMarker::Unknown,
        }
    }

    /// Returns true if the label designates an international location.
    #[must_use]
    pub fn is_international(&self) -> bool {
        self.label.to_ascii_lowercase().contains("international")
    }
}

/// Resolver trust marker for a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMarker {
    /// Resolved to a real place.
    Known,
    /// Could not be resolved.
    Unknown,
    /// Known VPN / anonymizer exit.
    Vpn,
}

/// Trust classification of a (location, device) pair for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    /// Seen repeatedly with no suspicious observations in between.
    Trusted,
    /// First or early observations.
    New,
    /// VPN/unknown marker or impossible travel.
    Suspicious,
}

// ============================================================================
// Classification and Scoring Types
// ============================================================================

/// Classification of a transaction against the user's baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorClass {
    /// Within historical patterns.
    Normal,
    /// Noticeably off-baseline.
    Unusual,
    /// Far off-baseline.
    Suspicious,
}

/// Scorer recommendation, derived from the fraud probability alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    /// Low risk.
    Approve,
    /// Moderate risk, additional verification warranted.
    Review,
    /// High fraud probability.
    Block,
}

impl Recommendation {
    /// Derive the recommendation from a fraud probability.
    #[must_use]
    pub fn from_probability(probability: u8) -> Self {
        match probability {
            0..=29 => Recommendation::Approve,
            30..=59 => Recommendation::Review,
            _ => Recommendation::Block,
        }
    }
}

/// Risk assessment for a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Fraud probability, 0-95.
    pub fraud_probability: u8,
    /// Confidence in the assessment, 85-100.
    pub confidence_level: u8,
    /// Human-readable factors that fired, in detection order.
    pub risk_factors: Vec<String>,
    /// Recommendation derived from `fraud_probability`.
    pub recommendation: Recommendation,
}

// ============================================================================
// Verdict Types
// ============================================================================

/// Final decision for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Let the transaction through.
    Approve,
    /// Hold for manual review (flag-only rule matches fold in here).
    Review,
    /// Block the transaction.
    Block,
}

impl From<Recommendation> for Decision {
    fn from(rec: Recommendation) -> Self {
        match rec {
            Recommendation::Approve => Decision::Approve,
            Recommendation::Review => Decision::Review,
            Recommendation::Block => Decision::Block,
        }
    }
}

/// The engine's verdict for one transaction.
///
/// Produced exactly once per transaction id and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Id of the evaluated transaction.
    pub transaction_id: String,
    /// Final decision.
    pub decision: Decision,
    /// Ids of the rules whose conditions matched.
    pub triggered_rules: Vec<u64>,
    /// Risk assessment from the scorer.
    pub risk: RiskAssessment,
    /// Matched rule names (store insertion order) followed by risk factors.
    pub explanation: Vec<String>,
}

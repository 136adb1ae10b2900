//! # FraudGuard Engine
//!
//! Deterministic fraud-risk decision engine for card transactions.
//!
//! Every submitted transaction flows through a fixed pipeline: rule
//! evaluation against an operator-managed rule set, behavioral
//! comparison against the user's settled history, location and device
//! trust classification, weighted risk scoring, and decision
//! combination under the precedence block > review > flag > approve.
//! The outcome settles atomically into every component, and verdicts
//! feed a bounded alert feed with read-first eviction.
//!
//! Each transaction id is decided exactly once; submissions for the
//! same user are serialized so the state a decision reads is the state
//! its settlement updates.
//!
//! # Example
//!
//! ```rust,ignore
//! use fraudguard_engine::prelude::*;
//!
//! let engine = FraudEngine::with_standard_rules(EngineConfig::default())?;
//! let verdict = engine.submit_transaction(&tx, &location)?;
//! match verdict.decision {
//!     Decision::Approve => settle(&tx),
//!     Decision::Review => queue_for_review(&tx),
//!     Decision::Block => reject(&tx),
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alerts;
pub mod behavior;
pub mod decision;
pub mod engine;
pub mod location;
pub mod rules;
pub mod scoring;
pub mod types;

pub use alerts::{Alert, AlertManager, AlertSeverity};
pub use behavior::{BehavioralProfiler, UserProfile};
pub use decision::{DecisionEngine, RuleContext};
pub use engine::{CancelToken, FraudEngine};
pub use location::{LocationRecord, LocationTrustTracker};
pub use rules::{NewRule, Rule, RuleAction, RuleCondition, RuleId, RuleStore};
pub use scoring::{RiskScorer, RiskSignals};
pub use types::{
    BehaviorClass, Decision, LocationInfo, LocationMarker, LocationStatus, MerchantCategory,
    Recommendation, RiskAssessment, Transaction, Verdict,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::alerts::{Alert, AlertSeverity};
    pub use crate::engine::{CancelToken, FraudEngine};
    pub use crate::rules::{NewRule, Rule, RuleAction, RuleCondition};
    pub use crate::types::{
        Decision, LocationInfo, MerchantCategory, Transaction, Verdict,
    };
    pub use fraudguard_core::config::{EngineConfig, EngineConfigBuilder, ScoringWeights};
    pub use fraudguard_core::error::{EngineError, Result};
}

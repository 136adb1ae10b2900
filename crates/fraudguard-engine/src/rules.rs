//! Detection rule store.
//!
//! Rules are created and edited by an operator surface and evaluated
//! read-only by the decision path, which is the sole writer of the
//! trigger counters. A single `RwLock` guards the set; the write rate is
//! operator-driven and low.

use fraudguard_core::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use tracing::{debug, info};

/// Identifier assigned to a rule by the store.
pub type RuleId = u64;

/// Condition kind a rule matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    /// Amount strictly greater than the threshold.
    AmountGt,
    /// Transaction count in the trailing velocity window at or above the
    /// threshold.
    VelocityGt,
    /// Location labelled international.
    International,
    /// Transaction hour inside the late-night window [2, 5].
    TimeWindow,
    /// First transaction at this merchant for the user.
    NewMerchant,
    /// Operator-defined condition the engine does not evaluate.
    Custom,
}

impl RuleCondition {
    /// Returns true if the threshold is a meaningful number for this
    /// condition (and therefore must be positive).
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, RuleCondition::AmountGt | RuleCondition::VelocityGt)
    }
}

/// Action taken when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Mark the transaction; folds into review for the final decision.
    Flag,
    /// Hold for manual review.
    Review,
    /// Block the transaction.
    Block,
}

/// Input for creating a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    /// Rule name, unique among currently-present rules.
    pub name: String,
    /// Condition kind.
    pub condition: RuleCondition,
    /// Threshold value.
    pub threshold: f64,
    /// Action on match.
    pub action: RuleAction,
    /// Initial active flag.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewRule {
    /// Create a rule definition. Starts active.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        condition: RuleCondition,
        threshold: f64,
        action: RuleAction,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            threshold,
            action,
            active: true,
        }
    }

    /// Start the rule disabled; an operator activates it explicitly.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A detection rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Store-assigned id.
    pub id: RuleId,
    /// Rule name.
    pub name: String,
    /// Condition kind.
    pub condition: RuleCondition,
    /// Threshold value.
    pub threshold: f64,
    /// Action on match.
    pub action: RuleAction,
    /// Whether the rule participates in evaluation.
    pub active: bool,
    /// Times the condition has matched. Monotonic.
    pub triggered_count: u64,
}

#[derive(Debug, Default)]
struct StoreInner {
    // Insertion order is the evaluation and listing order.
    rules: Vec<Rule>,
    next_id: RuleId,
}

/// Owns the mutable set of detection rules.
#[derive(Debug, Default)]
pub struct RuleStore {
    inner: RwLock<StoreInner>,
}

impl RuleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The default rule set shipped with the engine.
    #[must_use]
    pub fn standard_rules() -> Vec<NewRule> {
        vec![
            NewRule::new("High Amount Alert", RuleCondition::AmountGt, 10_000.0, RuleAction::Flag),
            NewRule::new("Rapid Transactions", RuleCondition::VelocityGt, 3.0, RuleAction::Block),
            NewRule::new(
                "International Transaction",
                RuleCondition::International,
                1.0,
                RuleAction::Review,
            ),
            NewRule::new("Late Night Activity", RuleCondition::TimeWindow, 1.0, RuleAction::Flag)
                .disabled(),
            NewRule::new("New Merchant", RuleCondition::NewMerchant, 1.0, RuleAction::Review),
        ]
    }

    /// Add a rule with a zeroed counter.
    ///
    /// Fails on an empty or duplicate name, or a non-positive threshold
    /// for numeric conditions. Names of deleted rules may be reused.
    pub fn add(&self, new: NewRule) -> Result<RuleId> {
        if new.name.trim().is_empty() {
            return Err(EngineError::validation("rule name must not be empty"));
        }
        if new.condition.is_numeric() && !(new.threshold > 0.0) {
            return Err(EngineError::validation(format!(
                "threshold must be positive for {:?}, got {}",
                new.condition, new.threshold
            )));
        }

        let mut inner = self.inner.write().unwrap();
        if inner.rules.iter().any(|r| r.name == new.name) {
            return Err(EngineError::DuplicateRuleName(new.name));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        info!(rule_id = id, name = %new.name, "rule added");
        inner.rules.push(Rule {
            id,
            name: new.name,
            condition: new.condition,
            threshold: new.threshold,
            action: new.action,
            active: new.active,
            triggered_count: 0,
        });
        Ok(id)
    }

    /// Flip a rule's active flag.
    pub fn toggle_active(&self, id: RuleId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let rule = inner
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EngineError::RuleNotFound(id))?;
        rule.active = !rule.active;
        info!(rule_id = id, active = rule.active, "rule toggled");
        Ok(())
    }

    /// Remove a rule.
    pub fn remove(&self, id: RuleId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.rules.len();
        inner.rules.retain(|r| r.id != id);
        if inner.rules.len() == before {
            return Err(EngineError::RuleNotFound(id));
        }
        info!(rule_id = id, "rule removed");
        Ok(())
    }

    /// Fetch a rule by id.
    pub fn get(&self, id: RuleId) -> Result<Rule> {
        let inner = self.inner.read().unwrap();
        inner
            .rules
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::RuleNotFound(id))
    }

    /// All rules in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Rule> {
        self.inner.read().unwrap().rules.clone()
    }

    /// Active rules in insertion order.
    #[must_use]
    pub fn list_active(&self) -> Vec<Rule> {
        self.inner
            .read()
            .unwrap()
            .rules
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect()
    }

    /// Atomically increment a rule's trigger counter.
    pub fn record_trigger(&self, id: RuleId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let rule = inner
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EngineError::RuleNotFound(id))?;
        rule.triggered_count += 1;
        debug!(rule_id = id, count = rule.triggered_count, "rule trigger recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount_rule(name: &str, threshold: f64) -> NewRule {
        NewRule::new(name, RuleCondition::AmountGt, threshold, RuleAction::Flag)
    }

    #[test]
    fn test_add_and_list_preserves_insertion_order() {
        let store = RuleStore::new();
        let a = store.add(amount_rule("A", 100.0)).unwrap();
        let b = store.add(amount_rule("B", 200.0)).unwrap();
        let c = store.add(amount_rule("C", 300.0)).unwrap();

        let listed: Vec<RuleId> = store.list().iter().map(|r| r.id).collect();
        assert_eq!(listed, vec![a, b, c]);
    }

    #[test]
    fn test_add_validation() {
        let store = RuleStore::new();
        assert!(store.add(amount_rule("", 100.0)).is_err());
        assert!(store.add(amount_rule("Zero", 0.0)).is_err());
        assert!(store.add(amount_rule("Negative", -5.0)).is_err());

        // Non-numeric conditions are not threshold-checked.
        assert!(store
            .add(NewRule::new("Intl", RuleCondition::International, 0.0, RuleAction::Review))
            .is_ok());
    }

    #[test]
    fn test_duplicate_name_rejected_until_removed() {
        let store = RuleStore::new();
        let id = store.add(amount_rule("High Amount", 1_000.0)).unwrap();
        let err = store.add(amount_rule("High Amount", 2_000.0)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRuleName(_)));

        store.remove(id).unwrap();
        assert!(store.add(amount_rule("High Amount", 2_000.0)).is_ok());
    }

    #[test]
    fn test_toggle_and_active_listing() {
        let store = RuleStore::new();
        let id = store.add(amount_rule("A", 100.0)).unwrap();
        assert_eq!(store.list_active().len(), 1);

        store.toggle_active(id).unwrap();
        assert!(store.list_active().is_empty());
        assert_eq!(store.list().len(), 1);

        store.toggle_active(id).unwrap();
        assert_eq!(store.list_active().len(), 1);
    }

    #[test]
    fn test_not_found_paths() {
        let store = RuleStore::new();
        assert!(matches!(store.toggle_active(9), Err(EngineError::RuleNotFound(9))));
        assert!(matches!(store.remove(9), Err(EngineError::RuleNotFound(9))));
        assert!(matches!(store.record_trigger(9), Err(EngineError::RuleNotFound(9))));
        assert!(store.get(9).is_err());
    }

    #[test]
    fn test_trigger_counter_monotonic() {
        let store = RuleStore::new();
        let id = store.add(amount_rule("A", 100.0)).unwrap();
        store.record_trigger(id).unwrap();
        store.record_trigger(id).unwrap();
        assert_eq!(store.get(id).unwrap().triggered_count, 2);
    }

    #[test]
    fn test_standard_rules() {
        let store = RuleStore::new();
        for rule in RuleStore::standard_rules() {
            store.add(rule).unwrap();
        }
        let rules = store.list();
        assert_eq!(rules.len(), 5);
        assert!(rules.iter().any(|r| r.name == "High Amount Alert"));
        assert!(rules.iter().any(|r| r.condition == RuleCondition::VelocityGt));

        // Late Night Activity ships disabled.
        assert_eq!(store.list_active().len(), 4);
        let late = rules.iter().find(|r| r.name == "Late Night Activity").unwrap();
        assert!(!late.active);
    }
}

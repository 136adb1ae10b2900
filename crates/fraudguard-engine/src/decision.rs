//! Rule evaluation and verdict assembly.
//!
//! The decision engine matches the active rule set against a transaction,
//! combines the matches with the scorer's recommendation under the
//! precedence block > review > flag > approve, and assembles the final
//! verdict. Trigger counting and settlement are the pipeline's job; the
//! functions here are pure over their inputs.

use crate::rules::{Rule, RuleAction, RuleCondition};
use crate::types::{Decision, Recommendation, RiskAssessment, Transaction, Verdict};
use tracing::debug;

/// Deterministic context the rule matchers need beyond the transaction
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleContext {
    /// Transactions for this user in the trailing velocity window,
    /// including the one under evaluation.
    pub velocity_in_window: u32,
    /// Whether the location label designates an international location.
    pub international: bool,
    /// Whether this is the user's first transaction at this merchant.
    pub first_time_merchant: bool,
}

/// Evaluates rules and combines classifier outputs into a verdict.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    /// Returns true if the rule's condition matches the transaction.
    #[must_use]
    pub fn matches(rule: &Rule, tx: &Transaction, ctx: &RuleContext) -> bool {
        match rule.condition {
            RuleCondition::AmountGt => tx.amount > rule.threshold,
            // Inclusive so a run of exactly `threshold` transactions in
            // the window trips the rule.
            RuleCondition::VelocityGt => f64::from(ctx.velocity_in_window) >= rule.threshold,
            RuleCondition::International => ctx.international,
            RuleCondition::TimeWindow => (2..=5).contains(&tx.hour()),
            RuleCondition::NewMerchant => ctx.first_time_merchant,
            RuleCondition::Custom => {
                debug!(rule_id = rule.id, "custom rule condition is not evaluated");
                false
            }
        }
    }

    /// Matched rules, preserving store insertion order.
    #[must_use]
    pub fn evaluate(rules: &[Rule], tx: &Transaction, ctx: &RuleContext) -> Vec<Rule> {
        rules
            .iter()
            .filter(|r| Self::matches(r, tx, ctx))
            .cloned()
            .collect()
    }

    /// Combine matched rules with the scorer recommendation.
    ///
    /// Precedence: block > review > flag > approve. A flag-only match
    /// folds into review.
    #[must_use]
    pub fn combine(matched: &[Rule], recommendation: Recommendation) -> Decision {
        let has_action = |action| matched.iter().any(|r| r.action == action);

        if has_action(RuleAction::Block) || recommendation == Recommendation::Block {
            Decision::Block
        } else if has_action(RuleAction::Review) || recommendation == Recommendation::Review {
            Decision::Review
        } else if has_action(RuleAction::Flag) {
            Decision::Review
        } else {
            Decision::Approve
        }
    }

    /// Assemble the verdict for a transaction.
    ///
    /// The explanation is the matched rule names (insertion order)
    /// followed by the risk factors (detection order).
    #[must_use]
    pub fn verdict(tx: &Transaction, matched: &[Rule], risk: RiskAssessment) -> Verdict {
        let decision = Self::combine(matched, risk.recommendation);

        let mut explanation: Vec<String> = matched.iter().map(|r| r.name.clone()).collect();
        explanation.extend(risk.risk_factors.iter().cloned());

        Verdict {
            transaction_id: tx.id.clone(),
            decision,
            triggered_rules: matched.iter().map(|r| r.id).collect(),
            risk,
            explanation,
        }
    }
}

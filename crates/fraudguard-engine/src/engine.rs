//! The transaction evaluation pipeline and its operator surface.
//!
//! `FraudEngine` owns the rule store, the behavioral profiler, the
//! location trust tracker, the scorer, and the alert feed, and runs the
//! submit pipeline: validate, reserve the transaction id, snapshot
//! deterministic signals under the user's sequencing lock, score, match
//! rules, combine, then settle every component with the outcome.
//!
//! Each transaction id is decided at most once. Submissions for the same
//! user are serialized by a per-user lock held across the decide and
//! settle phases, so the signals a decision is based on are exactly the
//! state its settlement updates.

use crate::alerts::{Alert, AlertManager};
use crate::behavior::{BehavioralProfiler, UserProfile};
use crate::decision::{DecisionEngine, RuleContext};
use crate::location::{LocationRecord, LocationTrustTracker};
use crate::rules::{NewRule, Rule, RuleId, RuleStore};
use crate::scoring::{RiskScorer, RiskSignals};
use crate::types::{Decision, LocationInfo, Transaction, Verdict};
use fraudguard_core::config::EngineConfig;
use fraudguard_core::error::{EngineError, Result};
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cooperative cancellation handle for an in-flight submission.
///
/// Cancellation is honored only before the settlement phase begins; once
/// settlement starts the transaction is decided.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// Per-user activity window used for velocity and first-merchant signals.
#[derive(Debug, Default)]
struct UserActivity {
    recent: VecDeque<u64>,
    merchants: HashSet<String>,
}

#[derive(Debug, Default)]
struct Ledger {
    decided: HashSet<String>,
    in_flight: HashSet<String>,
}

// Releases the in-flight reservation unless the decision committed.
struct Reservation<'a> {
    ledger: &'a Mutex<Ledger>,
    id: String,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.in_flight.remove(&self.id);
        ledger.decided.insert(std::mem::take(&mut self.id));
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.ledger.lock().unwrap().in_flight.remove(&self.id);
        }
    }
}

/// The fraud-risk decision engine.
#[derive(Debug)]
pub struct FraudEngine {
    config: EngineConfig,
    rules: RuleStore,
    profiler: BehavioralProfiler,
    locations: LocationTrustTracker,
    scorer: RiskScorer,
    alerts: AlertManager,
    ledger: Mutex<Ledger>,
    activity: RwLock<HashMap<String, Arc<Mutex<UserActivity>>>>,
}

impl FraudEngine {
    /// Create an engine with an empty rule set.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            profiler: BehavioralProfiler::new(config.ema_alpha, config.hour_history),
            locations: LocationTrustTracker::new(
                config.trust_threshold,
                config.impossible_travel_km,
                config.impossible_travel_window_secs,
            ),
            scorer: RiskScorer::new(config.scoring_weights, config.velocity_min_count),
            alerts: AlertManager::new(config.alert_capacity),
            rules: RuleStore::new(),
            ledger: Mutex::new(Ledger::default()),
            activity: RwLock::new(HashMap::new()),
            config,
        })
    }

    /// Create an engine pre-loaded with the standard rule set.
    pub fn with_standard_rules(config: EngineConfig) -> Result<Self> {
        let engine = Self::new(config)?;
        for rule in RuleStore::standard_rules() {
            engine.rules.add(rule)?;
        }
        Ok(engine)
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Submission Pipeline
    // ========================================================================

    /// Evaluate a transaction and settle the outcome.
    ///
    /// Returns `AlreadyDecided` if the transaction id has a verdict,
    /// `Transient` if another submission for the same id is in flight.
    pub fn submit_transaction(&self, tx: &Transaction, location: &LocationInfo) -> Result<Verdict> {
        self.submit_transaction_with_cancel(tx, location, &CancelToken::new())
    }

    /// `submit_transaction` with cooperative cancellation.
    ///
    /// A cancellation observed before settlement returns `Cancelled` and
    /// leaves no trace: no verdict, no profile or trust updates, no
    /// alert, and the id stays available for resubmission.
    pub fn submit_transaction_with_cancel(
        &self,
        tx: &Transaction,
        location: &LocationInfo,
        cancel: &CancelToken,
    ) -> Result<Verdict> {
        tx.validate()?;
        if location.label != tx.location {
            return Err(EngineError::validation(format!(
                "location label {:?} does not match transaction location {:?}",
                location.label, tx.location
            )));
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled(tx.id.clone()));
        }

        let reservation = self.reserve(&tx.id)?;

        // Per-user sequencing lock, held across decide and settle.
        let activity = {
            let mut users = self.activity.write().unwrap();
            users
                .entry(tx.user_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(UserActivity::default())))
                .clone()
        };
        let mut activity = activity.lock().unwrap();

        // ---- Decide (read-only) ----
        let velocity_in_window = 1 + activity
            .recent
            .iter()
            .filter(|&&t| tx.timestamp.saturating_sub(t) < self.config.velocity_window_secs)
            .count() as u32;
        let first_time_merchant = !activity.merchants.contains(&tx.merchant);

        let behavior = self.profiler.classify(&tx.user_id, tx);
        let location_status = self
            .locations
            .classify(&tx.user_id, location, &tx.device, tx.timestamp);
        let device_known = self.locations.device_known(&tx.user_id, &tx.device);

        let signals = RiskSignals {
            behavior,
            location: location_status,
            velocity_in_window,
            device_known,
        };
        let risk = self.scorer.score(tx, &signals);

        let ctx = RuleContext {
            velocity_in_window,
            international: location.is_international(),
            first_time_merchant,
        };
        let matched = DecisionEngine::evaluate(&self.rules.list_active(), tx, &ctx);
        let verdict = DecisionEngine::verdict(tx, &matched, risk);

        // Last chance to bail before any state mutates.
        if cancel.is_cancelled() {
            debug!(tx_id = %tx.id, "submission cancelled before settlement");
            return Err(EngineError::Cancelled(tx.id.clone()));
        }

        // ---- Settle ----
        for rule in &matched {
            // A rule removed mid-flight loses the count; the verdict is
            // unaffected.
            if let Err(e) = self.rules.record_trigger(rule.id) {
                debug!(rule_id = rule.id, error = %e, "trigger not recorded");
            }
        }
        self.profiler.settle(&tx.user_id, tx, behavior);
        self.locations
            .settle(&tx.user_id, location, &tx.device, tx.timestamp, location_status);

        activity.recent.push_back(tx.timestamp);
        let window = self.config.velocity_window_secs;
        let newest = *activity.recent.iter().max().unwrap_or(&tx.timestamp);
        activity
            .recent
            .retain(|&t| newest.saturating_sub(t) < window);
        activity.merchants.insert(tx.merchant.clone());

        self.alerts.ingest(&verdict, tx.timestamp);
        reservation.commit();

        match verdict.decision {
            Decision::Block => warn!(
                tx_id = %tx.id,
                user_id = %tx.user_id,
                probability = verdict.risk.fraud_probability,
                "transaction blocked"
            ),
            _ => info!(
                tx_id = %tx.id,
                user_id = %tx.user_id,
                decision = ?verdict.decision,
                probability = verdict.risk.fraud_probability,
                "transaction decided"
            ),
        }
        Ok(verdict)
    }

    fn reserve(&self, tx_id: &str) -> Result<Reservation<'_>> {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.decided.contains(tx_id) {
            return Err(EngineError::AlreadyDecided(tx_id.to_string()));
        }
        if !ledger.in_flight.insert(tx_id.to_string()) {
            return Err(EngineError::Transient(format!(
                "transaction {tx_id} is being evaluated"
            )));
        }
        Ok(Reservation {
            ledger: &self.ledger,
            id: tx_id.to_string(),
            committed: false,
        })
    }

    // ========================================================================
    // Rule Administration
    // ========================================================================

    /// Add a detection rule.
    pub fn add_rule(&self, rule: NewRule) -> Result<RuleId> {
        self.rules.add(rule)
    }

    /// Flip a rule's active flag.
    pub fn toggle_rule(&self, id: RuleId) -> Result<()> {
        self.rules.toggle_active(id)
    }

    /// Remove a rule.
    pub fn remove_rule(&self, id: RuleId) -> Result<()> {
        self.rules.remove(id)
    }

    /// Fetch a rule by id.
    pub fn rule(&self, id: RuleId) -> Result<Rule> {
        self.rules.get(id)
    }

    /// All rules in insertion order.
    #[must_use]
    pub fn rules(&self) -> Vec<Rule> {
        self.rules.list()
    }

    // ========================================================================
    // Alert Feed
    // ========================================================================

    /// The alert feed, most recent first.
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.list()
    }

    /// Number of unread alerts.
    #[must_use]
    pub fn unread_alerts(&self) -> usize {
        self.alerts.unread_count()
    }

    /// Mark an alert as read.
    pub fn mark_alert_read(&self, id: Uuid) -> Result<()> {
        self.alerts.mark_read(id)
    }

    /// Dismiss an alert permanently.
    pub fn dismiss_alert(&self, id: Uuid) -> Result<()> {
        self.alerts.dismiss(id)
    }

    // ========================================================================
    // User Queries
    // ========================================================================

    /// The user's behavioral profile.
    pub fn profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiler
            .profile(user_id)
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))
    }

    /// The user's (location, device) history in first-observation order.
    #[must_use]
    pub fn location_history(&self, user_id: &str) -> Vec<LocationRecord> {
        self.locations.history(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertSeverity;
    use crate::types::{LocationStatus, MerchantCategory};
    use std::thread;

    const DAY: u64 = 86_400;
    const HOME: (f64, f64) = (40.7128, -74.0060);

    fn at(day: u64, hour: u64) -> u64 {
        day * DAY + hour * 3_600
    }

    fn tx(id: &str, user: &str, amount: f64, timestamp: u64) -> Transaction {
        Transaction {
            id: id.into(),
            amount,
            merchant: "Grocery Store".into(),
            category: MerchantCategory::Retail,
            location: "Home City".into(),
            device: "iPhone 13".into(),
            timestamp,
            user_id: user.into(),
            card_last4: "4242".into(),
        }
    }

    fn home() -> LocationInfo {
        LocationInfo::known("Home City", HOME.0, HOME.1)
    }

    fn engine() -> FraudEngine {
        FraudEngine::with_standard_rules(EngineConfig::default()).unwrap()
    }

    // Settle enough quiet daytime history that the user's home pair is
    // trusted, the device recognized, and the merchant familiar.
    fn warm_up(engine: &FraudEngine, user: &str) {
        for i in 0..4u64 {
            let t = tx(&format!("warm-{user}-{i}"), user, 80.0, at(i, 13));
            engine.submit_transaction(&t, &home()).unwrap();
        }
    }

    #[test]
    fn test_quiet_transaction_for_warm_user_approves() {
        let e = engine();
        warm_up(&e, "user-1");

        let alerts_before = e.alerts().len();
        let t = tx("tx-quiet", "user-1", 60.0, at(10, 13));
        let v = e.submit_transaction(&t, &home()).unwrap();

        assert_eq!(v.decision, Decision::Approve);
        assert!(v.triggered_rules.is_empty());
        assert!(v.risk.risk_factors.is_empty());
        assert_eq!(v.risk.fraud_probability, 0);
        // Clean approvals leave the alert feed untouched.
        assert_eq!(e.alerts().len(), alerts_before);
    }

    #[test]
    fn test_high_risk_cold_start_blocks() {
        let e = engine();
        // New user, 15k online purchase at 03:00 from an unseen location
        // and device.
        let mut t = tx("tx-hot", "user-1", 15_000.0, at(0, 3));
        t.category = MerchantCategory::Online;
        t.location = "Quiet Suburb".into();
        let loc = LocationInfo::known("Quiet Suburb", 41.0, -73.5);

        let v = e.submit_transaction(&t, &loc).unwrap();

        // 30 (amount) + 20 (late night) + 10 (online) + 20 (new device).
        assert_eq!(v.risk.fraud_probability, 80);
        assert_eq!(v.decision, Decision::Block);

        let names: Vec<String> = e
            .rules()
            .into_iter()
            .filter(|r| v.triggered_rules.contains(&r.id))
            .map(|r| r.name)
            .collect();
        assert!(names.contains(&"High Amount Alert".to_string()));
        assert!(names.contains(&"New Merchant".to_string()));
        // Ships disabled, so it does not trigger even at 03:00.
        assert!(!names.contains(&"Late Night Activity".to_string()));

        let alerts = e.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert_eq!(alerts[0].created_at, t.timestamp);
    }

    #[test]
    fn test_resubmission_is_already_decided() {
        let e = engine();
        let t = tx("tx-1", "user-1", 60.0, at(0, 13));
        e.submit_transaction(&t, &home()).unwrap();

        let rules_before = e.rules();
        let alerts_before = e.alerts().len();

        let err = e.submit_transaction(&t, &home()).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyDecided(_)));

        // The duplicate left no trace.
        assert_eq!(e.rules(), rules_before);
        assert_eq!(e.alerts().len(), alerts_before);
        assert_eq!(e.profile("user-1").unwrap().transaction_count, 1);
    }

    #[test]
    fn test_velocity_run_blocks_from_third_transaction() {
        let e = engine();
        warm_up(&e, "user-1");
        let base = at(10, 13);

        let decisions: Vec<Decision> = (0..4u64)
            .map(|i| {
                let t = tx(&format!("rapid-{i}"), "user-1", 40.0, base + i * 10);
                e.submit_transaction(&t, &home()).unwrap().decision
            })
            .collect();

        assert_eq!(decisions[0], Decision::Approve);
        assert_eq!(decisions[1], Decision::Approve);
        assert_eq!(decisions[2], Decision::Block);
        assert_eq!(decisions[3], Decision::Block);

        let rapid = e
            .rules()
            .into_iter()
            .find(|r| r.name == "Rapid Transactions")
            .unwrap();
        assert_eq!(rapid.triggered_count, 2);
    }

    #[test]
    fn test_velocity_window_expires() {
        let e = engine();
        warm_up(&e, "user-1");
        let base = at(10, 13);

        for i in 0..2u64 {
            let t = tx(&format!("spaced-{i}"), "user-1", 40.0, base + i * 10);
            e.submit_transaction(&t, &home()).unwrap();
        }
        // 90 seconds after the first, only the second is still in the
        // 60-second window.
        let t = tx("spaced-2", "user-1", 40.0, base + 90);
        let v = e.submit_transaction(&t, &home()).unwrap();
        assert_eq!(v.decision, Decision::Approve);
    }

    #[test]
    fn test_international_location_goes_to_review() {
        let e = engine();
        warm_up(&e, "user-1");

        let mut t = tx("tx-intl", "user-1", 60.0, at(10, 13));
        t.location = "International Terminal, LHR".into();
        let loc = LocationInfo::known("International Terminal, LHR", 51.47, -0.45);

        let v = e.submit_transaction(&t, &loc).unwrap();
        assert_eq!(v.decision, Decision::Review);
        assert!(v.explanation.contains(&"International Transaction".to_string()));
    }

    #[test]
    fn test_unknown_location_scores_suspicious() {
        let e = engine();
        warm_up(&e, "user-1");

        let mut t = tx("tx-vpn", "user-1", 60.0, at(10, 13));
        t.location = "Unknown".into();
        let v = e
            .submit_transaction(&t, &LocationInfo::unknown("Unknown"))
            .unwrap();

        assert!(v
            .risk
            .risk_factors
            .contains(&"Unknown transaction location".to_string()));
        assert_eq!(e.location_history("user-1").last().unwrap().status, LocationStatus::Suspicious);
    }

    #[test]
    fn test_trust_and_device_recognition_build_up() {
        let e = engine();

        // First transaction: unseen device fires the device factor.
        let t = tx("t-0", "user-1", 60.0, at(0, 13));
        let v = e.submit_transaction(&t, &home()).unwrap();
        assert!(v
            .risk
            .risk_factors
            .contains(&"Device fingerprint: unrecognized device".to_string()));

        // Second: device is known, pair not yet trusted.
        let t = tx("t-1", "user-1", 60.0, at(1, 13));
        let v = e.submit_transaction(&t, &home()).unwrap();
        assert!(v.risk.risk_factors.is_empty());

        // Third: pair is trusted after two settled clean observations.
        let history = e.location_history("user-1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, LocationStatus::Trusted);
        assert_eq!(history[0].observations, 2);
    }

    #[test]
    fn test_profile_tracks_settled_transactions() {
        let e = engine();
        let t = tx("t-0", "user-1", 100.0, at(0, 13));
        e.submit_transaction(&t, &home()).unwrap();
        let t = tx("t-1", "user-1", 200.0, at(0, 14));
        e.submit_transaction(&t, &home()).unwrap();

        let p = e.profile("user-1").unwrap();
        assert_eq!(p.transaction_count, 2);
        // First settle seeds the average, the second folds in at alpha.
        assert!((p.avg_amount - 120.0).abs() < 1e-9);
        assert_eq!(p.current_week_count, 2);

        assert!(matches!(e.profile("ghost"), Err(EngineError::UserNotFound(_))));
    }

    #[test]
    fn test_precancelled_submission_leaves_no_trace() {
        let e = engine();
        let t = tx("tx-1", "user-1", 15_000.0, at(0, 3));

        let token = CancelToken::new();
        token.cancel();
        let err = e
            .submit_transaction_with_cancel(&t, &home(), &token)
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled(_)));
        assert!(err.is_recoverable());

        assert!(e.alerts().is_empty());
        assert!(e.profile("user-1").is_err());
        assert!(e.location_history("user-1").is_empty());
        assert!(e.rules().iter().all(|r| r.triggered_count == 0));

        // The id was never decided; resubmission goes through.
        assert!(e.submit_transaction(&t, &home()).is_ok());
    }

    #[test]
    fn test_validation_failures_do_not_reserve_the_id() {
        let e = engine();
        let mut bad = tx("tx-1", "user-1", -5.0, at(0, 13));
        assert!(e.submit_transaction(&bad, &home()).is_err());

        bad.amount = 60.0;
        assert!(e.submit_transaction(&bad, &home()).is_ok());
    }

    #[test]
    fn test_mismatched_location_label_rejected() {
        let e = engine();
        let t = tx("tx-1", "user-1", 60.0, at(0, 13));
        let err = e
            .submit_transaction(&t, &LocationInfo::known("Elsewhere", 1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_alert_feed_through_facade() {
        let e = engine();
        let mut t = tx("tx-1", "user-1", 15_000.0, at(0, 3));
        t.category = MerchantCategory::Online;
        e.submit_transaction(&t, &home()).unwrap();

        assert_eq!(e.unread_alerts(), 1);
        let id = e.alerts()[0].id;
        e.mark_alert_read(id).unwrap();
        assert_eq!(e.unread_alerts(), 0);
        e.dismiss_alert(id).unwrap();
        assert!(e.alerts().is_empty());
        assert!(matches!(e.dismiss_alert(id), Err(EngineError::AlertNotFound(_))));
    }

    #[test]
    fn test_toggling_the_shipped_inactive_rule() {
        let e = engine();
        warm_up(&e, "user-1");
        let late_night = e
            .rules()
            .into_iter()
            .find(|r| r.name == "Late Night Activity")
            .unwrap();
        assert!(!late_night.active);

        // Disabled: only the scorer's independent late-night factor fires.
        let t = tx("tx-night-1", "user-1", 60.0, at(10, 3));
        let v = e.submit_transaction(&t, &home()).unwrap();
        assert!(!v.triggered_rules.contains(&late_night.id));
        assert!(v
            .risk
            .risk_factors
            .contains(&"Unusual transaction time (late night)".to_string()));

        // Activated, the rule triggers on the same shape of transaction.
        e.toggle_rule(late_night.id).unwrap();
        let t = tx("tx-night-2", "user-1", 60.0, at(11, 3));
        let v = e.submit_transaction(&t, &home()).unwrap();
        assert!(v.triggered_rules.contains(&late_night.id));
        assert_eq!(e.rule(late_night.id).unwrap().triggered_count, 1);
    }

    #[test]
    fn test_concurrent_submissions_each_decided_once() {
        let e = Arc::new(engine());
        let mut handles = Vec::new();

        for worker in 0..8u64 {
            let e = Arc::clone(&e);
            handles.push(thread::spawn(move || {
                let mut ok = 0;
                for i in 0..20u64 {
                    let t = tx(
                        &format!("w{worker}-t{i}"),
                        &format!("user-{}", worker % 3),
                        60.0,
                        at(worker * 3 + i, 13),
                    );
                    if e.submit_transaction(&t, &home()).is_ok() {
                        ok += 1;
                    }
                }
                ok
            }));
        }

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 160);

        // Every id resubmits as already decided.
        let t = tx("w0-t0", "user-0", 60.0, at(0, 13));
        assert!(matches!(
            e.submit_transaction(&t, &home()),
            Err(EngineError::AlreadyDecided(_))
        ));

        let counts: u64 = (0..3)
            .map(|u| e.profile(&format!("user-{u}")).unwrap().transaction_count)
            .sum();
        assert_eq!(counts, 160);
    }
}

//! Per-user behavioral baselines and drift classification.
//!
//! The profiler keeps rolling statistics per user: an exponentially
//! weighted average amount, a weekly transaction counter with 7-day
//! rollover, and the preferred time-of-day window derived from the
//! trailing transaction hours. `classify` is read-only; state only moves
//! on `settle`, which the pipeline calls as the final step of a
//! successful decision.

use crate::types::{BehaviorClass, Transaction};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

const WEEK_SECS: u64 = 7 * 86_400;

/// Snapshot of a user's behavioral profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id.
    pub user_id: String,
    /// Exponentially weighted average transaction amount.
    pub avg_amount: f64,
    /// Baseline transactions per week (the last completed week).
    pub weekly_frequency: f64,
    /// Transactions seen in the current week.
    pub current_week_count: u32,
    /// Preferred hour window (start, end), inclusive, wrapping midnight.
    pub preferred_window: Option<(u8, u8)>,
    /// Classification of the most recently settled transaction.
    pub last_behavior_class: BehaviorClass,
    /// Total settled transactions.
    pub transaction_count: u64,
}

#[derive(Debug)]
struct ProfileState {
    avg_amount: f64,
    weekly_baseline: f64,
    week_count: u32,
    week_start: u64,
    hours: VecDeque<u8>,
    preferred: Option<(u8, u8)>,
    last_class: BehaviorClass,
    transaction_count: u64,
}

impl ProfileState {
    fn new(first_seen: u64) -> Self {
        Self {
            avg_amount: 0.0,
            weekly_baseline: 0.0,
            week_count: 0,
            week_start: first_seen,
            hours: VecDeque::new(),
            preferred: None,
            last_class: BehaviorClass::Normal,
            transaction_count: 0,
        }
    }

    /// Weekly counter as of `now`, without mutating: (baseline, count).
    fn rolled(&self, now: u64) -> (f64, u32) {
        match now.saturating_sub(self.week_start) / WEEK_SECS {
            0 => (self.weekly_baseline, self.week_count),
            1 => (f64::from(self.week_count), 0),
            // A whole empty week passed; the baseline is stale.
            _ => (0.0, 0),
        }
    }

    fn roll(&mut self, now: u64) {
        match now.saturating_sub(self.week_start) / WEEK_SECS {
            0 => {}
            1 => {
                self.weekly_baseline = f64::from(self.week_count);
                self.week_count = 0;
                self.week_start += WEEK_SECS;
            }
            _ => {
                self.weekly_baseline = 0.0;
                self.week_count = 0;
                self.week_start = now;
            }
        }
    }

    fn in_preferred_window(&self, hour: u8) -> bool {
        match self.preferred {
            Some((start, end)) if start <= end => hour >= start && hour <= end,
            Some((start, end)) => hour >= start || hour <= end,
            None => true,
        }
    }

    fn recompute_preferred(&mut self) {
        let mut buckets = [0u32; 24];
        for &h in &self.hours {
            buckets[usize::from(h)] += 1;
        }
        let mode = buckets
            .iter()
            .enumerate()
            .max_by_key(|&(_, c)| *c)
            .map(|(h, _)| h as u8)
            .unwrap_or(0);
        // Widen the modal bucket by one hour on each side, wrapping.
        self.preferred = Some(((mode + 23) % 24, (mode + 1) % 24));
    }
}

/// Owns per-user rolling statistics and classifies behavioral drift.
#[derive(Debug)]
pub struct BehavioralProfiler {
    alpha: f64,
    hour_history: usize,
    profiles: RwLock<HashMap<String, Arc<Mutex<ProfileState>>>>,
}

impl BehavioralProfiler {
    /// Create a profiler with the given EMA smoothing factor and hour
    /// ring capacity.
    #[must_use]
    pub fn new(alpha: f64, hour_history: usize) -> Self {
        Self {
            alpha,
            hour_history,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    fn state_of(&self, user_id: &str) -> Option<Arc<Mutex<ProfileState>>> {
        self.profiles.read().unwrap().get(user_id).cloned()
    }

    /// Classify a transaction against the user's baseline.
    ///
    /// Read-only with respect to stored state. Policy, first match wins:
    /// no profile → normal; amount > 5x average and outside the preferred
    /// window → suspicious; amount > 3x average or this week's count over
    /// twice the weekly baseline → unusual; otherwise normal.
    #[must_use]
    pub fn classify(&self, user_id: &str, tx: &Transaction) -> BehaviorClass {
        let Some(state) = self.state_of(user_id) else {
            return BehaviorClass::Normal;
        };
        let state = state.lock().unwrap();

        let avg = state.avg_amount;
        if avg > 0.0 && tx.amount > 5.0 * avg && !state.in_preferred_window(tx.hour()) {
            return BehaviorClass::Suspicious;
        }

        let (baseline, week_count) = state.rolled(tx.timestamp);
        let frequency_spike = baseline > 0.0 && f64::from(week_count + 1) > 2.0 * baseline;
        if (avg > 0.0 && tx.amount > 3.0 * avg) || frequency_spike {
            return BehaviorClass::Unusual;
        }

        BehaviorClass::Normal
    }

    /// Fold a settled transaction into the user's profile, creating it on
    /// first contact.
    pub fn settle(&self, user_id: &str, tx: &Transaction, class: BehaviorClass) {
        let state = {
            let mut profiles = self.profiles.write().unwrap();
            profiles
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ProfileState::new(tx.timestamp))))
                .clone()
        };
        let mut state = state.lock().unwrap();

        if state.transaction_count == 0 {
            state.avg_amount = tx.amount;
        } else {
            state.avg_amount = state.avg_amount * (1.0 - self.alpha) + tx.amount * self.alpha;
        }

        state.roll(tx.timestamp);
        state.week_count += 1;

        state.hours.push_back(tx.hour());
        while state.hours.len() > self.hour_history {
            state.hours.pop_front();
        }
        state.recompute_preferred();

        state.last_class = class;
        state.transaction_count += 1;

        debug!(
            user_id,
            avg = state.avg_amount,
            week_count = state.week_count,
            ?class,
            "profile settled"
        );
    }

    /// Snapshot of a user's profile, if one exists.
    #[must_use]
    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        let state = self.state_of(user_id)?;
        let state = state.lock().unwrap();
        Some(UserProfile {
            user_id: user_id.to_string(),
            avg_amount: state.avg_amount,
            weekly_frequency: state.weekly_baseline,
            current_week_count: state.week_count,
            preferred_window: state.preferred,
            last_behavior_class: state.last_class,
            transaction_count: state.transaction_count,
        })
    }
}

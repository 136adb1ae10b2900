//! Bounded, stateful alert feed.
//!
//! Alerts move unread → read → dismissed; dismissal is terminal and may
//! skip read. The feed is capped: on overflow the oldest *read* alert is
//! evicted first, and only when every alert is unread does the oldest
//! unread one go. Unread alerts are deprioritized for eviction, not
//! permanently protected.

use crate::types::{Decision, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use fraudguard_core::error::{EngineError, Result};

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Blocked transaction.
    High,
    /// Transaction held for review.
    Medium,
    /// Approved but with risk factors present.
    Low,
}

/// An alert in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id.
    pub id: Uuid,
    /// Severity derived from the verdict.
    pub severity: AlertSeverity,
    /// Human-readable message.
    pub message: String,
    /// Creation timestamp (the triggering transaction's timestamp).
    pub created_at: u64,
    /// Whether a human has read the alert. Monotonic false to true.
    pub read: bool,
}

/// Owns the bounded alert feed.
#[derive(Debug)]
pub struct AlertManager {
    capacity: usize,
    feed: Mutex<VecDeque<Alert>>,
}

impl AlertManager {
    /// Create a manager with the given feed capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            feed: Mutex::new(VecDeque::new()),
        }
    }

    /// Derive the alert severity for a verdict, if it warrants one.
    #[must_use]
    fn severity_for(verdict: &Verdict) -> Option<AlertSeverity> {
        match verdict.decision {
            Decision::Block => Some(AlertSeverity::High),
            Decision::Review => Some(AlertSeverity::Medium),
            Decision::Approve if !verdict.risk.risk_factors.is_empty() => Some(AlertSeverity::Low),
            Decision::Approve => None,
        }
    }

    /// Ingest a verdict, creating an alert when it warrants one.
    ///
    /// Returns the new alert's id, or `None` for clean approvals.
    pub fn ingest(&self, verdict: &Verdict, now: u64) -> Option<Uuid> {
        let severity = Self::severity_for(verdict)?;

        let verb = match verdict.decision {
            Decision::Block => "blocked",
            Decision::Review => "held for review",
            Decision::Approve => "approved with risk factors",
        };
        let message = format!(
            "Transaction {} {verb}: {}",
            verdict.transaction_id,
            verdict.explanation.join("; ")
        );

        let alert = Alert {
            id: Uuid::new_v4(),
            severity,
            message,
            created_at: now,
            read: false,
        };
        let id = alert.id;

        let mut feed = self.feed.lock().unwrap();
        if feed.len() >= self.capacity {
            // Oldest read alert first; only when everything is unread
            // does an unread alert get dropped.
            match feed.iter().position(|a| a.read) {
                Some(idx) => {
                    feed.remove(idx);
                }
                None => {
                    if let Some(evicted) = feed.pop_front() {
                        warn!(alert_id = %evicted.id, "evicting unread alert at capacity");
                    }
                }
            }
        }
        feed.push_back(alert);
        debug!(alert_id = %id, ?severity, "alert created");
        Some(id)
    }

    /// Mark an alert as read.
    pub fn mark_read(&self, id: Uuid) -> Result<()> {
        let mut feed = self.feed.lock().unwrap();
        let alert = feed
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(EngineError::AlertNotFound(id))?;
        alert.read = true;
        Ok(())
    }

    /// Dismiss an alert. Terminal: the alert leaves the feed and its id
    /// is gone for good.
    pub fn dismiss(&self, id: Uuid) -> Result<()> {
        let mut feed = self.feed.lock().unwrap();
        let idx = feed
            .iter()
            .position(|a| a.id == id)
            .ok_or(EngineError::AlertNotFound(id))?;
        feed.remove(idx);
        debug!(alert_id = %id, "alert dismissed");
        Ok(())
    }

    /// The feed, most recent first.
    #[must_use]
    pub fn list(&self) -> Vec<Alert> {
        self.feed.lock().unwrap().iter().rev().cloned().collect()
    }

    /// Number of unread alerts.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.feed.lock().unwrap().iter().filter(|a| !a.read).count()
    }
}

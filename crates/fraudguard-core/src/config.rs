//! Engine configuration.
//!
//! All options are fixed at engine construction time and immutable
//! thereafter. Configuration can come from defaults, a builder, a TOML
//! file, or environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use fraudguard_core::config::EngineConfig;
//!
//! let config = EngineConfig::from_file("config/engine.toml")?;
//! config.validate()?;
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-factor integer weights for the risk scorer.
///
/// Each weight is the number of points the factor contributes when it
/// fires. The total is capped at 95 by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Amount above the high threshold (> 2000).
    pub amount_high: u8,
    /// Amount in the elevated band (1000, 2000].
    pub amount_elevated: u8,
    /// Location classified suspicious or unknown.
    pub location_suspicious: u8,
    /// Transaction hour in the late-night window [2, 5].
    pub late_night: u8,
    /// Online merchant category.
    pub online_merchant: u8,
    /// Velocity threshold reached inside the trailing window.
    pub velocity: u8,
    /// Device not previously seen for the user.
    pub new_device: u8,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            amount_high: 30,
            amount_elevated: 15,
            location_suspicious: 25,
            late_night: 20,
            online_merchant: 10,
            velocity: 15,
            new_device: 20,
        }
    }
}

/// Unified engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of alerts retained in the feed.
    pub alert_capacity: usize,
    /// Clean observations required before a (location, device) pair is
    /// trusted.
    pub trust_threshold: u32,
    /// Smoothing factor for the per-user average-amount EMA.
    pub ema_alpha: f64,
    /// Risk-factor weights.
    pub scoring_weights: ScoringWeights,
    /// Trailing window for the velocity counter, in seconds.
    pub velocity_window_secs: u64,
    /// Transaction count inside the window at which the velocity factor
    /// fires.
    pub velocity_min_count: u32,
    /// Distance beyond which travel between consecutive transactions is
    /// considered impossible, in kilometres.
    pub impossible_travel_km: f64,
    /// Time window for the impossible-travel check, in seconds.
    pub impossible_travel_window_secs: u64,
    /// Number of trailing transactions kept for preferred-hour derivation.
    pub hour_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alert_capacity: 5,
            trust_threshold: 2,
            ema_alpha: 0.2,
            scoring_weights: ScoringWeights::default(),
            velocity_window_secs: 60,
            velocity_min_count: 3,
            impossible_travel_km: 800.0,
            impossible_travel_window_secs: 3600,
            hour_history: 30,
        }
    }
}

impl EngineConfig {
    /// Stricter preset: trust is earned more slowly and the velocity
    /// factor fires earlier.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            trust_threshold: 3,
            velocity_min_count: 2,
            impossible_travel_km: 500.0,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, starting from
    /// defaults. Recognized variables: `FRAUDGUARD_ALERT_CAPACITY`,
    /// `FRAUDGUARD_TRUST_THRESHOLD`, `FRAUDGUARD_EMA_ALPHA`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FRAUDGUARD_ALERT_CAPACITY") {
            config.alert_capacity = val
                .parse()
                .map_err(|_| EngineError::config(format!("bad alert capacity: {val}")))?;
        }

        if let Ok(val) = std::env::var("FRAUDGUARD_TRUST_THRESHOLD") {
            config.trust_threshold = val
                .parse()
                .map_err(|_| EngineError::config(format!("bad trust threshold: {val}")))?;
        }

        if let Ok(val) = std::env::var("FRAUDGUARD_EMA_ALPHA") {
            config.ema_alpha = val
                .parse()
                .map_err(|_| EngineError::config(format!("bad EMA alpha: {val}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| EngineError::config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.alert_capacity == 0 {
            return Err(EngineError::config("alert_capacity must be at least 1"));
        }
        if self.trust_threshold == 0 {
            return Err(EngineError::config("trust_threshold must be at least 1"));
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(EngineError::config("ema_alpha must be in (0, 1]"));
        }
        if self.velocity_window_secs == 0 || self.velocity_min_count == 0 {
            return Err(EngineError::config("velocity window and count must be positive"));
        }
        if self.impossible_travel_km <= 0.0 {
            return Err(EngineError::config("impossible_travel_km must be positive"));
        }
        if self.hour_history == 0 {
            return Err(EngineError::config("hour_history must be at least 1"));
        }
        Ok(())
    }

    /// Set the alert feed capacity.
    #[must_use]
    pub fn with_alert_capacity(mut self, capacity: usize) -> Self {
        self.alert_capacity = capacity;
        self
    }

    /// Set the location trust threshold.
    #[must_use]
    pub fn with_trust_threshold(mut self, threshold: u32) -> Self {
        self.trust_threshold = threshold;
        self
    }

    /// Set the EMA smoothing factor.
    #[must_use]
    pub fn with_ema_alpha(mut self, alpha: f64) -> Self {
        self.ema_alpha = alpha;
        self
    }

    /// Set the scoring weights.
    #[must_use]
    pub fn with_scoring_weights(mut self, weights: ScoringWeights) -> Self {
        self.scoring_weights = weights;
        self
    }
}

/// Configuration builder.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the alert feed capacity.
    #[must_use]
    pub fn alert_capacity(mut self, capacity: usize) -> Self {
        self.config.alert_capacity = capacity;
        self
    }

    /// Set the location trust threshold.
    #[must_use]
    pub fn trust_threshold(mut self, threshold: u32) -> Self {
        self.config.trust_threshold = threshold;
        self
    }

    /// Set the EMA smoothing factor.
    #[must_use]
    pub fn ema_alpha(mut self, alpha: f64) -> Self {
        self.config.ema_alpha = alpha;
        self
    }

    /// Adjust the scoring weights.
    #[must_use]
    pub fn scoring_weights(mut self, f: impl FnOnce(ScoringWeights) -> ScoringWeights) -> Self {
        self.config.scoring_weights = f(self.config.scoring_weights);
        self
    }

    /// Set the velocity window.
    #[must_use]
    pub fn velocity_window(mut self, secs: u64, min_count: u32) -> Self {
        self.config.velocity_window_secs = secs;
        self.config.velocity_min_count = min_count;
        self
    }

    /// Set the impossible-travel policy.
    #[must_use]
    pub fn impossible_travel(mut self, km: f64, window_secs: u64) -> Self {
        self.config.impossible_travel_km = km;
        self.config.impossible_travel_window_secs = window_secs;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build without validation.
    #[must_use]
    pub fn build_unchecked(self) -> EngineConfig {
        self.config
    }
}

//! Per-user location and device trust tracking.
//!
//! Tracks every (location, device) pair a user has settled transactions
//! from. A pair starts `new`, becomes `trusted` after a configurable
//! number of clean observations, and is forced `suspicious` by a
//! VPN/unknown marker or an impossible-travel jump from the user's
//! previous position. A suspicious observation resets the clean run; the
//! pair then re-earns trust from scratch.

use crate::types::{LocationInfo, LocationMarker, LocationStatus};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between two (lat, lon) points in kilometres.
#[must_use]
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// A settled (location, device) observation history entry for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Owning user.
    pub user_id: String,
    /// Location label.
    pub location: String,
    /// Device label.
    pub device: String,
    /// Timestamp of the first observation.
    pub first_seen: u64,
    /// Timestamp of the most recent observation.
    pub last_seen: u64,
    /// Total observations of the pair.
    pub observations: u64,
    /// Current trust status of the pair.
    pub status: LocationStatus,
}

#[derive(Debug)]
struct PairState {
    location: String,
    device: String,
    first_seen: u64,
    last_seen: u64,
    observations: u64,
    clean_run: u32,
    status: LocationStatus,
}

#[derive(Debug, Default)]
struct UserLocationState {
    // Insertion order is the history order.
    pairs: Vec<PairState>,
    // Last settled position fix: (lat, lon, timestamp).
    last_fix: Option<(f64, f64, u64)>,
}

/// Owns per-user known-location/device history.
#[derive(Debug)]
pub struct LocationTrustTracker {
    trust_threshold: u32,
    travel_km: f64,
    travel_window_secs: u64,
    users: RwLock<HashMap<String, Arc<Mutex<UserLocationState>>>>,
}

impl LocationTrustTracker {
    /// Create a tracker with the given trust threshold and
    /// impossible-travel policy.
    #[must_use]
    pub fn new(trust_threshold: u32, travel_km: f64, travel_window_secs: u64) -> Self {
        Self {
            trust_threshold,
            travel_km,
            travel_window_secs,
            users: RwLock::new(HashMap::new()),
        }
    }

    fn state_of(&self, user_id: &str) -> Option<Arc<Mutex<UserLocationState>>> {
        self.users.read().unwrap().get(user_id).cloned()
    }

    /// Classify a (location, device) observation. Read-only.
    #[must_use]
    pub fn classify(
        &self,
        user_id: &str,
        info: &LocationInfo,
        device: &str,
        timestamp: u64,
    ) -> LocationStatus {
        if info.marker != LocationMarker::Known {
            return LocationStatus::Suspicious;
        }

        let Some(state) = self.state_of(user_id) else {
            return LocationStatus::New;
        };
        let state = state.lock().unwrap();

        if let (Some((lat, lon, last_ts)), Some(coords)) = (state.last_fix, info.coordinates) {
            let elapsed = timestamp.saturating_sub(last_ts);
            if elapsed < self.travel_window_secs {
                let distance = haversine_km((lat, lon), coords);
                if distance > self.travel_km {
                    debug!(user_id, distance, elapsed, "impossible travel");
                    return LocationStatus::Suspicious;
                }
            }
        }

        match state
            .pairs
            .iter()
            .find(|p| p.location == info.label && p.device == device)
        {
            Some(pair) if pair.status == LocationStatus::Trusted => LocationStatus::Trusted,
            // A previously suspicious pair re-earns trust through clean
            // observations; until then it classifies as new.
            Some(_) => LocationStatus::New,
            None => LocationStatus::New,
        }
    }

    /// Persist a settled observation with the status it was classified
    /// under.
    pub fn settle(
        &self,
        user_id: &str,
        info: &LocationInfo,
        device: &str,
        timestamp: u64,
        status: LocationStatus,
    ) {
        let state = {
            let mut users = self.users.write().unwrap();
            users
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(UserLocationState::default())))
                .clone()
        };
        let mut state = state.lock().unwrap();

        let threshold = self.trust_threshold;
        let idx = state
            .pairs
            .iter()
            .position(|p| p.location == info.label && p.device == device)
            .unwrap_or_else(|| {
                state.pairs.push(PairState {
                    location: info.label.clone(),
                    device: device.to_string(),
                    first_seen: timestamp,
                    last_seen: timestamp,
                    observations: 0,
                    clean_run: 0,
                    status: LocationStatus::New,
                });
                state.pairs.len() - 1
            });
        let pair = &mut state.pairs[idx];

        pair.last_seen = timestamp;
        pair.observations += 1;
        if status == LocationStatus::Suspicious {
            pair.clean_run = 0;
            pair.status = LocationStatus::Suspicious;
        } else {
            pair.clean_run += 1;
            pair.status = if pair.clean_run >= threshold {
                LocationStatus::Trusted
            } else {
                LocationStatus::New
            };
        }
        debug!(user_id, location = %info.label, device, ?status, "location settled");

        if let Some(coords) = info.coordinates {
            state.last_fix = Some((coords.0, coords.1, timestamp));
        }
    }

    /// Returns true if the user has a settled observation from this
    /// device at any location.
    #[must_use]
    pub fn device_known(&self, user_id: &str, device: &str) -> bool {
        match self.state_of(user_id) {
            Some(state) => state.lock().unwrap().pairs.iter().any(|p| p.device == device),
            None => false,
        }
    }

    /// The user's location history in first-observation order.
    #[must_use]
    pub fn history(&self, user_id: &str) -> Vec<LocationRecord> {
        match self.state_of(user_id) {
            Some(state) => state
                .lock()
                .unwrap()
                .pairs
                .iter()
                .map(|p| LocationRecord {
                    user_id: user_id.to_string(),
                    location: p.location.clone(),
                    device: p.device.clone(),
                    first_seen: p.first_seen,
                    last_seen: p.last_seen,
                    observations: p.observations,
                    status: p.status,
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_YORK: (f64, f64) = (40.7128, -74.0060);
    const LOS_ANGELES: (f64, f64) = (34.0522, -118.2437);

    fn tracker() -> LocationTrustTracker {
        LocationTrustTracker::new(2, 800.0, 3_600)
    }

    fn ny() -> LocationInfo {
        LocationInfo::known("New York, NY", NEW_YORK.0, NEW_YORK.1)
    }

    fn la() -> LocationInfo {
        LocationInfo::known("Los Angeles, CA", LOS_ANGELES.0, LOS_ANGELES.1)
    }

    #[test]
    fn test_haversine_known_distances() {
        let d = haversine_km(NEW_YORK, LOS_ANGELES);
        assert!((3_900.0..4_000.0).contains(&d), "NY-LA was {d} km");
        assert!(haversine_km(NEW_YORK, NEW_YORK) < 1e-9);
    }

    #[test]
    fn test_first_observation_is_new() {
        let t = tracker();
        assert_eq!(t.classify("user-1", &ny(), "iPhone 13", 1_000), LocationStatus::New);
    }

    #[test]
    fn test_trust_after_threshold_clean_observations() {
        let t = tracker();
        let device = "iPhone 13";

        let s1 = t.classify("user-1", &ny(), device, 1_000);
        assert_eq!(s1, LocationStatus::New);
        t.settle("user-1", &ny(), device, 1_000, s1);

        let s2 = t.classify("user-1", &ny(), device, 10_000);
        assert_eq!(s2, LocationStatus::New);
        t.settle("user-1", &ny(), device, 10_000, s2);

        // Two clean observations settled; the pair is now trusted.
        assert_eq!(
            t.classify("user-1", &ny(), device, 20_000),
            LocationStatus::Trusted
        );
        assert_eq!(t.history("user-1")[0].status, LocationStatus::Trusted);
    }

    #[test]
    fn test_vpn_and_unknown_force_suspicious() {
        let t = tracker();
        let vpn = LocationInfo {
            label: "Unknown Location (VPN)".into(),
            coordinates: None,
            marker: LocationMarker::Vpn,
        };
        assert_eq!(
            t.classify("user-1", &vpn, "Unknown Device", 1_000),
            LocationStatus::Suspicious
        );
        assert_eq!(
            t.classify("user-1", &LocationInfo::unknown("?"), "d", 1_000),
            LocationStatus::Suspicious
        );
    }

    #[test]
    fn test_impossible_travel_within_window() {
        let t = tracker();
        let s = t.classify("user-1", &ny(), "iPhone 13", 1_000);
        t.settle("user-1", &ny(), "iPhone 13", 1_000, s);

        // NY to LA in 30 minutes is a >800 km jump inside the window.
        assert_eq!(
            t.classify("user-1", &la(), "iPhone 13", 1_000 + 1_800),
            LocationStatus::Suspicious
        );

        // The same jump outside the window is just a new pair.
        assert_eq!(
            t.classify("user-1", &la(), "iPhone 13", 1_000 + 7_200),
            LocationStatus::New
        );
    }

    #[test]
    fn test_suspicious_resets_clean_run() {
        let t = tracker();
        let device = "iPhone 13";

        let s = t.classify("user-1", &ny(), device, 1_000);
        t.settle("user-1", &ny(), device, 1_000, s);

        // Forced suspicious observation of the same pair.
        t.settle("user-1", &ny(), device, 2_000, LocationStatus::Suspicious);
        assert_eq!(t.history("user-1")[0].status, LocationStatus::Suspicious);

        // Trust is re-earned from scratch: two clean observations again.
        let s = t.classify("user-1", &ny(), device, 10_000);
        assert_eq!(s, LocationStatus::New);
        t.settle("user-1", &ny(), device, 10_000, s);
        let s = t.classify("user-1", &ny(), device, 20_000);
        assert_eq!(s, LocationStatus::New);
        t.settle("user-1", &ny(), device, 20_000, s);

        assert_eq!(
            t.classify("user-1", &ny(), device, 30_000),
            LocationStatus::Trusted
        );
    }

    #[test]
    fn test_device_recognition() {
        let t = tracker();
        assert!(!t.device_known("user-1", "iPhone 13"));

        let s = t.classify("user-1", &ny(), "iPhone 13", 1_000);
        t.settle("user-1", &ny(), "iPhone 13", 1_000, s);

        assert!(t.device_known("user-1", "iPhone 13"));
        assert!(!t.device_known("user-1", "MacBook Pro"));
        assert!(!t.device_known("user-2", "iPhone 13"));
    }

    #[test]
    fn test_history_order_and_counts() {
        let t = tracker();
        let s = t.classify("user-1", &ny(), "iPhone 13", 1_000);
        t.settle("user-1", &ny(), "iPhone 13", 1_000, s);
        let s = t.classify("user-1", &la(), "MacBook Pro", 100_000);
        t.settle("user-1", &la(), "MacBook Pro", 100_000, s);
        let s = t.classify("user-1", &ny(), "iPhone 13", 200_000);
        t.settle("user-1", &ny(), "iPhone 13", 200_000, s);

        let history = t.history("user-1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].location, "New York, NY");
        assert_eq!(history[0].observations, 2);
        assert_eq!(history[0].first_seen, 1_000);
        assert_eq!(history[0].last_seen, 200_000);
        assert_eq!(history[1].location, "Los Angeles, CA");
    }
}

//! Reward rates, redemption catalog and session timing.

use std::collections::HashMap;

use chrono::Duration;
use serde::Deserialize;

use crate::ledger::{default_methods, RateTable, RedemptionCatalog, RedemptionMethod, DEFAULT_RATES};
use crate::pairing::{SessionSettings, DEFAULT_STATION};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    /// Points per kilogram, keyed by material.
    pub materials: HashMap<String, f64>,
    /// Cash units per redeemed point.
    pub cash_per_point: f64,
    pub redemption_methods: Vec<RedemptionMethod>,
    /// Reject redemption methods missing from the catalog.
    pub validate_methods: bool,
    /// Reject spends below the method's minimum.
    pub enforce_minimums: bool,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            materials: DEFAULT_RATES
                .iter()
                .map(|(material, rate)| (material.to_string(), *rate))
                .collect(),
            cash_per_point: 10.0,
            redemption_methods: default_methods(),
            validate_methods: true,
            enforce_minimums: false,
        }
    }
}

impl RewardsConfig {
    pub fn rate_table(&self) -> RateTable {
        RateTable::new(self.materials.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    pub fn catalog(&self) -> RedemptionCatalog {
        RedemptionCatalog::new(self.redemption_methods.clone(), self.cash_per_point)
            .with_method_validation(self.validate_methods)
            .with_minimums(self.enforce_minimums)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pairing session lifetime.
    pub ttl_secs: u64,
    pub default_station: String,
    /// How often the reaper sweeps overdue sessions; 0 disables it.
    pub reaper_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            default_station: DEFAULT_STATION.to_string(),
            reaper_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            ttl: Duration::seconds(self.ttl_secs.min(i32::MAX as u64) as i64),
            default_station: self.default_station.clone(),
        }
    }
}

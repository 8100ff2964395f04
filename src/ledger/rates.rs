//! Material rate table and point quoting.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Result, RewardsError};

/// Default points per kilogram for each accepted material.
pub const DEFAULT_RATES: [(&str, f64); 4] = [
    ("plastic", 10.0),
    ("glass", 8.0),
    ("metal", 15.0),
    ("paper", 5.0),
];

/// Largest award a single deposit may earn.
pub const MAX_POINTS_PER_DEPOSIT: i64 = 1_000_000;

/// Points awarded for a given material and weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub material: String,
    pub weight_kg: f64,
    pub points: i64,
}

/// Static mapping from material kind to points per kilogram.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rates: BTreeMap<String, f64>,
}

impl RateTable {
    pub fn new<I, K>(rates: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        Self {
            rates: rates
                .into_iter()
                .map(|(k, v)| (normalize(k.as_ref()), v))
                .collect(),
        }
    }

    pub fn rate_per_kg(&self, material: &str) -> Result<f64> {
        self.rates
            .get(&normalize(material))
            .copied()
            .ok_or_else(|| RewardsError::UnknownMaterial(material.trim().to_string()))
    }

    /// Quote `floor(weight_kg * rate)` points.
    ///
    /// Weights must be finite and positive, and must be heavy enough to earn
    /// at least one point. Awards above [`MAX_POINTS_PER_DEPOSIT`] are refused.
    pub fn quote(&self, material: &str, weight_kg: f64) -> Result<Quote> {
        if !weight_kg.is_finite() || weight_kg <= 0.0 {
            return Err(RewardsError::InvalidQuantity(format!(
                "weight must be a positive number of kilograms, got {weight_kg}"
            )));
        }
        let rate = self.rate_per_kg(material)?;
        let raw = (weight_kg * rate).floor();
        if !raw.is_finite() || raw > MAX_POINTS_PER_DEPOSIT as f64 {
            return Err(RewardsError::InvalidQuantity(format!(
                "{weight_kg} kg exceeds the per-deposit limit of {MAX_POINTS_PER_DEPOSIT} points"
            )));
        }
        let points = raw as i64;
        if points <= 0 {
            return Err(RewardsError::InvalidQuantity(format!(
                "{weight_kg} kg earns no points"
            )));
        }
        Ok(Quote {
            material: normalize(material),
            weight_kg,
            points,
        })
    }

    pub fn materials(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::new(DEFAULT_RATES)
    }
}

fn normalize(material: &str) -> String {
    material.trim().to_ascii_lowercase()
}

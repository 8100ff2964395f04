//! Redemption catalog.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RewardsError};

/// One way of cashing out points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionMethod {
    pub method: String,
    pub name: String,
    pub min_points: i64,
    /// Overrides the catalog-wide rate for this method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_per_point: Option<f64>,
    #[serde(default)]
    pub description: String,
}

impl RedemptionMethod {
    fn new(method: &str, name: &str, min_points: i64, description: &str) -> Self {
        Self {
            method: method.to_string(),
            name: name.to_string(),
            min_points,
            cash_per_point: None,
            description: description.to_string(),
        }
    }
}

/// Methods offered out of the box.
pub fn default_methods() -> Vec<RedemptionMethod> {
    vec![
        RedemptionMethod::new("bank", "Bank Transfer", 1000, "Transfer to a bank account"),
        RedemptionMethod::new("cash", "Cash", 500, "Collect cash at a partner outlet"),
        RedemptionMethod::new("voucher", "Voucher", 250, "Shopping voucher code"),
    ]
}

/// Prices spends and validates redemption methods.
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionCatalog {
    methods: Vec<RedemptionMethod>,
    cash_per_point: f64,
    validate_methods: bool,
    enforce_minimums: bool,
}

impl RedemptionCatalog {
    pub fn new(methods: Vec<RedemptionMethod>, cash_per_point: f64) -> Self {
        Self {
            methods,
            cash_per_point,
            validate_methods: true,
            enforce_minimums: false,
        }
    }

    /// Accept any method string when `validate` is false.
    pub fn with_method_validation(mut self, validate: bool) -> Self {
        self.validate_methods = validate;
        self
    }

    /// Reject spends below the method's minimum when `enforce` is true.
    pub fn with_minimums(mut self, enforce: bool) -> Self {
        self.enforce_minimums = enforce;
        self
    }

    pub fn methods(&self) -> &[RedemptionMethod] {
        &self.methods
    }

    pub fn cash_per_point(&self) -> f64 {
        self.cash_per_point
    }

    /// Rate applied to `method`, falling back to the catalog-wide rate.
    pub fn rate_for(&self, method: &str) -> f64 {
        self.methods
            .iter()
            .find(|m| m.method == method.trim())
            .and_then(|m| m.cash_per_point)
            .unwrap_or(self.cash_per_point)
    }

    /// Cash-equivalent of spending `points` through `method`.
    pub fn price(&self, method: &str, points: i64) -> Result<f64> {
        if points <= 0 {
            return Err(RewardsError::InvalidQuantity(format!(
                "points must be positive, got {points}"
            )));
        }
        if method.trim().is_empty() {
            return Err(RewardsError::invalid_input("redemption method is required"));
        }

        let found = self.methods.iter().find(|m| m.method == method.trim());
        match found {
            None if self.validate_methods => {
                return Err(RewardsError::invalid_input(format!(
                    "unsupported redemption method: {method}"
                )));
            }
            Some(m) if self.enforce_minimums && points < m.min_points => {
                return Err(RewardsError::InvalidQuantity(format!(
                    "{} requires at least {} points",
                    m.method, m.min_points
                )));
            }
            _ => {}
        }

        let rate = found
            .and_then(|m| m.cash_per_point)
            .unwrap_or(self.cash_per_point);
        Ok(points as f64 * rate)
    }
}

impl Default for RedemptionCatalog {
    fn default() -> Self {
        Self::new(default_methods(), 10.0)
    }
}

//! Ledger records and write requests.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identity::OwnerId;

/// Default page size for history queries.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Redemption status at creation.
pub const REDEMPTION_PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Deposit,
    Redemption,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Redemption => "redemption",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryKind::Deposit),
            "redemption" => Ok(EntryKind::Redemption),
            other => Err(format!("unknown ledger entry kind: {other}")),
        }
    }
}

/// One immutable, signed point movement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub owner: OwnerId,
    pub delta: i64,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A quoted earn, ready to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEarn {
    pub owner: OwnerId,
    pub material: String,
    pub weight_kg: f64,
    pub points: i64,
    pub session_token: Option<String>,
    pub at: DateTime<Utc>,
}

impl NewEarn {
    pub(crate) fn into_entry(self, id: i64) -> LedgerEntry {
        LedgerEntry {
            id,
            owner: self.owner,
            delta: self.points,
            kind: EntryKind::Deposit,
            material: Some(self.material),
            weight_kg: Some(self.weight_kg),
            cash_amount: None,
            session_token: self.session_token,
            created_at: self.at,
        }
    }
}

/// A priced spend, ready to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSpend {
    pub owner: OwnerId,
    pub points: i64,
    pub cash_amount: f64,
    pub method: String,
    pub account_info: String,
    pub at: DateTime<Utc>,
}

impl NewSpend {
    pub(crate) fn to_entry(&self, id: i64) -> LedgerEntry {
        LedgerEntry {
            id,
            owner: self.owner.clone(),
            delta: -self.points,
            kind: EntryKind::Redemption,
            material: None,
            weight_kg: None,
            cash_amount: Some(self.cash_amount),
            session_token: None,
            created_at: self.at,
        }
    }

    pub(crate) fn to_redemption(&self, id: i64, entry_id: i64) -> Redemption {
        Redemption {
            id,
            owner: self.owner.clone(),
            entry_id,
            points_used: self.points,
            cash_amount: self.cash_amount,
            method: self.method.clone(),
            account_info: self.account_info.clone(),
            status: REDEMPTION_PENDING.to_string(),
            created_at: self.at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarnReceipt {
    pub entry_id: i64,
    pub points_awarded: i64,
    pub new_balance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendReceipt {
    pub entry_id: i64,
    pub redemption_id: i64,
    pub cash_amount: f64,
    pub new_balance: i64,
}

/// Redemption request record, correlated with its negative ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Redemption {
    pub id: i64,
    pub owner: OwnerId,
    pub entry_id: i64,
    pub points_used: i64,
    pub cash_amount: f64,
    pub method: String,
    pub account_info: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterialStats {
    pub material: String,
    pub deposits: i64,
    pub weight_kg: f64,
    pub points: i64,
}

/// Deposit totals for one owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepositStats {
    pub total_deposits: i64,
    pub total_weight_kg: f64,
    pub total_points: i64,
    pub by_material: Vec<MaterialStats>,
}

impl DepositStats {
    /// Build totals from per-material rows.
    pub fn from_materials(by_material: Vec<MaterialStats>) -> Self {
        let mut stats = DepositStats::default();
        for m in &by_material {
            stats.total_deposits += m.deposits;
            stats.total_weight_kg += m.weight_kg;
            stats.total_points += m.points;
        }
        stats.by_material = by_material;
        stats
    }
}

/// Limit/offset window over newest-first history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .min(MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

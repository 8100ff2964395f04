//! Points ledger.
//!
//! Owns point balances and the append-only entry log. Every earn and spend is
//! a single storage transaction that appends the entry and moves the cached
//! balance together, so `balance == sum(delta)` holds at every observation.

mod catalog;
mod entry;
mod rates;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

pub use catalog::{default_methods, RedemptionCatalog, RedemptionMethod};
pub use entry::{
    DepositStats, EarnReceipt, EntryKind, LedgerEntry, MaterialStats, NewEarn, NewSpend, Page,
    Redemption, SpendReceipt, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, REDEMPTION_PENDING,
};
pub use rates::{Quote, RateTable, DEFAULT_RATES, MAX_POINTS_PER_DEPOSIT};

use crate::clock::Clock;
use crate::error::{Result, RewardsError};
use crate::identity::OwnerId;
use crate::storage::{LedgerStore, StorageError};

/// Current balance plus what it can be redeemed for.
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionOptions {
    pub balance: i64,
    pub cash_per_point: f64,
    pub methods: Vec<RedemptionMethod>,
}

/// Earn/spend front door over a [`LedgerStore`].
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    rates: RateTable,
    catalog: RedemptionCatalog,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        rates: RateTable,
        catalog: RedemptionCatalog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            rates,
            catalog,
            clock,
        }
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn catalog(&self) -> &RedemptionCatalog {
        &self.catalog
    }

    /// Price a deposit against the rate table. Nothing is written.
    pub fn quote_earn(&self, owner: &OwnerId, material: &str, weight_kg: f64) -> Result<NewEarn> {
        if material.trim().is_empty() {
            return Err(RewardsError::invalid_input("material is required"));
        }
        let quote = self.rates.quote(material, weight_kg)?;
        Ok(NewEarn {
            owner: owner.clone(),
            material: quote.material,
            weight_kg: quote.weight_kg,
            points: quote.points,
            session_token: None,
            at: self.clock.now(),
        })
    }

    /// Credit `floor(weight_kg * rate)` points to `owner`.
    pub async fn earn(&self, owner: &OwnerId, material: &str, weight_kg: f64) -> Result<EarnReceipt> {
        let earn = self.quote_earn(owner, material, weight_kg)?;
        let receipt = self.store.append_earn(earn.clone()).await?;
        log_earned(&earn, &receipt);
        Ok(receipt)
    }

    /// Debit `points` from `owner` and open a pending redemption.
    pub async fn spend(
        &self,
        owner: &OwnerId,
        points: i64,
        method: &str,
        account_info: &str,
    ) -> Result<SpendReceipt> {
        let cash_amount = self.catalog.price(method, points)?;
        let result = self
            .store
            .append_spend(NewSpend {
                owner: owner.clone(),
                points,
                cash_amount,
                method: method.trim().to_string(),
                account_info: account_info.to_string(),
                at: self.clock.now(),
            })
            .await;

        match &result {
            Ok(receipt) => info!(
                owner = %owner,
                points,
                method = method.trim(),
                cash_amount,
                balance = receipt.new_balance,
                "points redeemed"
            ),
            Err(e) => debug!(owner = %owner, points, error = %e, "redemption rejected"),
        }
        result
    }

    /// Committed balance; unknown owners have zero.
    pub async fn balance_of(&self, owner: &OwnerId) -> Result<i64> {
        self.store.balance(owner).await
    }

    pub async fn history(&self, owner: &OwnerId, page: Page) -> Result<Vec<LedgerEntry>> {
        self.store.entries(owner, page).await
    }

    pub async fn entry(&self, owner: &OwnerId, id: i64) -> Result<LedgerEntry> {
        self.store
            .entry(owner, id)
            .await?
            .ok_or_else(|| RewardsError::not_found(format!("ledger entry {id}")))
    }

    pub async fn redemption_options(&self, owner: &OwnerId) -> Result<RedemptionOptions> {
        Ok(RedemptionOptions {
            balance: self.store.balance(owner).await?,
            cash_per_point: self.catalog.cash_per_point(),
            methods: self.catalog.methods().to_vec(),
        })
    }

    pub async fn redemption_history(&self, owner: &OwnerId, limit: Option<u32>) -> Result<Vec<Redemption>> {
        let page = Page::new(limit, None);
        self.store.redemptions(owner, page.limit).await
    }

    pub async fn deposit_stats(&self, owner: &OwnerId) -> Result<DepositStats> {
        self.store.deposit_stats(owner).await
    }

    /// Recompute `sum(delta)` and compare it with the cached balance.
    pub async fn audit(&self, owner: &OwnerId) -> Result<i64> {
        let cached = self.store.balance(owner).await?;
        let ledger = self.store.ledger_sum(owner).await?;
        if cached != ledger {
            return Err(StorageError::BalanceDrift {
                owner: owner.to_string(),
                cached,
                ledger,
            }
            .into());
        }
        Ok(cached)
    }
}

/// Log a committed earn, whichever path wrote it.
pub(crate) fn log_earned(earn: &NewEarn, receipt: &EarnReceipt) {
    info!(
        owner = %earn.owner,
        material = %earn.material,
        weight_kg = earn.weight_kg,
        session = earn.session_token.as_deref().unwrap_or("-"),
        entry_id = receipt.entry_id,
        points = receipt.points_awarded,
        balance = receipt.new_balance,
        "points earned"
    );
}

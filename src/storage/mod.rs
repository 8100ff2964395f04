//! Storage implementations.
//!
//! Two interfaces back the cores:
//! - [`LedgerStore`]: append-only entries plus the cached balance projection
//! - [`SessionStore`]: pairing session records
//!
//! Every mutating call is one transaction. Backends lock per owner and per
//! session token (row locks on Postgres, per-key mutexes in memory); SQLite
//! serializes writers with `BEGIN IMMEDIATE`.

use std::sync::Arc;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use std::time::Duration;

use async_trait::async_trait;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use backon::Retryable;
use chrono::{DateTime, Utc};
use tracing::info;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use tracing::warn;

use crate::config::{StorageConfig, StorageType};
use crate::error::{Result, RewardsError};
use crate::identity::OwnerId;
use crate::ledger::{
    DepositStats, EarnReceipt, LedgerEntry, NewEarn, NewSpend, Page, Redemption, SpendReceipt,
};
use crate::pairing::{PairingSession, Transition};
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use crate::utils::retry::{connection_backoff, is_retryable};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Errors raised by the backing store itself.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("balance drift for {owner}: cached {cached}, ledger sum {ledger}")]
    BalanceDrift {
        owner: String,
        cached: i64,
        ledger: i64,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend not enabled: {0}")]
    BackendDisabled(&'static str),
}

/// Points ledger persistence.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append a positive entry and raise the owner's balance, atomically.
    async fn append_earn(&self, earn: NewEarn) -> Result<EarnReceipt>;

    /// Append a negative entry, lower the balance and record the redemption,
    /// atomically. Fails with `InsufficientBalance` without writing anything
    /// when the balance under lock is smaller than `spend.points`.
    async fn append_spend(&self, spend: NewSpend) -> Result<SpendReceipt>;

    /// Cached balance; zero for owners with no entries.
    async fn balance(&self, owner: &OwnerId) -> Result<i64>;

    /// `sum(delta)` recomputed from the entries.
    async fn ledger_sum(&self, owner: &OwnerId) -> Result<i64>;

    /// Entries newest first.
    async fn entries(&self, owner: &OwnerId, page: Page) -> Result<Vec<LedgerEntry>>;

    async fn entry(&self, owner: &OwnerId, id: i64) -> Result<Option<LedgerEntry>>;

    /// Redemptions newest first.
    async fn redemptions(&self, owner: &OwnerId, limit: u32) -> Result<Vec<Redemption>>;

    async fn deposit_stats(&self, owner: &OwnerId) -> Result<DepositStats>;
}

/// Pairing session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &PairingSession) -> Result<()>;

    async fn get(&self, token: &str) -> Result<Option<PairingSession>>;

    /// Load the session under lock, apply `transition`, persist any change and
    /// commit. Changes from lazy expiry are persisted even when the transition
    /// is rejected.
    async fn transition(
        &self,
        token: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<PairingSession>;

    /// Authorize `earn.owner` against the session, append the earn, update
    /// the balance and escalate the session, all in one transaction.
    async fn record_deposit(
        &self,
        token: &str,
        earn: NewEarn,
        now: DateTime<Utc>,
    ) -> Result<(EarnReceipt, PairingSession)>;

    /// Mark overdue non-terminal sessions expired. Returns how many changed.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Balance after crediting `points`. Refuses awards that would overflow.
pub(crate) fn credit(balance: i64, points: i64) -> Result<i64> {
    balance.checked_add(points).ok_or_else(|| {
        RewardsError::InvalidQuantity(format!(
            "crediting {points} points would overflow a balance of {balance}"
        ))
    })
}

/// Store handles shared by the services.
#[derive(Clone)]
pub struct Storage {
    pub ledger: Arc<dyn LedgerStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Storage {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: LedgerStore + SessionStore + 'static,
    {
        Self {
            ledger: store.clone(),
            sessions: store,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> std::result::Result<Storage, Box<dyn std::error::Error>> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: in-memory");
            Ok(Storage::from_store(Arc::new(MemoryStore::new())))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!("Storage: sqlite at {}", config.sqlite.path);
            let store = (|| SqliteStore::connect(&config.sqlite.path))
                .retry(connection_backoff())
                .when(is_retryable)
                .notify(|err: &crate::RewardsError, dur: Duration| {
                    warn!(error = %err, delay = ?dur, "SQLite connect failed, retrying");
                })
                .await?;
            store.init().await?;
            Ok(Storage::from_store(Arc::new(store)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::BackendDisabled("sqlite").into())
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            info!("Storage: postgres");
            let store = (|| {
                PostgresStore::connect(&config.postgres.uri, config.postgres.max_connections)
            })
            .retry(connection_backoff())
            .when(is_retryable)
            .notify(|err: &crate::RewardsError, dur: Duration| {
                warn!(error = %err, delay = ?dur, "Postgres connect failed, retrying");
            })
            .await?;
            store.init().await?;
            Ok(Storage::from_store(Arc::new(store)))
        }
        #[cfg(not(feature = "postgres"))]
        StorageType::Postgres => {
            tracing::error!("Postgres storage requested but 'postgres' feature is not enabled");
            Err(StorageError::BackendDisabled("postgres").into())
        }
    }
}

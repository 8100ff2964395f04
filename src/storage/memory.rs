//! In-memory storage.
//!
//! Each owner account and each session sits behind its own async mutex, so
//! writers for different owners or tokens never wait on each other. Deposits
//! take the session lock before the owner lock; nothing takes them in the
//! opposite order.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{credit, LedgerStore, SessionStore, StorageError};
use crate::error::{Result, RewardsError};
use crate::identity::OwnerId;
use crate::ledger::{
    DepositStats, EarnReceipt, EntryKind, LedgerEntry, MaterialStats, NewEarn, NewSpend, Page,
    Redemption, SpendReceipt,
};
use crate::pairing::{PairingSession, Transition};

#[derive(Debug, Default)]
struct Account {
    balance: i64,
    entries: Vec<LedgerEntry>,
    redemptions: Vec<Redemption>,
}

impl Account {
    fn append_earn(&mut self, earn: NewEarn, id: i64) -> Result<EarnReceipt> {
        let points = earn.points;
        let new_balance = credit(self.balance, points)?;
        self.entries.push(earn.into_entry(id));
        self.balance = new_balance;
        Ok(EarnReceipt {
            entry_id: id,
            points_awarded: points,
            new_balance,
        })
    }
}

type Shared<T> = Arc<Mutex<T>>;

/// Storage that lives and dies with the process.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<OwnerId, Shared<Account>>>,
    sessions: RwLock<HashMap<String, Shared<PairingSession>>>,
    next_entry_id: AtomicI64,
    next_redemption_id: AtomicI64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a storage error.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("write failure injected".into()).into());
        }
        Ok(())
    }

    fn entry_id(&self) -> i64 {
        self.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn redemption_id(&self) -> i64 {
        self.next_redemption_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn account(&self, owner: &OwnerId) -> Shared<Account> {
        get_or_default(&self.accounts, owner).await
    }

    async fn existing_account(&self, owner: &OwnerId) -> Option<Shared<Account>> {
        self.accounts.read().await.get(owner).cloned()
    }

    async fn session(&self, token: &str) -> Result<Shared<PairingSession>> {
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| RewardsError::not_found("pairing session"))
    }
}

async fn get_or_default<K, V>(map: &RwLock<HashMap<K, Shared<V>>>, key: &K) -> Shared<V>
where
    K: Eq + Hash + Clone,
    V: Default,
{
    if let Some(v) = map.read().await.get(key) {
        return v.clone();
    }
    map.write().await.entry(key.clone()).or_default().clone()
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_earn(&self, earn: NewEarn) -> Result<EarnReceipt> {
        self.check_writable()?;
        let account = self.account(&earn.owner).await;
        let mut account = account.lock().await;
        account.append_earn(earn, self.entry_id())
    }

    async fn append_spend(&self, spend: NewSpend) -> Result<SpendReceipt> {
        self.check_writable()?;
        let account = self.account(&spend.owner).await;
        let mut account = account.lock().await;

        if spend.points > account.balance {
            return Err(RewardsError::InsufficientBalance {
                requested: spend.points,
                available: account.balance,
            });
        }

        let entry_id = self.entry_id();
        let redemption_id = self.redemption_id();
        account.entries.push(spend.to_entry(entry_id));
        account
            .redemptions
            .push(spend.to_redemption(redemption_id, entry_id));
        account.balance -= spend.points;

        Ok(SpendReceipt {
            entry_id,
            redemption_id,
            cash_amount: spend.cash_amount,
            new_balance: account.balance,
        })
    }

    async fn balance(&self, owner: &OwnerId) -> Result<i64> {
        match self.existing_account(owner).await {
            Some(account) => Ok(account.lock().await.balance),
            None => Ok(0),
        }
    }

    async fn ledger_sum(&self, owner: &OwnerId) -> Result<i64> {
        match self.existing_account(owner).await {
            Some(account) => Ok(account.lock().await.entries.iter().map(|e| e.delta).sum()),
            None => Ok(0),
        }
    }

    async fn entries(&self, owner: &OwnerId, page: Page) -> Result<Vec<LedgerEntry>> {
        let Some(account) = self.existing_account(owner).await else {
            return Ok(Vec::new());
        };
        let account = account.lock().await;
        Ok(account
            .entries
            .iter()
            .rev()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn entry(&self, owner: &OwnerId, id: i64) -> Result<Option<LedgerEntry>> {
        let Some(account) = self.existing_account(owner).await else {
            return Ok(None);
        };
        let account = account.lock().await;
        Ok(account.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn redemptions(&self, owner: &OwnerId, limit: u32) -> Result<Vec<Redemption>> {
        let Some(account) = self.existing_account(owner).await else {
            return Ok(Vec::new());
        };
        let account = account.lock().await;
        Ok(account
            .redemptions
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn deposit_stats(&self, owner: &OwnerId) -> Result<DepositStats> {
        let Some(account) = self.existing_account(owner).await else {
            return Ok(DepositStats::default());
        };
        let account = account.lock().await;

        let mut by_material: BTreeMap<String, MaterialStats> = BTreeMap::new();
        for entry in account.entries.iter().filter(|e| e.kind == EntryKind::Deposit) {
            let material = entry.material.clone().unwrap_or_default();
            let stats = by_material
                .entry(material.clone())
                .or_insert_with(|| MaterialStats {
                    material,
                    ..Default::default()
                });
            stats.deposits += 1;
            stats.weight_kg += entry.weight_kg.unwrap_or_default();
            stats.points += entry.delta;
        }
        Ok(DepositStats::from_materials(by_material.into_values().collect()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: &PairingSession) -> Result<()> {
        self.check_writable()?;
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.token) {
            return Err(StorageError::Corrupt(format!(
                "duplicate session token {}",
                session.token
            ))
            .into());
        }
        sessions.insert(session.token.clone(), Arc::new(Mutex::new(session.clone())));
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<PairingSession>> {
        let found = self.sessions.read().await.get(token).cloned();
        match found {
            Some(session) => Ok(Some(session.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn transition(
        &self,
        token: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<PairingSession> {
        let session = self.session(token).await?;
        let mut session = session.lock().await;

        let mut next = session.clone();
        let outcome = next.apply(&transition, now);
        if next != *session {
            self.check_writable()?;
            *session = next;
        }
        outcome.map(|_| session.clone())
    }

    async fn record_deposit(
        &self,
        token: &str,
        earn: NewEarn,
        now: DateTime<Utc>,
    ) -> Result<(EarnReceipt, PairingSession)> {
        self.check_writable()?;
        let session = self.session(token).await?;
        let mut session = session.lock().await;

        let mut next = session.clone();
        let outcome = next.apply(
            &Transition::Deposit {
                caller: earn.owner.clone(),
            },
            now,
        );
        if let Err(e) = outcome {
            *session = next;
            return Err(e);
        }

        let account = self.account(&earn.owner).await;
        let mut account = account.lock().await;
        let receipt = account.append_earn(earn, self.entry_id())?;
        *session = next;

        Ok((receipt, session.clone()))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        self.check_writable()?;
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut expired = 0;
        for session in sessions {
            if session.lock().await.refresh(now) {
                expired += 1;
            }
        }
        Ok(expired)
    }
}

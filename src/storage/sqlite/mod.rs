//! SQLite storage.
//!
//! Writes run inside `BEGIN IMMEDIATE` so the write lock is taken up front;
//! SQLite has a single writer, which makes each ledger or session write
//! serializable. Reads go straight to the pool.

mod ledger_store;
mod session_store;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use super::schema::{decode, decode_ts, encode_ts, Balances, LedgerEntries, SQLITE_SCHEMA};
use super::{credit, StorageError};
use crate::error::Result;
use crate::identity::OwnerId;
use crate::ledger::{EarnReceipt, LedgerEntry, NewEarn};

/// SQLite implementation of [`LedgerStore`](super::LedgerStore) and
/// [`SessionStore`](super::SessionStore).
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path`. `:memory:` gives a
    /// private in-memory database on a single pinned connection.
    pub async fn connect(path: &str) -> Result<Self> {
        if path.is_empty() || path == ":memory:" {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?;
            return Ok(Self::new(pool));
        }

        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SQLITE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
// when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
// The transaction rolls back on drop, so a cancelled write never leaves its
// pooled connection holding the lock.
async fn begin(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

async fn finish<T>(tx: Transaction<'static, Sqlite>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

/// Current balance, creating the owner's row at zero if missing.
async fn lock_balance(conn: &mut SqliteConnection, owner: &OwnerId, now: &str) -> Result<i64> {
    let query = Query::insert()
        .into_table(Balances::Table)
        .columns([Balances::Owner, Balances::Points, Balances::UpdatedAt])
        .values_panic([owner.as_str().into(), 0i64.into(), now.into()])
        .on_conflict(OnConflict::column(Balances::Owner).do_nothing().to_owned())
        .to_string(SqliteQueryBuilder);
    sqlx::query(&query).execute(&mut *conn).await?;

    let query = Query::select()
        .column(Balances::Points)
        .from(Balances::Table)
        .and_where(Expr::col(Balances::Owner).eq(owner.as_str()))
        .to_string(SqliteQueryBuilder);
    let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
    Ok(row.try_get("points")?)
}

async fn store_balance(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    points: i64,
    now: &str,
) -> Result<()> {
    let query = Query::update()
        .table(Balances::Table)
        .values([
            (Balances::Points, points.into()),
            (Balances::UpdatedAt, now.into()),
        ])
        .and_where(Expr::col(Balances::Owner).eq(owner.as_str()))
        .to_string(SqliteQueryBuilder);
    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

/// Append one entry row and return its id.
async fn insert_entry(conn: &mut SqliteConnection, entry: &LedgerEntry) -> Result<i64> {
    let query = Query::insert()
        .into_table(LedgerEntries::Table)
        .columns([
            LedgerEntries::Owner,
            LedgerEntries::Delta,
            LedgerEntries::Kind,
            LedgerEntries::Material,
            LedgerEntries::WeightKg,
            LedgerEntries::CashAmount,
            LedgerEntries::SessionToken,
            LedgerEntries::CreatedAt,
        ])
        .values_panic([
            entry.owner.as_str().into(),
            entry.delta.into(),
            entry.kind.as_str().into(),
            entry.material.clone().into(),
            entry.weight_kg.into(),
            entry.cash_amount.into(),
            entry.session_token.clone().into(),
            encode_ts(&entry.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder);
    let result = sqlx::query(&query).execute(&mut *conn).await?;
    Ok(result.last_insert_rowid())
}

/// Append an earn and raise the balance. Caller owns the transaction.
async fn apply_earn(conn: &mut SqliteConnection, earn: NewEarn) -> Result<EarnReceipt> {
    let now = encode_ts(&earn.at);
    let owner = earn.owner.clone();
    let points = earn.points;

    let balance = lock_balance(conn, &owner, &now).await?;
    let new_balance = credit(balance, points)?;
    let entry_id = insert_entry(conn, &earn.into_entry(0)).await?;
    store_balance(conn, &owner, new_balance, &now).await?;

    Ok(EarnReceipt {
        entry_id,
        points_awarded: points,
        new_balance,
    })
}

fn entry_columns() -> [LedgerEntries; 9] {
    [
        LedgerEntries::Id,
        LedgerEntries::Owner,
        LedgerEntries::Delta,
        LedgerEntries::Kind,
        LedgerEntries::Material,
        LedgerEntries::WeightKg,
        LedgerEntries::CashAmount,
        LedgerEntries::SessionToken,
        LedgerEntries::CreatedAt,
    ]
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry> {
    let kind: String = row.try_get("kind")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        owner: OwnerId::new(row.try_get::<String, _>("owner")?),
        delta: row.try_get("delta")?,
        kind: decode(&kind)?,
        material: row.try_get("material")?,
        weight_kg: row.try_get("weight_kg")?,
        cash_amount: row.try_get("cash_amount")?,
        session_token: row.try_get("session_token")?,
        created_at: decode_ts(&created_at)?,
    })
}

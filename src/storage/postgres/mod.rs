//! PostgreSQL storage.
//!
//! Writes run in a transaction that row-locks the owner's balance and the
//! session with `SELECT ... FOR UPDATE`, so unrelated owners and tokens
//! proceed in parallel.

mod ledger_store;
mod session_store;

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};

use super::credit;
use super::schema::{decode, decode_ts, encode_ts, Balances, LedgerEntries, POSTGRES_SCHEMA};
use crate::error::Result;
use crate::identity::OwnerId;
use crate::ledger::{EarnReceipt, LedgerEntry, NewEarn};

/// PostgreSQL implementation of [`LedgerStore`](super::LedgerStore) and
/// [`SessionStore`](super::SessionStore).
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await?;
        Ok(Self::new(pool))
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(POSTGRES_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Lock the owner's balance row, creating it at zero if missing.
async fn lock_balance(conn: &mut PgConnection, owner: &OwnerId, now: &str) -> Result<i64> {
    let query = Query::insert()
        .into_table(Balances::Table)
        .columns([Balances::Owner, Balances::Points, Balances::UpdatedAt])
        .values_panic([owner.as_str().into(), 0i64.into(), now.into()])
        .on_conflict(OnConflict::column(Balances::Owner).do_nothing().to_owned())
        .to_string(PostgresQueryBuilder);
    sqlx::query(&query).execute(&mut *conn).await?;

    let query = Query::select()
        .column(Balances::Points)
        .from(Balances::Table)
        .and_where(Expr::col(Balances::Owner).eq(owner.as_str()))
        .lock_exclusive()
        .to_string(PostgresQueryBuilder);
    let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
    Ok(row.try_get("points")?)
}

async fn store_balance(conn: &mut PgConnection, owner: &OwnerId, points: i64, now: &str) -> Result<()> {
    let query = Query::update()
        .table(Balances::Table)
        .values([
            (Balances::Points, points.into()),
            (Balances::UpdatedAt, now.into()),
        ])
        .and_where(Expr::col(Balances::Owner).eq(owner.as_str()))
        .to_string(PostgresQueryBuilder);
    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

async fn insert_entry(conn: &mut PgConnection, entry: &LedgerEntry) -> Result<i64> {
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
        .returning_col(LedgerEntries::Id)
        .to_string(PostgresQueryBuilder);
    let row = sqlx::query(&query).fetch_one(&mut *conn).await?;
    Ok(row.try_get("id")?)
}

async fn apply_earn(conn: &mut PgConnection, earn: NewEarn) -> Result<EarnReceipt> {
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

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
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

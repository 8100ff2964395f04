//! SQLite LedgerStore implementation.

use async_trait::async_trait;
use sea_query::{Alias, Expr, Func, Order, Query, SimpleExpr, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection};

use super::{
    apply_earn, begin, entry_columns, entry_from_row, finish, insert_entry, lock_balance,
    store_balance, SqliteStore,
};
use crate::error::{Result, RewardsError};
use crate::identity::OwnerId;
use crate::ledger::{
    DepositStats, EarnReceipt, EntryKind, LedgerEntry, MaterialStats, NewEarn, NewSpend, Page,
    Redemption, SpendReceipt,
};
use crate::storage::schema::{decode_ts, encode_ts, Balances, LedgerEntries, Redemptions};
use crate::storage::LedgerStore;

impl SqliteStore {
    async fn spend_in_tx(conn: &mut SqliteConnection, spend: &NewSpend) -> Result<SpendReceipt> {
        let now = encode_ts(&spend.at);
        let balance = lock_balance(conn, &spend.owner, &now).await?;
        if spend.points > balance {
            return Err(RewardsError::InsufficientBalance {
                requested: spend.points,
                available: balance,
            });
        }

        let entry_id = insert_entry(conn, &spend.to_entry(0)).await?;
        let redemption = spend.to_redemption(0, entry_id);
        let query = Query::insert()
            .into_table(Redemptions::Table)
            .columns([
                Redemptions::Owner,
                Redemptions::EntryId,
                Redemptions::PointsUsed,
                Redemptions::CashAmount,
                Redemptions::Method,
                Redemptions::AccountInfo,
                Redemptions::Status,
                Redemptions::CreatedAt,
            ])
            .values_panic([
                redemption.owner.as_str().into(),
                entry_id.into(),
                redemption.points_used.into(),
                redemption.cash_amount.into(),
                redemption.method.as_str().into(),
                redemption.account_info.as_str().into(),
                redemption.status.as_str().into(),
                now.as_str().into(),
            ])
            .to_string(SqliteQueryBuilder);
        let redemption_id = sqlx::query(&query)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

        let new_balance = balance - spend.points;
        store_balance(conn, &spend.owner, new_balance, &now).await?;

        Ok(SpendReceipt {
            entry_id,
            redemption_id,
            cash_amount: spend.cash_amount,
            new_balance,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append_earn(&self, earn: NewEarn) -> Result<EarnReceipt> {
        let mut tx = begin(&self.pool).await?;
        let result = apply_earn(&mut tx, earn).await;
        finish(tx, result).await
    }

    async fn append_spend(&self, spend: NewSpend) -> Result<SpendReceipt> {
        let mut tx = begin(&self.pool).await?;
        let result = Self::spend_in_tx(&mut tx, &spend).await;
        finish(tx, result).await
    }

    async fn balance(&self, owner: &OwnerId) -> Result<i64> {
        let query = Query::select()
            .column(Balances::Points)
            .from(Balances::Table)
            .and_where(Expr::col(Balances::Owner).eq(owner.as_str()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(row.try_get("points")?),
            None => Ok(0),
        }
    }

    async fn ledger_sum(&self, owner: &OwnerId) -> Result<i64> {
        let total: SimpleExpr =
            Func::coalesce([Expr::col(LedgerEntries::Delta).sum(), Expr::val(0).into()]).into();
        let query = Query::select()
            .expr_as(total.cast_as(Alias::new("BIGINT")), Alias::new("total"))
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::Owner).eq(owner.as_str()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.try_get("total")?)
    }

    async fn entries(&self, owner: &OwnerId, page: Page) -> Result<Vec<LedgerEntry>> {
        let query = Query::select()
            .columns(entry_columns())
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::Owner).eq(owner.as_str()))
            .order_by(LedgerEntries::CreatedAt, Order::Desc)
            .order_by(LedgerEntries::Id, Order::Desc)
            .limit(page.limit as u64)
            .offset(page.offset as u64)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn entry(&self, owner: &OwnerId, id: i64) -> Result<Option<LedgerEntry>> {
        let query = Query::select()
            .columns(entry_columns())
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::Owner).eq(owner.as_str()))
            .and_where(Expr::col(LedgerEntries::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn redemptions(&self, owner: &OwnerId, limit: u32) -> Result<Vec<Redemption>> {
        let query = Query::select()
            .columns([
                Redemptions::Id,
                Redemptions::Owner,
                Redemptions::EntryId,
                Redemptions::PointsUsed,
                Redemptions::CashAmount,
                Redemptions::Method,
                Redemptions::AccountInfo,
                Redemptions::Status,
                Redemptions::CreatedAt,
            ])
            .from(Redemptions::Table)
            .and_where(Expr::col(Redemptions::Owner).eq(owner.as_str()))
            .order_by(Redemptions::Id, Order::Desc)
            .limit(limit as u64)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let mut redemptions = Vec::with_capacity(rows.len());
        for row in rows {
            let created_at: String = row.try_get("created_at")?;
            redemptions.push(Redemption {
                id: row.try_get("id")?,
                owner: OwnerId::new(row.try_get::<String, _>("owner")?),
                entry_id: row.try_get("entry_id")?,
                points_used: row.try_get("points_used")?,
                cash_amount: row.try_get("cash_amount")?,
                method: row.try_get("method")?,
                account_info: row.try_get("account_info")?,
                status: row.try_get("status")?,
                created_at: decode_ts(&created_at)?,
            });
        }
        Ok(redemptions)
    }

    async fn deposit_stats(&self, owner: &OwnerId) -> Result<DepositStats> {
        let points: SimpleExpr =
            Func::coalesce([Expr::col(LedgerEntries::Delta).sum(), Expr::val(0).into()]).into();
        let query = Query::select()
            .column(LedgerEntries::Material)
            .expr_as(Expr::col(LedgerEntries::Id).count(), Alias::new("deposits"))
            .expr_as(
                Func::coalesce([Expr::col(LedgerEntries::WeightKg).sum(), Expr::val(0.0).into()]),
                Alias::new("weight_kg"),
            )
            .expr_as(points.cast_as(Alias::new("BIGINT")), Alias::new("points"))
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::Owner).eq(owner.as_str()))
            .and_where(Expr::col(LedgerEntries::Kind).eq(EntryKind::Deposit.as_str()))
            .group_by_col(LedgerEntries::Material)
            .order_by(LedgerEntries::Material, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let mut by_material = Vec::with_capacity(rows.len());
        for row in rows {
            by_material.push(MaterialStats {
                material: row.try_get::<Option<String>, _>("material")?.unwrap_or_default(),
                deposits: row.try_get("deposits")?,
                weight_kg: row.try_get("weight_kg")?,
                points: row.try_get("points")?,
            });
        }
        Ok(DepositStats::from_materials(by_material))
    }
}

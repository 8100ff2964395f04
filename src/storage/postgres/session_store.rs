//! PostgreSQL SessionStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};

use super::{apply_earn, PostgresStore};
use crate::error::{Result, RewardsError};
use crate::identity::OwnerId;
use crate::ledger::{EarnReceipt, NewEarn};
use crate::pairing::{PairingSession, SessionStatus, Transition};
use crate::storage::schema::{decode, decode_ts, encode_ts, PairingSessions};
use crate::storage::SessionStore;

fn session_columns() -> [PairingSessions; 8] {
    [
        PairingSessions::Token,
        PairingSessions::StationId,
        PairingSessions::BoundUser,
        PairingSessions::Credential,
        PairingSessions::Status,
        PairingSessions::CreatedAt,
        PairingSessions::ExpiresAt,
        PairingSessions::EndedAt,
    ]
}

fn session_from_row(row: &PgRow) -> Result<PairingSession> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let expires_at: String = row.try_get("expires_at")?;
    let ended_at: Option<String> = row.try_get("ended_at")?;
    Ok(PairingSession {
        token: row.try_get("token")?,
        station_id: row.try_get("station_id")?,
        bound_user: row.try_get::<Option<String>, _>("bound_user")?.map(OwnerId::new),
        credential: row.try_get("credential")?,
        status: decode(&status)?,
        created_at: decode_ts(&created_at)?,
        expires_at: decode_ts(&expires_at)?,
        ended_at: ended_at.as_deref().map(decode_ts).transpose()?,
    })
}

async fn lock_session(conn: &mut PgConnection, token: &str) -> Result<PairingSession> {
    let query = Query::select()
        .columns(session_columns())
        .from(PairingSessions::Table)
        .and_where(Expr::col(PairingSessions::Token).eq(token))
        .lock_exclusive()
        .to_string(PostgresQueryBuilder);

    let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => session_from_row(&row),
        None => Err(RewardsError::not_found("pairing session")),
    }
}

async fn save(conn: &mut PgConnection, session: &PairingSession) -> Result<()> {
    let query = Query::update()
        .table(PairingSessions::Table)
        .values([
            (PairingSessions::StationId, session.station_id.as_str().into()),
            (
                PairingSessions::BoundUser,
                session.bound_user.as_ref().map(|u| u.to_string()).into(),
            ),
            (PairingSessions::Credential, session.credential.clone().into()),
            (PairingSessions::Status, session.status.as_str().into()),
            (
                PairingSessions::EndedAt,
                session.ended_at.as_ref().map(encode_ts).into(),
            ),
        ])
        .and_where(Expr::col(PairingSessions::Token).eq(session.token.as_str()))
        .to_string(PostgresQueryBuilder);
    sqlx::query(&query).execute(&mut *conn).await?;
    Ok(())
}

impl PostgresStore {
    async fn transition_in_tx(
        conn: &mut PgConnection,
        token: &str,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<Result<PairingSession>> {
        let current = lock_session(conn, token).await?;
        let mut next = current.clone();
        let outcome = next.apply(transition, now);
        if next != current {
            save(conn, &next).await?;
        }
        Ok(outcome.map(|_| next))
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn insert(&self, session: &PairingSession) -> Result<()> {
        let query = Query::insert()
            .into_table(PairingSessions::Table)
            .columns(session_columns())
            .values_panic([
                session.token.as_str().into(),
                session.station_id.as_str().into(),
                session.bound_user.as_ref().map(|u| u.to_string()).into(),
                session.credential.clone().into(),
                session.status.as_str().into(),
                encode_ts(&session.created_at).into(),
                encode_ts(&session.expires_at).into(),
                session.ended_at.as_ref().map(encode_ts).into(),
            ])
            .to_string(PostgresQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<PairingSession>> {
        let query = Query::select()
            .columns(session_columns())
            .from(PairingSessions::Table)
            .and_where(Expr::col(PairingSessions::Token).eq(token))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn transition(
        &self,
        token: &str,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<PairingSession> {
        let mut tx = self.pool.begin().await?;
        let outcome = Self::transition_in_tx(&mut tx, token, &transition, now).await?;
        tx.commit().await?;
        outcome
    }

    async fn record_deposit(
        &self,
        token: &str,
        earn: NewEarn,
        now: DateTime<Utc>,
    ) -> Result<(EarnReceipt, PairingSession)> {
        let mut tx = self.pool.begin().await?;
        let deposit = Transition::Deposit {
            caller: earn.owner.clone(),
        };
        let session = match Self::transition_in_tx(&mut tx, token, &deposit, now).await? {
            Ok(session) => session,
            Err(e) => {
                // Keep any lazy expiry that was applied.
                tx.commit().await?;
                return Err(e);
            }
        };
        let receipt = apply_earn(&mut tx, earn).await?;
        tx.commit().await?;
        Ok((receipt, session))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = Query::update()
            .table(PairingSessions::Table)
            .values([
                (PairingSessions::Status, SessionStatus::Expired.as_str().into()),
                (PairingSessions::BoundUser, Option::<String>::None.into()),
                (PairingSessions::Credential, Option::<String>::None.into()),
            ])
            .and_where(Expr::col(PairingSessions::Status).is_in([
                SessionStatus::Pending.as_str(),
                SessionStatus::Connected.as_str(),
                SessionStatus::Active.as_str(),
            ]))
            .and_where(Expr::col(PairingSessions::ExpiresAt).lt(encode_ts(&now)))
            .to_string(PostgresQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

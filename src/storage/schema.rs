//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building,
//! plus the idempotent DDL each SQL backend applies at start-up.

use chrono::{DateTime, SecondsFormat, Utc};
use sea_query::Iden;

use super::StorageError;

/// Append-only ledger entries.
#[derive(Iden)]
pub enum LedgerEntries {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "owner"]
    Owner,
    #[iden = "delta"]
    Delta,
    #[iden = "kind"]
    Kind,
    #[iden = "material"]
    Material,
    #[iden = "weight_kg"]
    WeightKg,
    #[iden = "cash_amount"]
    CashAmount,
    #[iden = "session_token"]
    SessionToken,
    #[iden = "created_at"]
    CreatedAt,
}

/// Cached balance projection, one row per owner.
#[derive(Iden)]
pub enum Balances {
    Table,
    #[iden = "owner"]
    Owner,
    #[iden = "points"]
    Points,
    #[iden = "updated_at"]
    UpdatedAt,
}

#[derive(Iden)]
pub enum Redemptions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "owner"]
    Owner,
    #[iden = "entry_id"]
    EntryId,
    #[iden = "points_used"]
    PointsUsed,
    #[iden = "cash_amount"]
    CashAmount,
    #[iden = "method"]
    Method,
    #[iden = "account_info"]
    AccountInfo,
    #[iden = "status"]
    Status,
    #[iden = "created_at"]
    CreatedAt,
}

#[derive(Iden)]
pub enum PairingSessions {
    Table,
    #[iden = "token"]
    Token,
    #[iden = "station_id"]
    StationId,
    #[iden = "bound_user"]
    BoundUser,
    #[iden = "credential"]
    Credential,
    #[iden = "status"]
    Status,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "expires_at"]
    ExpiresAt,
    #[iden = "ended_at"]
    EndedAt,
}

/// SQLite DDL.
#[cfg(feature = "sqlite")]
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    delta INTEGER NOT NULL,
    kind TEXT NOT NULL,
    material TEXT,
    weight_kg REAL,
    cash_amount REAL,
    session_token TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_entries_owner ON ledger_entries(owner, id);
CREATE INDEX IF NOT EXISTS idx_ledger_entries_session ON ledger_entries(session_token);

CREATE TABLE IF NOT EXISTS balances (
    owner TEXT PRIMARY KEY,
    points INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS redemptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    entry_id INTEGER NOT NULL REFERENCES ledger_entries(id),
    points_used INTEGER NOT NULL,
    cash_amount REAL NOT NULL,
    method TEXT NOT NULL,
    account_info TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_redemptions_owner ON redemptions(owner, id);

CREATE TABLE IF NOT EXISTS pairing_sessions (
    token TEXT PRIMARY KEY,
    station_id TEXT NOT NULL,
    bound_user TEXT,
    credential TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_pairing_sessions_status ON pairing_sessions(status, expires_at);
CREATE INDEX IF NOT EXISTS idx_pairing_sessions_user ON pairing_sessions(bound_user);
"#;

/// PostgreSQL DDL.
#[cfg(feature = "postgres")]
pub const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    id BIGSERIAL PRIMARY KEY,
    owner TEXT NOT NULL,
    delta BIGINT NOT NULL,
    kind TEXT NOT NULL,
    material TEXT,
    weight_kg DOUBLE PRECISION,
    cash_amount DOUBLE PRECISION,
    session_token TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_entries_owner ON ledger_entries(owner, id);
CREATE INDEX IF NOT EXISTS idx_ledger_entries_session ON ledger_entries(session_token);

CREATE TABLE IF NOT EXISTS balances (
    owner TEXT PRIMARY KEY,
    points BIGINT NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS redemptions (
    id BIGSERIAL PRIMARY KEY,
    owner TEXT NOT NULL,
    entry_id BIGINT NOT NULL REFERENCES ledger_entries(id),
    points_used BIGINT NOT NULL,
    cash_amount DOUBLE PRECISION NOT NULL,
    method TEXT NOT NULL,
    account_info TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_redemptions_owner ON redemptions(owner, id);

CREATE TABLE IF NOT EXISTS pairing_sessions (
    token TEXT PRIMARY KEY,
    station_id TEXT NOT NULL,
    bound_user TEXT,
    credential TEXT,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_pairing_sessions_status ON pairing_sessions(status, expires_at);
CREATE INDEX IF NOT EXISTS idx_pairing_sessions_user ON pairing_sessions(bound_user);
"#;

// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
// comparison matches time order on both backends.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp {raw:?}: {e}")))
}

pub(crate) fn decode<T>(raw: &str) -> Result<T, StorageError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse().map_err(StorageError::Corrupt)
}

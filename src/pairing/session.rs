//! Pairing session state machine.
//!
//! ```text
//! pending ──bind──▶ connected ──deposit──▶ active
//!    │                  │                    │
//!    └───────end────────┴────────end─────────┴──▶ ended
//!    └──────────────deadline passed──────────────▶ expired
//! ```
//!
//! Transitions are pure; storage backends load a session under their
//! transactional lock, call [`PairingSession::apply`], and persist the result.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{Result, RewardsError};
use crate::identity::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Connected,
    Active,
    Ended,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Connected => "connected",
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Expired)
    }

    /// Statuses that carry a bound user.
    pub fn is_bound(&self) -> bool {
        matches!(self, SessionStatus::Connected | SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SessionStatus::Pending),
            "connected" => Ok(SessionStatus::Connected),
            "active" => Ok(SessionStatus::Active),
            "ended" => Ok(SessionStatus::Ended),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// A state change requested against a stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Only apply lazy expiry.
    Refresh,
    Bind { user: OwnerId, credential: String },
    /// Authorize a deposit by `caller` and escalate to active.
    Deposit { caller: OwnerId },
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairingSession {
    pub token: String,
    pub station_id: String,
    pub bound_user: Option<OwnerId>,
    pub credential: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PairingSession {
    pub fn new(token: String, station_id: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            token,
            station_id,
            bound_user: None,
            credential: None,
            status: SessionStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            ended_at: None,
        }
    }

    /// Mark the session expired if its deadline has passed.
    ///
    /// Returns true when the status changed.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || now <= self.expires_at {
            return false;
        }
        self.status = SessionStatus::Expired;
        self.release();
        true
    }

    /// Apply `transition` at `now`.
    ///
    /// Lazy expiry is applied first and stays applied even when the
    /// transition itself is rejected, so callers must persist any change.
    pub fn apply(&mut self, transition: &Transition, now: DateTime<Utc>) -> Result<()> {
        self.refresh(now);
        match transition {
            Transition::Refresh => Ok(()),
            Transition::Bind { user, credential } => self.bind(user, credential),
            Transition::Deposit { caller } => {
                self.authorize_deposit(caller)?;
                self.status = SessionStatus::Active;
                Ok(())
            }
            Transition::End => self.end(now),
        }
    }

    /// Check that `caller` may deposit, without changing anything.
    pub fn authorize_deposit(&self, caller: &OwnerId) -> Result<()> {
        match self.status {
            SessionStatus::Expired => Err(RewardsError::Expired),
            SessionStatus::Ended => Err(RewardsError::SessionClosed(SessionStatus::Ended)),
            SessionStatus::Pending => Err(RewardsError::Forbidden),
            SessionStatus::Connected | SessionStatus::Active => {
                if self.bound_user.as_ref() == Some(caller) {
                    Ok(())
                } else {
                    Err(RewardsError::Forbidden)
                }
            }
        }
    }

    fn bind(&mut self, user: &OwnerId, credential: &str) -> Result<()> {
        match self.status {
            SessionStatus::Expired => Err(RewardsError::Expired),
            SessionStatus::Ended => Err(RewardsError::SessionClosed(SessionStatus::Ended)),
            SessionStatus::Connected | SessionStatus::Active => Err(RewardsError::AlreadyBound),
            SessionStatus::Pending if self.bound_user.is_some() => Err(RewardsError::AlreadyBound),
            SessionStatus::Pending => {
                self.bound_user = Some(user.clone());
                self.credential = Some(credential.to_string());
                self.status = SessionStatus::Connected;
                Ok(())
            }
        }
    }

    fn end(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(RewardsError::not_found(format!(
                "open pairing session (session is {})",
                self.status
            )));
        }
        self.status = SessionStatus::Ended;
        self.ended_at = Some(now);
        self.release();
        Ok(())
    }

    // Terminal sessions keep no binding.
    fn release(&mut self) {
        self.bound_user = None;
        self.credential = None;
    }
}

//! Pairing operations over a [`SessionStore`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::{PairingSession, SessionStatus, Transition};
use crate::clock::Clock;
use crate::error::{Result, RewardsError};
use crate::identity::{Identity, OwnerId};
use crate::storage::{LedgerStore, SessionStore};

/// Station id used when the station does not name itself.
pub const DEFAULT_STATION: &str = "default";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub default_station: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(5),
            default_station: DEFAULT_STATION.to_string(),
        }
    }
}

/// What a station needs to render its QR code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingTicket {
    #[serde(rename = "sessionToken")]
    pub token: String,
    pub station_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of polling a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(rename = "sessionToken")]
    pub token: String,
    pub status: SessionStatus,
    pub station_id: String,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub bound_user: Option<OwnerId>,
    #[serde(rename = "userBalance", skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(rename = "authToken", skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub struct PairingService {
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<dyn LedgerStore>,
    identity: Arc<dyn Identity>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl PairingService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        ledger: Arc<dyn LedgerStore>,
        identity: Arc<dyn Identity>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions,
            ledger,
            identity,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Open a pending session with a fresh random token.
    pub async fn create(&self, station_id: Option<&str>) -> Result<PairingTicket> {
        let station_id = station_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.settings.default_station)
            .to_string();

        let session = PairingSession::new(
            Uuid::new_v4().to_string(),
            station_id,
            self.clock.now(),
            self.settings.ttl,
        );
        self.sessions.insert(&session).await?;

        info!(
            token = %session.token,
            station = %session.station_id,
            expires_at = %session.expires_at,
            "pairing session created"
        );
        Ok(PairingTicket {
            token: session.token,
            station_id: session.station_id,
            expires_at: session.expires_at,
        })
    }

    /// Report a session's state, expiring it first if its deadline passed.
    pub async fn check(&self, token: &str) -> Result<SessionView> {
        let token = require_token(token)?;
        let session = self
            .sessions
            .transition(token, Transition::Refresh, self.clock.now())
            .await?;

        let balance = match &session.bound_user {
            Some(user) => Some(self.ledger.balance(user).await?),
            None => None,
        };
        Ok(SessionView {
            token: session.token,
            status: session.status,
            station_id: session.station_id,
            bound_user: session.bound_user,
            balance,
            credential: session.credential,
            expires_at: session.expires_at,
        })
    }

    /// Bind the user behind `credential` to a pending session.
    pub async fn bind(&self, token: &str, credential: &str) -> Result<PairingSession> {
        let token = require_token(token)?;
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(RewardsError::invalid_input("credential is required"));
        }
        let user = self.identity.resolve_credential(credential)?;

        let result = self
            .sessions
            .transition(
                token,
                Transition::Bind {
                    user: user.clone(),
                    credential: credential.to_string(),
                },
                self.clock.now(),
            )
            .await;

        match &result {
            Ok(session) => info!(token, user = %user, station = %session.station_id, "pairing session bound"),
            Err(e) => debug!(token, user = %user, error = %e, "bind rejected"),
        }
        result
    }

    pub async fn end(&self, token: &str) -> Result<PairingSession> {
        let token = require_token(token)?;
        let session = self
            .sessions
            .transition(token, Transition::End, self.clock.now())
            .await?;
        info!(token, "pairing session ended");
        Ok(session)
    }

    /// Mark every overdue open session expired.
    pub async fn expire_overdue(&self) -> Result<u64> {
        self.sessions.expire_overdue(self.clock.now()).await
    }
}

fn require_token(token: &str) -> Result<&str> {
    let token = token.trim();
    if token.is_empty() {
        return Err(RewardsError::invalid_input("session token is required"));
    }
    Ok(token)
}

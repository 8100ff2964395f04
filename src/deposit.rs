//! Deposits made through a pairing session.
//!
//! A deposit is accepted only while the session is bound to the caller. The
//! ledger entry, the balance update and the session's escalation to `active`
//! commit together inside [`SessionStore::record_deposit`]; the checks made
//! here before that call exist to report the most specific error cheaply and
//! are repeated under lock.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Result, RewardsError};
use crate::identity::OwnerId;
use crate::ledger::{log_earned, Ledger};
use crate::pairing::{SessionStatus, Transition};
use crate::storage::SessionStore;

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub token: String,
    pub caller: OwnerId,
    pub material: String,
    pub weight_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositReceipt {
    pub entry_id: i64,
    pub points_awarded: i64,
    pub new_balance: i64,
    pub material: String,
    pub weight_kg: f64,
    pub session_status: SessionStatus,
}

pub struct SessionedDeposit {
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
}

impl SessionedDeposit {
    pub fn new(sessions: Arc<dyn SessionStore>, ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions,
            ledger,
            clock,
        }
    }

    pub async fn record(&self, request: DepositRequest) -> Result<DepositReceipt> {
        validate(&request)?;
        let token = request.token.trim();

        let session = self
            .sessions
            .transition(token, Transition::Refresh, self.clock.now())
            .await?;
        if let Err(e) = session.authorize_deposit(&request.caller) {
            debug!(token, caller = %request.caller, error = %e, "deposit rejected");
            return Err(e);
        }

        let mut earn = self
            .ledger
            .quote_earn(&request.caller, &request.material, request.weight_kg)?;
        earn.session_token = Some(token.to_string());
        let (receipt, session) = self
            .sessions
            .record_deposit(token, earn.clone(), self.clock.now())
            .await?;

        log_earned(&earn, &receipt);
        debug!(
            token,
            station = %session.station_id,
            status = %session.status,
            "session deposit recorded"
        );
        Ok(DepositReceipt {
            entry_id: receipt.entry_id,
            points_awarded: receipt.points_awarded,
            new_balance: receipt.new_balance,
            material: earn.material,
            weight_kg: earn.weight_kg,
            session_status: session.status,
        })
    }
}

fn validate(request: &DepositRequest) -> Result<()> {
    if request.token.trim().is_empty() {
        return Err(RewardsError::invalid_input("session token is required"));
    }
    if request.material.trim().is_empty() {
        return Err(RewardsError::invalid_input("material is required"));
    }
    if !request.weight_kg.is_finite() || request.weight_kg <= 0.0 {
        return Err(RewardsError::invalid_input(format!(
            "weight must be a positive number of kilograms, got {}",
            request.weight_kg
        )));
    }
    Ok(())
}

//! Account endpoints: balance, history, manual deposits and redemptions.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::auth::AuthUser;
use super::error::{ApiResult, Envelope};
use super::AppState;
use crate::identity::OwnerId;
use crate::ledger::{
    DepositStats, EarnReceipt, LedgerEntry, Page, Redemption, RedemptionOptions, SpendReceipt,
};
use crate::utils::retry::retry_read;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct EarnBody {
    #[serde(alias = "item_type")]
    pub material: String,
    #[serde(alias = "weight_kg")]
    pub weight: f64,
}

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    pub points: i64,
    pub method: String,
    #[serde(default)]
    pub account_info: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub user_id: OwnerId,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct StationConfig {
    pub material_rates: BTreeMap<String, f64>,
    pub supported_materials: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub user_id: OwnerId,
    pub balance: i64,
    #[serde(flatten)]
    pub deposits: DepositStats,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Vec<LedgerEntry>> {
    let Query(query) = query?;
    let entries = state
        .ledger
        .history(&owner, Page::new(query.limit, query.offset))
        .await?;
    Ok(Envelope::ok(entries))
}

pub async fn entry(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<LedgerEntry> {
    let Path(id) = id?;
    Ok(Envelope::ok(state.ledger.entry(&owner, id).await?))
}

pub async fn earn(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    body: Result<Json<EarnBody>, JsonRejection>,
) -> ApiResult<EarnReceipt> {
    let Json(body) = body?;
    let receipt = state.ledger.earn(&owner, &body.material, body.weight).await?;
    Ok(Envelope::ok(receipt).with_message("Deposit recorded"))
}

pub async fn balance(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> ApiResult<BalanceView> {
    let balance = retry_read("balance_of", || state.ledger.balance_of(&owner)).await?;
    Ok(Envelope::ok(BalanceView {
        user_id: owner,
        balance,
    }))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> ApiResult<UserStats> {
    let balance = retry_read("balance_of", || state.ledger.balance_of(&owner)).await?;
    let deposits = state.ledger.deposit_stats(&owner).await?;
    Ok(Envelope::ok(UserStats {
        user_id: owner,
        balance,
        deposits,
    }))
}

pub async fn redemption_options(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
) -> ApiResult<RedemptionOptions> {
    Ok(Envelope::ok(state.ledger.redemption_options(&owner).await?))
}

pub async fn redeem(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    body: Result<Json<RedeemBody>, JsonRejection>,
) -> ApiResult<SpendReceipt> {
    let Json(body) = body?;
    let receipt = state
        .ledger
        .spend(&owner, body.points, &body.method, &body.account_info)
        .await?;
    Ok(Envelope::ok(receipt).with_message("Redemption request submitted"))
}

pub async fn redemption_history(
    State(state): State<Arc<AppState>>,
    AuthUser(owner): AuthUser,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Vec<Redemption>> {
    let Query(query) = query?;
    let history = state.ledger.redemption_history(&owner, query.limit).await?;
    Ok(Envelope::ok(history))
}

/// Rates the station should display, straight from the rate table.
pub async fn station_config(
    State(state): State<Arc<AppState>>,
    AuthUser(_): AuthUser,
) -> ApiResult<StationConfig> {
    let rates = state.ledger.rates();
    Ok(Envelope::ok(StationConfig {
        material_rates: rates
            .materials()
            .map(|(material, rate)| (material.to_string(), rate))
            .collect(),
        supported_materials: rates.materials().map(|(m, _)| m.to_string()).collect(),
    }))
}

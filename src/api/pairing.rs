//! Station pairing endpoints.
//!
//! Request bodies use the camelCase names the station and mobile clients send.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::auth::AuthUser;
use super::error::{ApiResult, Envelope};
use super::qr::png_data_uri;
use super::AppState;
use crate::deposit::{DepositReceipt, DepositRequest};
use crate::identity::OwnerId;
use crate::pairing::{PairingTicket, SessionStatus, SessionView};
use crate::utils::retry::retry_read;

#[derive(Debug, Default, Deserialize)]
pub struct RequestSessionBody {
    #[serde(default, alias = "stationId")]
    pub station_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenBody {
    pub session_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectSessionBody {
    pub session_token: String,
    pub auth_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDepositBody {
    pub session_token: String,
    pub material: String,
    #[serde(alias = "weightKg")]
    pub weight: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    #[serde(flatten)]
    pub ticket: PairingTicket,
    /// Text encoded in the station's QR code.
    pub qr_payload: String,
    /// `data:image/png;base64,...` rendering of `qr_payload`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionChanged {
    pub session_token: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<OwnerId>,
}

pub async fn request_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RequestSessionBody>>,
) -> ApiResult<SessionCreated> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let ticket = state.pairing.create(body.station_id.as_deref()).await?;
    // The token alone is enough to pair, so a rendering failure is not fatal.
    let qr_code = match png_data_uri(&ticket.token) {
        Ok(uri) => Some(uri),
        Err(e) => {
            warn!(token = %ticket.token, error = %e, "qr rendering failed");
            None
        }
    };
    Ok(Envelope::ok(SessionCreated {
        qr_payload: ticket.token.clone(),
        qr_code,
        ticket,
        status: SessionStatus::Pending,
    })
    .with_message("Session token generated"))
}

pub async fn check_session(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SessionTokenBody>, JsonRejection>,
) -> ApiResult<SessionView> {
    let Json(body) = body?;
    let view = retry_read("check_session", || state.pairing.check(&body.session_token)).await?;
    Ok(Envelope::ok(view))
}

pub async fn connect_session(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ConnectSessionBody>, JsonRejection>,
) -> ApiResult<SessionChanged> {
    let Json(body) = body?;
    let session = state
        .pairing
        .bind(&body.session_token, &body.auth_token)
        .await?;
    Ok(Envelope::ok(SessionChanged {
        session_token: session.token,
        status: session.status,
        user_id: session.bound_user,
    })
    .with_message("Session connected"))
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SessionTokenBody>, JsonRejection>,
) -> ApiResult<SessionChanged> {
    let Json(body) = body?;
    let session = state.pairing.end(&body.session_token).await?;
    Ok(Envelope::ok(SessionChanged {
        session_token: session.token,
        status: session.status,
        user_id: None,
    })
    .with_message("Session ended"))
}

pub async fn session_deposit(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    body: Result<Json<SessionDepositBody>, JsonRejection>,
) -> ApiResult<DepositReceipt> {
    let Json(body) = body?;
    let receipt = state
        .deposits
        .record(DepositRequest {
            token: body.session_token,
            caller,
            material: body.material,
            weight_kg: body.weight,
        })
        .await?;
    Ok(Envelope::ok(receipt).with_message("Deposit recorded"))
}

//! REST API.
//!
//! Endpoints:
//! - `GET  /api/health`
//! - `POST /api/request-session`, `/api/check-session`, `/api/connect-session`,
//!   `/api/end-session` - station pairing
//! - `POST /api/deposit` - deposit through a bound session
//! - `GET|POST /api/transactions`, `GET /api/transactions/:id`,
//!   `POST /api/station/deposit` - ledger history and manual deposits
//! - `GET /api/station/config` - material rates for station displays
//! - `GET /api/points/balance`, `GET /api/user/stats`
//! - `GET /api/redemption/options`, `POST /api/redemption/redeem`,
//!   `GET /api/redemption/history`
//!
//! Every response is an [`Envelope`]; failures carry `{kind, message}`.

mod auth;
mod error;
mod ledger;
mod pairing;
mod qr;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use auth::AuthUser;
pub use error::{status_for, ApiError, ApiResult, Envelope, ErrorBody};

use crate::clock::Clock;
use crate::config::Config;
use crate::deposit::SessionedDeposit;
use crate::identity::Identity;
use crate::ledger::Ledger;
use crate::pairing::PairingService;
use crate::storage::Storage;

/// Services shared by every handler.
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub pairing: Arc<PairingService>,
    pub deposits: Arc<SessionedDeposit>,
    pub identity: Arc<dyn Identity>,
}

impl AppState {
    /// Wire the services over `storage` using the rates, catalog and session
    /// settings from `config`.
    pub fn new(
        storage: &Storage,
        config: &Config,
        identity: Arc<dyn Identity>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(
            storage.ledger.clone(),
            config.rewards.rate_table(),
            config.rewards.catalog(),
            clock.clone(),
        ));
        let pairing = PairingService::new(
            storage.sessions.clone(),
            storage.ledger.clone(),
            identity.clone(),
            clock.clone(),
            config.session.settings(),
        );
        let deposits = SessionedDeposit::new(storage.sessions.clone(), ledger.clone(), clock);

        Self {
            ledger,
            pairing: Arc::new(pairing),
            deposits: Arc::new(deposits),
            identity,
        }
    }
}

/// Build the axum router (separated for testing).
pub fn router(state: Arc<AppState>, cors_max_age: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(cors_max_age);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/request-session", post(pairing::request_session))
        .route("/api/check-session", post(pairing::check_session))
        .route("/api/connect-session", post(pairing::connect_session))
        .route("/api/end-session", post(pairing::end_session))
        .route("/api/deposit", post(pairing::session_deposit))
        .route("/api/transactions", get(ledger::history).post(ledger::earn))
        .route("/api/transactions/:id", get(ledger::entry))
        .route("/api/station/deposit", post(ledger::earn))
        .route("/api/station/config", get(ledger::station_config))
        .route("/api/points/balance", get(ledger::balance))
        .route("/api/user/stats", get(ledger::stats))
        .route("/api/redemption/options", get(ledger::redemption_options))
        .route("/api/redemption/redeem", post(ledger::redeem))
        .route("/api/redemption/history", get(ledger::redemption_history))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve<F>(
    state: Arc<AppState>,
    addr: &str,
    cors_max_age: Duration,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state, cors_max_age);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "ok" })),
    )
}

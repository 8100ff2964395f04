//! ecopoints-server: recycling rewards REST API
//!
//! Serves station pairing, session deposits, balances and redemptions over
//! HTTP, backed by the configured storage.
//!
//! ## Configuration
//! ```yaml
//! server:
//!   port: 8080
//! storage:
//!   type: sqlite
//!   sqlite:
//!     path: ./data/ecopoints.db
//! auth:
//!   jwt_secret: change-me
//! session:
//!   ttl_secs: 300
//! ```
//!
//! Any key can be overridden with `ECOPOINTS__<SECTION>__<KEY>` environment
//! variables, e.g. `ECOPOINTS__AUTH__JWT_SECRET`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use ecopoints::api::{serve, AppState};
use ecopoints::clock::SystemClock;
use ecopoints::config::Config;
use ecopoints::identity::JwtIdentity;
use ecopoints::pairing::SessionReaper;
use ecopoints::storage::init_storage;
use ecopoints::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(parse_config_path(std::env::args()).as_deref())?;

    let Some(secret) = config.auth.jwt_secret.as_deref() else {
        error!("auth.jwt_secret is not set");
        return Err("auth.jwt_secret must be configured".into());
    };
    let identity = Arc::new(JwtIdentity::new(
        secret,
        chrono::Duration::seconds(config.auth.token_ttl_secs.min(i32::MAX as u64) as i64),
    ));

    let storage = init_storage(&config.storage).await?;
    let state = Arc::new(AppState::new(
        &storage,
        &config,
        identity,
        Arc::new(SystemClock),
    ));

    let reaper = if config.session.reaper_interval_secs > 0 {
        Some(
            SessionReaper::new(state.pairing.clone())
                .with_interval(Duration::from_secs(config.session.reaper_interval_secs))
                .spawn(),
        )
    } else {
        info!("session reaper disabled");
        None
    };

    info!(
        storage = ?config.storage.storage_type,
        session_ttl_secs = config.session.ttl_secs,
        "ecopoints-server starting"
    );

    serve(
        state,
        &config.server.bind_addr(),
        Duration::from_secs(config.server.cors_max_age_secs),
        shutdown_signal(),
    )
    .await
    .map_err(|e| e as Box<dyn std::error::Error>)?;

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    info!("ecopoints-server stopped");
    Ok(())
}

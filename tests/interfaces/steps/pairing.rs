//! Station pairing step definitions.

use chrono::Duration;
use cucumber::{given, then, when, World};

use ecopoints::deposit::{DepositReceipt, DepositRequest};
use ecopoints::clock::Clock;
use ecopoints::pairing::{PairingTicket, SessionReaper, SessionView};
use ecopoints::{ErrorKind, OwnerId, Result};

use super::Services;
use crate::backend::StorageBackend;

/// Test context for pairing scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct PairingWorld {
    backend: StorageBackend,
    services: Option<Services>,
    ticket: Option<PairingTicket>,
    last_deposit: Option<DepositReceipt>,
    last_error: Option<ErrorKind>,
    reaped: u64,
}

impl PairingWorld {
    fn new() -> Self {
        Self {
            backend: StorageBackend::from_env(),
            services: None,
            ticket: None,
            last_deposit: None,
            last_error: None,
            reaped: 0,
        }
    }

    fn services(&self) -> &Services {
        self.services
            .as_ref()
            .expect("Services not initialized")
    }

    fn token(&self) -> String {
        self.ticket
            .as_ref()
            .expect("No session requested")
            .token
            .clone()
    }

    fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(e) => {
                self.last_error = Some(e.kind());
                None
            }
        }
    }

    async fn request_session(&mut self, station: Option<&str>) {
        let ticket = self
            .services()
            .state
            .pairing
            .create(station)
            .await
            .expect("create should succeed");
        self.ticket = Some(ticket);
    }

    async fn connect(&mut self, token: &str, credential: &str) {
        let result = self.services().state.pairing.bind(token, credential).await;
        self.record(result);
    }

    async fn session(&self) -> SessionView {
        self.services()
            .state
            .pairing
            .check(&self.token())
            .await
            .expect("check should succeed")
    }
}

// --- Background ---

#[given("a rewards backend")]
async fn given_rewards_backend(world: &mut PairingWorld) {
    world.services = Some(Services::new(world.backend).await);
}

// --- Given steps ---

#[given(expr = "station {string} has a pending session")]
async fn given_pending_session(world: &mut PairingWorld, station: String) {
    world.request_session(Some(&station)).await;
}

#[given(expr = "user {string} connects to the session")]
async fn given_user_connects(world: &mut PairingWorld, user: String) {
    let credential = world.services().credential(&user);
    let token = world.token();
    world.connect(&token, &credential).await;
    assert!(world.last_error.is_none(), "bind failed: {:?}", world.last_error);
}

// --- When steps ---

#[when(expr = "station {string} requests a session")]
async fn when_station_requests(world: &mut PairingWorld, station: String) {
    world.request_session(Some(&station)).await;
}

#[when("an unnamed station requests a session")]
async fn when_unnamed_station_requests(world: &mut PairingWorld) {
    world.request_session(None).await;
}

#[when(expr = "user {string} connects to the session")]
async fn when_user_connects(world: &mut PairingWorld, user: String) {
    let credential = world.services().credential(&user);
    let token = world.token();
    world.connect(&token, &credential).await;
}

#[when(expr = "user {string} connects to session {string}")]
async fn when_user_connects_to_token(world: &mut PairingWorld, user: String, token: String) {
    let credential = world.services().credential(&user);
    world.connect(&token, &credential).await;
}

#[when(expr = "someone connects with credential {string}")]
async fn when_forged_credential(world: &mut PairingWorld, credential: String) {
    let token = world.token();
    world.connect(&token, &credential).await;
}

#[when(expr = "user {string} deposits {float} kg of {string}")]
async fn when_user_deposits(world: &mut PairingWorld, user: String, weight: f64, material: String) {
    let result = world
        .services()
        .state
        .deposits
        .record(DepositRequest {
            token: world.token(),
            caller: OwnerId::from(user),
            material,
            weight_kg: weight,
        })
        .await;
    world.last_deposit = world.record(result);
}

#[when("the station ends the session")]
async fn when_station_ends(world: &mut PairingWorld) {
    let result = world.services().state.pairing.end(&world.token()).await;
    world.record(result);
}

#[when(expr = "{int} seconds pass")]
async fn when_time_passes(world: &mut PairingWorld, seconds: i64) {
    world.services().clock.advance(Duration::seconds(seconds));
}

#[when("the session reaper runs")]
async fn when_reaper_runs(world: &mut PairingWorld) {
    let reaper = SessionReaper::new(world.services().state.pairing.clone());
    world.reaped = reaper.run_once().await.expect("reaper should succeed");
}

// --- Then steps ---

#[then(expr = "the session status is {string}")]
async fn then_session_status(world: &mut PairingWorld, status: String) {
    let session = world.session().await;
    assert_eq!(session.status.as_str(), status);
}

#[then(expr = "the stored session status is {string}")]
async fn then_stored_session_status(world: &mut PairingWorld, status: String) {
    let stored = world
        .services()
        .context
        .storage
        .sessions
        .get(&world.token())
        .await
        .expect("get should succeed")
        .expect("session should exist");
    assert_eq!(stored.status.as_str(), status);
}

#[then(expr = "the session belongs to station {string}")]
async fn then_session_station(world: &mut PairingWorld, station: String) {
    let ticket = world.ticket.as_ref().expect("No session requested");
    assert_eq!(ticket.station_id, station);
}

#[then(expr = "the session expires in {int} seconds")]
async fn then_session_expires_in(world: &mut PairingWorld, seconds: i64) {
    let ticket = world.ticket.as_ref().expect("No session requested");
    let now = world.services().clock.now();
    assert_eq!(ticket.expires_at - now, Duration::seconds(seconds));
}

#[then(expr = "the session is bound to {string}")]
async fn then_session_bound_to(world: &mut PairingWorld, user: String) {
    let session = world.session().await;
    assert_eq!(session.bound_user, Some(OwnerId::from(user)));
}

#[then("the session is not bound")]
async fn then_session_not_bound(world: &mut PairingWorld) {
    let session = world.session().await;
    assert!(session.bound_user.is_none());
    assert!(session.credential.is_none());
}

#[then(expr = "the deposit awards {int} points")]
async fn then_deposit_awards(world: &mut PairingWorld, points: i64) {
    let receipt = world
        .last_deposit
        .as_ref()
        .unwrap_or_else(|| panic!("deposit failed: {:?}", world.last_error));
    assert_eq!(receipt.points_awarded, points);
}

#[then(expr = "user {string} has a balance of {int}")]
async fn then_user_balance(world: &mut PairingWorld, user: String, balance: i64) {
    let actual = world
        .services()
        .state
        .ledger
        .balance_of(&OwnerId::from(user))
        .await
        .expect("balance should succeed");
    assert_eq!(actual, balance);
}

#[then(expr = "the ledger of {string} agrees with the balance")]
async fn then_ledger_agrees(world: &mut PairingWorld, user: String) {
    world
        .services()
        .state
        .ledger
        .audit(&OwnerId::from(user))
        .await
        .expect("audit should pass");
}

#[then(expr = "the request fails with {string}")]
async fn then_request_fails(world: &mut PairingWorld, kind: String) {
    let actual = world.last_error.expect("expected the request to fail");
    assert_eq!(actual.as_str(), kind);
}

#[then(expr = "{int} session was reaped")]
async fn then_sessions_reaped(world: &mut PairingWorld, count: u64) {
    assert_eq!(world.reaped, count);
}

//! Points ledger step definitions.

use cucumber::{given, then, when, World};
use futures::future::join_all;

use ecopoints::ledger::{EarnReceipt, Page, SpendReceipt};
use ecopoints::{ErrorKind, OwnerId, Result};

use super::Services;
use crate::backend::StorageBackend;

/// Test context for ledger scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct LedgerWorld {
    backend: StorageBackend,
    services: Option<Services>,
    last_earn: Option<EarnReceipt>,
    last_spend: Option<SpendReceipt>,
    last_error: Option<ErrorKind>,
    succeeded: usize,
}

impl LedgerWorld {
    fn new() -> Self {
        Self {
            backend: StorageBackend::from_env(),
            services: None,
            last_earn: None,
            last_spend: None,
            last_error: None,
            succeeded: 0,
        }
    }

    fn services(&self) -> &Services {
        self.services
            .as_ref()
            .expect("Services not initialized")
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
}

// Plastic earns 10 points per kg, so any whole number of points is exact.
fn plastic_kg(points: i64) -> f64 {
    points as f64 / 10.0
}

// --- Background ---

#[given("a points ledger")]
async fn given_points_ledger(world: &mut LedgerWorld) {
    world.services = Some(Services::new(world.backend).await);
}

// --- Given steps ---

#[given(expr = "{string} has earned {int} points")]
async fn given_has_earned(world: &mut LedgerWorld, owner: String, points: i64) {
    let receipt = world
        .services()
        .state
        .ledger
        .earn(&OwnerId::from(owner), "plastic", plastic_kg(points))
        .await
        .expect("earn should succeed");
    assert_eq!(receipt.points_awarded, points);
}

// --- When steps ---

#[when(expr = "{string} earns with {float} kg of {string}")]
async fn when_earns(world: &mut LedgerWorld, owner: String, weight: f64, material: String) {
    let result = world
        .services()
        .state
        .ledger
        .earn(&OwnerId::from(owner), &material, weight)
        .await;
    world.last_earn = world.record(result);
}

#[when(expr = "{string} redeems {int} points by {string}")]
async fn when_redeems(world: &mut LedgerWorld, owner: String, points: i64, method: String) {
    let result = world
        .services()
        .state
        .ledger
        .spend(&OwnerId::from(owner), points, &method, "")
        .await;
    world.last_spend = world.record(result);
}

#[when(expr = "{string} earns {int} point {int} times concurrently")]
async fn when_concurrent_earns(world: &mut LedgerWorld, owner: String, points: i64, times: usize) {
    let owner = OwnerId::from(owner);
    let ledger = &world.services().state.ledger;
    let results = join_all((0..times).map(|_| ledger.earn(&owner, "plastic", plastic_kg(points)))).await;
    for result in results {
        result.expect("concurrent earn should succeed");
    }
}

#[when(expr = "{string} redeems {int} points {int} times concurrently")]
async fn when_concurrent_spends(world: &mut LedgerWorld, owner: String, points: i64, times: usize) {
    let owner = OwnerId::from(owner);
    let ledger = &world.services().state.ledger;
    let results = join_all((0..times).map(|_| ledger.spend(&owner, points, "cash", ""))).await;

    let mut succeeded = 0;
    for result in results {
        match result {
            Ok(_) => succeeded += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientBalance),
        }
    }
    world.succeeded = succeeded;
}

// --- Then steps ---

#[then(expr = "{string} was awarded {int} points")]
async fn then_awarded(world: &mut LedgerWorld, _owner: String, points: i64) {
    let receipt = world
        .last_earn
        .as_ref()
        .unwrap_or_else(|| panic!("earn failed: {:?}", world.last_error));
    assert_eq!(receipt.points_awarded, points);
}

#[then(expr = "the redemption pays {float}")]
async fn then_redemption_pays(world: &mut LedgerWorld, cash: f64) {
    let receipt = world
        .last_spend
        .as_ref()
        .unwrap_or_else(|| panic!("spend failed: {:?}", world.last_error));
    assert!((receipt.cash_amount - cash).abs() < 1e-9);
}

#[then(expr = "{string} has {int} points")]
async fn then_has_points(world: &mut LedgerWorld, owner: String, points: i64) {
    let balance = world
        .services()
        .state
        .ledger
        .balance_of(&OwnerId::from(owner))
        .await
        .expect("balance should succeed");
    assert_eq!(balance, points);
}

#[then(expr = "{string} has {int} pending redemption")]
async fn then_pending_redemptions(world: &mut LedgerWorld, owner: String, count: usize) {
    let redemptions = world
        .services()
        .state
        .ledger
        .redemption_history(&OwnerId::from(owner), None)
        .await
        .expect("redemption history should succeed");
    let pending = redemptions.iter().filter(|r| r.status == "pending").count();
    assert_eq!(pending, count);
}

#[then(expr = "{string} has {int} ledger entries")]
async fn then_ledger_entries(world: &mut LedgerWorld, owner: String, count: usize) {
    let entries = world
        .services()
        .state
        .ledger
        .history(&OwnerId::from(owner), Page::default())
        .await
        .expect("history should succeed");
    assert_eq!(entries.len(), count);
}

#[then(expr = "the history of {string} has deltas {string}")]
async fn then_history_deltas(world: &mut LedgerWorld, owner: String, deltas: String) {
    let expected: Vec<i64> = deltas
        .split(',')
        .map(|d| d.trim().parse().expect("delta should be an integer"))
        .collect();
    let entries = world
        .services()
        .state
        .ledger
        .history(&OwnerId::from(owner), Page::default())
        .await
        .expect("history should succeed");
    let actual: Vec<i64> = entries.iter().map(|e| e.delta).collect();
    assert_eq!(actual, expected);
}

#[then(expr = "the ledger of {string} audits clean")]
async fn then_audits_clean(world: &mut LedgerWorld, owner: String) {
    world
        .services()
        .state
        .ledger
        .audit(&OwnerId::from(owner))
        .await
        .expect("cached balance should match the ledger sum");
}

#[then(expr = "the ledger request fails with {string}")]
async fn then_ledger_request_fails(world: &mut LedgerWorld, kind: String) {
    let actual = world.last_error.expect("expected the request to fail");
    assert_eq!(actual.as_str(), kind);
}

#[then(expr = "{int} redemptions succeeded")]
async fn then_redemptions_succeeded(world: &mut LedgerWorld, count: usize) {
    assert_eq!(world.succeeded, count);
}

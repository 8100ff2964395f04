//! SessionStore interface tests.
//!
//! These tests verify the contract of the SessionStore trait, including the
//! combined session + ledger deposit transaction. Each storage
//! implementation should run these tests.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use uuid::Uuid;

use ecopoints::ledger::{NewEarn, Page};
use ecopoints::pairing::{PairingSession, SessionStatus, Transition};
use ecopoints::storage::{LedgerStore, SessionStore};
use ecopoints::{ErrorKind, OwnerId};

use super::ledger_store_tests::{make_earn, owner};

pub fn make_session(now: DateTime<Utc>) -> PairingSession {
    PairingSession::new(
        format!("test_{}", Uuid::new_v4()),
        "kiosk-1".to_string(),
        now,
        Duration::minutes(5),
    )
}

fn bind(user: &OwnerId) -> Transition {
    Transition::Bind {
        user: user.clone(),
        credential: format!("cred-{}", user),
    }
}

async fn bound_session<S: SessionStore>(store: &S, user: &OwnerId, now: DateTime<Utc>) -> String {
    let session = make_session(now);
    store.insert(&session).await.unwrap();
    store
        .transition(&session.token, bind(user), now)
        .await
        .expect("bind should succeed");
    session.token
}

fn session_earn(user: &OwnerId, token: &str, points: i64) -> NewEarn {
    let mut earn = make_earn(user, "metal", points as f64 / 15.0, points);
    earn.session_token = Some(token.to_string());
    earn
}

// =============================================================================
// Basic persistence
// =============================================================================

pub async fn test_insert_and_get<S: SessionStore>(store: &S) {
    let now = Utc::now();
    let session = make_session(now);
    store.insert(&session).await.expect("insert should succeed");

    let loaded = store
        .get(&session.token)
        .await
        .unwrap()
        .expect("session should exist");
    assert_eq!(loaded.token, session.token);
    assert_eq!(loaded.station_id, "kiosk-1");
    assert_eq!(loaded.status, SessionStatus::Pending);
    assert!(loaded.bound_user.is_none());
    assert_eq!(
        loaded.expires_at.timestamp_millis(),
        session.expires_at.timestamp_millis()
    );
}

pub async fn test_get_unknown_is_none<S: SessionStore>(store: &S) {
    assert!(store.get("test_no_such_token").await.unwrap().is_none());
}

pub async fn test_transition_unknown_is_not_found<S: SessionStore>(store: &S) {
    let err = store
        .transition("test_no_such_token", Transition::Refresh, Utc::now())
        .await
        .expect_err("unknown token should fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =============================================================================
// Transitions
// =============================================================================

pub async fn test_bind_persists_user<S: SessionStore>(store: &S) {
    let now = Utc::now();
    let user = owner("bind");
    let token = bound_session(store, &user, now).await;

    let loaded = store.get(&token).await.unwrap().unwrap();
    assert_eq!(loaded.status, SessionStatus::Connected);
    assert_eq!(loaded.bound_user.as_ref(), Some(&user));
    assert_eq!(loaded.credential, Some(format!("cred-{}", user)));
}

pub async fn test_second_bind_is_rejected<S: SessionStore>(store: &S) {
    let now = Utc::now();
    let alice = owner("bind_alice");
    let mallory = owner("bind_mallory");
    let token = bound_session(store, &alice, now).await;

    let err = store
        .transition(&token, bind(&mallory), now)
        .await
        .expect_err("second bind should fail");
    assert_eq!(err.kind(), ErrorKind::AlreadyBound);

    let loaded = store.get(&token).await.unwrap().unwrap();
    assert_eq!(loaded.bound_user.as_ref(), Some(&alice));
}

pub async fn test_concurrent_binds_have_one_winner<S: SessionStore>(store: &S) {
    let now = Utc::now();
    let session = make_session(now);
    store.insert(&session).await.unwrap();

    let users: Vec<OwnerId> = (0..8).map(|i| owner(&format!("race{i}"))).collect();
    let results = join_all(
        users
            .iter()
            .map(|u| store.transition(&session.token, bind(u), now)),
    )
    .await;

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one bind should win");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::AlreadyBound);
    }

    let loaded = store.get(&session.token).await.unwrap().unwrap();
    assert_eq!(loaded.bound_user, winners[0].bound_user);
}

pub async fn test_lazy_expiry_is_persisted_on_rejection<S: SessionStore>(store: &S) {
    let now = Utc::now();
    let session = make_session(now);
    store.insert(&session).await.unwrap();

    let later = now + Duration::minutes(6);
    let err = store
        .transition(&session.token, bind(&owner("late")), later)
        .await
        .expect_err("bind after the deadline should fail");
    assert_eq!(err.kind(), ErrorKind::Expired);

    let loaded = store.get(&session.token).await.unwrap().unwrap();
    assert_eq!(loaded.status, SessionStatus::Expired);
    assert!(loaded.bound_user.is_none());
}

pub async fn test_end_clears_binding<S: SessionStore>(store: &S) {
    let now = Utc::now();
    let user = owner("end");
    let token = bound_session(store, &user, now).await;

    let ended = store
        .transition(&token, Transition::End, now)
        .await
        .expect("end should succeed");
    assert_eq!(ended.status, SessionStatus::Ended);
    assert!(ended.bound_user.is_none());

    let err = store
        .transition(&token, Transition::End, now)
        .await
        .expect_err("ending twice should fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

pub async fn test_expire_overdue<S: SessionStore>(store: &S) {
    let now = Utc::now();
    let overdue = make_session(now - Duration::minutes(10));
    let fresh = make_session(now);
    store.insert(&overdue).await.unwrap();
    store.insert(&fresh).await.unwrap();

    let expired = store.expire_overdue(now).await.unwrap();
    assert!(expired >= 1, "the overdue session should be expired");

    assert_eq!(
        store.get(&overdue.token).await.unwrap().unwrap().status,
        SessionStatus::Expired
    );
    assert_eq!(
        store.get(&fresh.token).await.unwrap().unwrap().status,
        SessionStatus::Pending
    );

    // A second sweep leaves expired rows alone.
    let before = store.get(&overdue.token).await.unwrap().unwrap();
    store.expire_overdue(now).await.unwrap();
    let after = store.get(&overdue.token).await.unwrap().unwrap();
    assert_eq!(before, after);
}

// =============================================================================
// record_deposit
// =============================================================================

pub async fn test_record_deposit_credits_and_activates<S: SessionStore + LedgerStore>(store: &S) {
    let now = Utc::now();
    let user = owner("deposit");
    let token = bound_session(store, &user, now).await;

    let (receipt, session) = store
        .record_deposit(&token, session_earn(&user, &token, 30), now)
        .await
        .expect("deposit should succeed");
    assert_eq!(receipt.points_awarded, 30);
    assert_eq!(receipt.new_balance, 30);
    assert_eq!(session.status, SessionStatus::Active);

    let entry = store
        .entry(&user, receipt.entry_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.session_token.as_deref(), Some(token.as_str()));
    assert_eq!(
        store.get(&token).await.unwrap().unwrap().status,
        SessionStatus::Active
    );
}

pub async fn test_record_deposit_rejects_stranger<S: SessionStore + LedgerStore>(store: &S) {
    let now = Utc::now();
    let alice = owner("deposit_alice");
    let mallory = owner("deposit_mallory");
    let token = bound_session(store, &alice, now).await;

    let err = store
        .record_deposit(&token, session_earn(&mallory, &token, 15), now)
        .await
        .expect_err("stranger deposit should fail");
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    assert_eq!(store.balance(&mallory).await.unwrap(), 0);
    assert_eq!(store.balance(&alice).await.unwrap(), 0);
    assert_eq!(
        store.get(&token).await.unwrap().unwrap().status,
        SessionStatus::Connected
    );
}

pub async fn test_record_deposit_after_deadline<S: SessionStore + LedgerStore>(store: &S) {
    let now = Utc::now();
    let user = owner("deposit_late");
    let token = bound_session(store, &user, now).await;

    let later = now + Duration::minutes(6);
    let err = store
        .record_deposit(&token, session_earn(&user, &token, 15), later)
        .await
        .expect_err("deposit after the deadline should fail");
    assert_eq!(err.kind(), ErrorKind::Expired);

    assert_eq!(store.balance(&user).await.unwrap(), 0);
    assert_eq!(
        store.get(&token).await.unwrap().unwrap().status,
        SessionStatus::Expired
    );
}

pub async fn test_record_deposit_unknown_session<S: SessionStore + LedgerStore>(store: &S) {
    let user = owner("deposit_unknown");
    let err = store
        .record_deposit(
            "test_no_such_token",
            session_earn(&user, "test_no_such_token", 15),
            Utc::now(),
        )
        .await
        .expect_err("unknown session should fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.balance(&user).await.unwrap(), 0);
}

/// Pair, deposit twice, end, and check the deposit after end is refused.
pub async fn test_session_lifecycle<S: SessionStore + LedgerStore>(store: &S) {
    let now = Utc::now();
    let user = owner("lifecycle");
    let token = bound_session(store, &user, now).await;

    store
        .record_deposit(&token, session_earn(&user, &token, 30), now)
        .await
        .unwrap();
    let (receipt, _) = store
        .record_deposit(
            &token,
            session_earn(&user, &token, 15),
            now + Duration::minutes(1),
        )
        .await
        .unwrap();
    assert_eq!(receipt.new_balance, 45);

    store
        .transition(&token, Transition::End, now + Duration::minutes(2))
        .await
        .unwrap();

    let err = store
        .record_deposit(
            &token,
            session_earn(&user, &token, 15),
            now + Duration::minutes(3),
        )
        .await
        .expect_err("deposit after end should fail");
    assert_eq!(err.kind(), ErrorKind::SessionClosed);

    assert_eq!(store.balance(&user).await.unwrap(), 45);
    assert_eq!(store.ledger_sum(&user).await.unwrap(), 45);
    assert_eq!(
        store
            .entries(&user, Page::default())
            .await
            .unwrap()
            .len(),
        2
    );
}

pub async fn test_concurrent_session_deposits<S: SessionStore + LedgerStore>(store: &S) {
    let now = Utc::now();
    let user = owner("deposit_concurrent");
    let token = bound_session(store, &user, now).await;

    let results = join_all(
        (0..20).map(|_| store.record_deposit(&token, session_earn(&user, &token, 1), now)),
    )
    .await;
    for result in results {
        result.expect("concurrent deposit should succeed");
    }

    assert_eq!(store.balance(&user).await.unwrap(), 20);
    assert_eq!(store.ledger_sum(&user).await.unwrap(), 20);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all SessionStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_session_store_tests {
    ($store:expr) => {
        use $crate::storage::session_store_tests::*;

        test_insert_and_get($store).await;
        println!("  test_insert_and_get: PASSED");

        test_get_unknown_is_none($store).await;
        println!("  test_get_unknown_is_none: PASSED");

        test_transition_unknown_is_not_found($store).await;
        println!("  test_transition_unknown_is_not_found: PASSED");

        test_bind_persists_user($store).await;
        println!("  test_bind_persists_user: PASSED");

        test_second_bind_is_rejected($store).await;
        println!("  test_second_bind_is_rejected: PASSED");

        test_concurrent_binds_have_one_winner($store).await;
        println!("  test_concurrent_binds_have_one_winner: PASSED");

        test_lazy_expiry_is_persisted_on_rejection($store).await;
        println!("  test_lazy_expiry_is_persisted_on_rejection: PASSED");

        test_end_clears_binding($store).await;
        println!("  test_end_clears_binding: PASSED");

        test_expire_overdue($store).await;
        println!("  test_expire_overdue: PASSED");

        test_record_deposit_credits_and_activates($store).await;
        println!("  test_record_deposit_credits_and_activates: PASSED");

        test_record_deposit_rejects_stranger($store).await;
        println!("  test_record_deposit_rejects_stranger: PASSED");

        test_record_deposit_after_deadline($store).await;
        println!("  test_record_deposit_after_deadline: PASSED");

        test_record_deposit_unknown_session($store).await;
        println!("  test_record_deposit_unknown_session: PASSED");

        test_session_lifecycle($store).await;
        println!("  test_session_lifecycle: PASSED");

        test_concurrent_session_deposits($store).await;
        println!("  test_concurrent_session_deposits: PASSED");
    };
}

//! Interface tests for the pairing flow and the points ledger using Cucumber.
//!
//! These tests verify that every storage implementation gives the same
//! observable behavior. Select a backend via environment variable:
//!
//! ```bash
//! # SQLite (default)
//! cargo test --test interfaces --features sqlite
//!
//! # In-memory
//! STORAGE_BACKEND=memory cargo test --test interfaces
//!
//! # PostgreSQL (uses testcontainers)
//! STORAGE_BACKEND=postgres cargo test --test interfaces --features postgres
//! ```

mod backend;

use cucumber::World;
use steps::ledger::LedgerWorld;
use steps::pairing::PairingWorld;

#[tokio::main]
async fn main() {
    // Run pairing tests
    println!("\n=== Running Pairing Interface Tests ===\n");
    PairingWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/pairing.feature")
        .await;

    // Run ledger tests
    println!("\n=== Running Ledger Interface Tests ===\n");
    LedgerWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/ledger.feature")
        .await;
}

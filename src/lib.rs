//! ecopoints - recycling rewards backend
//!
//! Stations pair with an authenticated mobile user through a short-lived QR
//! session; deposits made during the session are credited to the user's
//! points ledger, and points are later redeemed for cash-equivalent rewards.
//!
//! The crate is organised around two cores:
//! - [`pairing`]: the station pairing session state machine
//! - [`ledger`]: the append-only points ledger with its balance projection
//!
//! [`deposit::SessionedDeposit`] ties the two together, [`storage`] provides
//! the transactional envelopes, and [`api`] exposes everything over REST.

pub mod api;
pub mod clock;
pub mod config;
pub mod deposit;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod pairing;
pub mod storage;
pub mod utils;

pub use error::{ErrorKind, Result, RewardsError};
pub use identity::OwnerId;

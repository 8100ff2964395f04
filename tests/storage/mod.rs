//! Shared storage integration tests.
//!
//! Tests the LedgerStore and SessionStore interfaces against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod session_store_tests;

//! Canonical metrics test harness.
//!
//! In-memory implementations of the storage ports for fast workflow and
//! invariant tests, plus isolated-database helpers for the Postgres
//! integration tests.

pub mod db;
pub mod mem;

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a test tracing subscriber once. Respects `RUST_LOG`.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

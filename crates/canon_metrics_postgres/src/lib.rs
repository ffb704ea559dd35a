//! Canonical metrics PostgreSQL adapter.
//!
//! One newtype-over-PgPool store per core port trait. Promotion runs as a
//! single transaction under a per-version advisory lock; constraint
//! violations are classified into the core error taxonomy by SQLSTATE.

pub mod db;
pub mod sqlx_types;
pub mod store;

pub use db::connect;
pub use store::{
    PgLineageStore, PgMetricCatalogStore, PgMetricVersionStore, PgResultStore, PgStagingStore,
};

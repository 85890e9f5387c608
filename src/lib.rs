//! Library crate backing the `archive-swarm-coordinator` binary: the
//! worker/batch coordination protocol plus the ambient stack (config,
//! errors, observability) that surrounds it.
//!
//! Split from the binary so integration tests (`tests/`) can build the full
//! `axum` router against in-memory fakes without a live Postgres or S3
//! endpoint, the same separation `sui-indexer` uses between its library and
//! its `src/bin` entrypoints.

pub mod commit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod finalize;
pub mod http;
pub mod models;
pub mod objectstore;
pub mod registry;
pub mod schema;
pub mod stats;
pub mod store;
pub mod submissions;

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

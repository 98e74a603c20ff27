//! # Schemaguard
//!
//! Advisory-locked schema command engine for PostgreSQL on the `may`
//! coroutine runtime.
//!
//! Batches of schema commands (CREATE_TABLE, ADD_COLUMN, foreign key
//! changes, ...) are validated against the live catalog, executed inside an
//! advisory-locked transaction under an all-or-nothing or best-effort
//! policy, and bracketed by deterministic schema snapshots whose SHA-256
//! hash doubles as an optimistic-concurrency token.

pub mod advisory_lock;
pub mod batch;
pub mod catalog;
pub mod command;
pub mod config;
pub mod connection;
pub mod ddl;
pub mod engine;
pub mod error;
pub mod executor;
pub mod idempotency;
pub mod ops;
pub mod snapshot;
pub mod transaction;

pub use batch::{BatchMode, BatchOutcome};
pub use command::Command;
pub use config::EngineConfig;
pub use engine::{BatchReport, BatchRequest, SchemaEngine};
pub use error::{ErrorKind, SchemaError};
pub use snapshot::SchemaSnapshot;

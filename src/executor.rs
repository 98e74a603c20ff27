//! `SchemaExecutor` — the execution seam between the command engine and
//! `may_postgres`.
//!
//! Every catalog query and DDL statement in the crate goes through this
//! trait, so operations and the batch executor can run against a direct
//! client or an open transaction interchangeably. Driver failures are routed
//! through the error normalizer here, at the boundary, so the rest of the
//! engine only ever sees [`SchemaError`].

use may_postgres::types::ToSql;
use may_postgres::{Client, Row};

use crate::error::{normalize_driver_error, SchemaError};

/// Trait for executing database operations.
///
/// Implemented by [`MayPostgresExecutor`] for direct execution and by
/// [`crate::transaction::Transaction`] for execution inside a unit of work.
pub trait SchemaExecutor {
    /// Execute a SQL statement and return the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns a normalized [`SchemaError`] if execution fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, SchemaError>;

    /// Execute a query expected to return exactly one row.
    ///
    /// # Errors
    ///
    /// Returns a normalized [`SchemaError`] if the query fails or does not
    /// return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, SchemaError>;

    /// Execute a query and return all rows.
    ///
    /// # Errors
    ///
    /// Returns a normalized [`SchemaError`] if the query fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, SchemaError>;
}

/// Primary executor implementation over a `may_postgres::Client`.
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start a new transaction.
    ///
    /// The transaction must be committed or rolled back before the executor
    /// is used again on this connection.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the BEGIN statement fails.
    pub fn begin(&self) -> Result<crate::transaction::Transaction, SchemaError> {
        crate::transaction::Transaction::new(self.client.clone())
    }
}

impl SchemaExecutor for MayPostgresExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, SchemaError> {
        self.client
            .execute(query, params)
            .map_err(|e| normalize_driver_error(&e))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, SchemaError> {
        self.client
            .query_one(query, params)
            .map_err(|e| normalize_driver_error(&e))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, SchemaError> {
        self.client
            .query(query, params)
            .map_err(|e| normalize_driver_error(&e))
    }
}

//! Transaction support for the schema engine.
//!
//! A [`Transaction`] is the unit of work the batch executor and the advisory
//! lock coordinator run inside. Nested units (savepoints) give the batch
//! executor its two rollback granularities: one savepoint around a whole
//! all-or-nothing batch, or one per command under best-effort.

use may_postgres::types::ToSql;
use may_postgres::{Client, Row};

use crate::error::{normalize_driver_error, ErrorKind, SchemaError};
use crate::executor::SchemaExecutor;

/// A database transaction.
///
/// All statements executed through the transaction are committed together or
/// rolled back together. Dropping a transaction without committing leaves the
/// rollback to the server when the connection closes; the engine always
/// resolves transactions explicitly.
pub struct Transaction {
    client: Client,
    depth: u32,
    closed: bool,
}

impl Transaction {
    /// Start a new top-level transaction on the given client.
    pub(crate) fn new(client: Client) -> Result<Self, SchemaError> {
        client
            .execute("BEGIN", &[])
            .map_err(|e| normalize_driver_error(&e))?;

        Ok(Self {
            client,
            depth: 0,
            closed: false,
        })
    }

    /// Start a nested unit of work (savepoint).
    ///
    /// The nested unit can be rolled back independently while the outer
    /// transaction stays intact. Used by the batch executor so a failed
    /// command never poisons the advisory-lock transaction around it.
    pub fn begin_nested(&mut self) -> Result<Transaction, SchemaError> {
        if self.closed {
            return Err(closed_error());
        }

        let savepoint_sql = format!("SAVEPOINT sp_{}", self.depth + 1);
        self.client
            .execute(savepoint_sql.as_str(), &[])
            .map_err(|e| normalize_driver_error(&e))?;

        Ok(Transaction {
            client: self.client.clone(),
            depth: self.depth + 1,
            closed: false,
        })
    }

    /// Commit the transaction (or release the savepoint, when nested).
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has already been committed or
    /// rolled back.
    pub fn commit(mut self) -> Result<(), SchemaError> {
        if self.closed {
            return Err(closed_error());
        }

        if self.depth == 0 {
            self.client
                .execute("COMMIT", &[])
                .map_err(|e| normalize_driver_error(&e))?;
        } else {
            let release_sql = format!("RELEASE SAVEPOINT sp_{}", self.depth);
            self.client
                .execute(release_sql.as_str(), &[])
                .map_err(|e| normalize_driver_error(&e))?;
        }

        self.closed = true;
        Ok(())
    }

    /// Roll back the transaction (or roll back to the savepoint, when nested).
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has already been committed or
    /// rolled back.
    pub fn rollback(mut self) -> Result<(), SchemaError> {
        if self.closed {
            return Err(closed_error());
        }

        if self.depth == 0 {
            self.client
                .execute("ROLLBACK", &[])
                .map_err(|e| normalize_driver_error(&e))?;
        } else {
            let rollback_sql = format!("ROLLBACK TO SAVEPOINT sp_{}", self.depth);
            self.client
                .execute(rollback_sql.as_str(), &[])
                .map_err(|e| normalize_driver_error(&e))?;
        }

        self.closed = true;
        Ok(())
    }

    /// Check if the transaction is closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn closed_error() -> SchemaError {
    SchemaError::new(
        ErrorKind::Internal,
        "Transaction has already been committed or rolled back",
    )
}

impl SchemaExecutor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, SchemaError> {
        if self.closed {
            return Err(closed_error());
        }
        self.client
            .execute(query, params)
            .map_err(|e| normalize_driver_error(&e))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, SchemaError> {
        if self.closed {
            return Err(closed_error());
        }
        self.client
            .query_one(query, params)
            .map_err(|e| normalize_driver_error(&e))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, SchemaError> {
        if self.closed {
            return Err(closed_error());
        }
        self.client
            .query(query, params)
            .map_err(|e| normalize_driver_error(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_error_kind() {
        let err = closed_error();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains("committed or rolled back"));
    }
}

//! Catalog introspection: read-only queries against `information_schema`.
//!
//! Operations validate against [`CatalogReader`] rather than a concrete
//! client so validation logic is testable without a database. All queries
//! are parameter bound and scoped to the `public` schema.

use crate::error::SchemaError;
use crate::executor::SchemaExecutor;

/// Read-only view of the live schema used by operation validation.
pub trait CatalogReader {
    /// True if `table` exists as a base table.
    fn table_exists(&self, table: &str) -> Result<bool, SchemaError>;

    /// True if `column` exists on `table`.
    fn column_exists(&self, table: &str, column: &str) -> Result<bool, SchemaError>;

    /// The catalog data type of a column, if it exists.
    fn column_type(&self, table: &str, column: &str) -> Result<Option<String>, SchemaError>;

    /// True if a function with this name is installed (pg_proc probe).
    fn function_exists(&self, name: &str) -> Result<bool, SchemaError>;

    /// Name of the foreign key constraint on `table.column`, if any.
    fn foreign_key_constraint(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Option<String>, SchemaError>;
}

/// [`CatalogReader`] over any [`SchemaExecutor`].
pub struct IntrospectionCatalog<'a> {
    executor: &'a dyn SchemaExecutor,
}

impl<'a> IntrospectionCatalog<'a> {
    pub fn new(executor: &'a dyn SchemaExecutor) -> Self {
        Self { executor }
    }
}

impl CatalogReader for IntrospectionCatalog<'_> {
    fn table_exists(&self, table: &str) -> Result<bool, SchemaError> {
        let row = self.executor.query_one(
            "SELECT EXISTS ( \
               SELECT FROM information_schema.tables \
               WHERE table_schema = 'public' AND table_name = $1 \
             )",
            &[&table],
        )?;
        Ok(row.get(0))
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<bool, SchemaError> {
        let row = self.executor.query_one(
            "SELECT EXISTS ( \
               SELECT FROM information_schema.columns \
               WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2 \
             )",
            &[&table, &column],
        )?;
        Ok(row.get(0))
    }

    fn column_type(&self, table: &str, column: &str) -> Result<Option<String>, SchemaError> {
        let rows = self.executor.query_all(
            "SELECT data_type \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2 \
             LIMIT 1",
            &[&table, &column],
        )?;
        Ok(rows.first().map(|r| r.get(0)))
    }

    fn function_exists(&self, name: &str) -> Result<bool, SchemaError> {
        let rows = self.executor.query_all(
            "SELECT 1 FROM pg_proc WHERE proname = $1 LIMIT 1",
            &[&name],
        )?;
        Ok(!rows.is_empty())
    }

    fn foreign_key_constraint(
        &self,
        table: &str,
        column: &str,
    ) -> Result<Option<String>, SchemaError> {
        let rows = self.executor.query_all(
            "SELECT constraint_name \
             FROM information_schema.key_column_usage \
             WHERE table_schema = 'public' \
               AND table_name = $1 \
               AND column_name = $2 \
               AND position_in_unique_constraint IS NOT NULL \
             LIMIT 1",
            &[&table, &column],
        )?;
        Ok(rows.first().map(|r| r.get(0)))
    }
}

//! DROP_COLUMN: drop a column from an existing table, optionally `CASCADE`.

use crate::catalog::CatalogReader;
use crate::ddl::{quote_ident, validate_identifier, validate_table_name};
use crate::error::{ErrorKind, ErrorTarget, SchemaError};
use crate::executor::SchemaExecutor;
use crate::ops::Warnings;

pub fn validate(
    catalog: &dyn CatalogReader,
    table: &str,
    column: &str,
) -> Result<Warnings, SchemaError> {
    validate_table_name(table)?;
    validate_identifier(column, "column")?;

    if !catalog.table_exists(table)? {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("Table \"{}\" does not exist", table),
        )
        .with_target(ErrorTarget::table(table)));
    }
    if !catalog.column_exists(table, column)? {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("Column \"{}\" does not exist", column),
        )
        .with_target(ErrorTarget::column(table, column)));
    }

    Ok(Vec::new())
}

pub fn build_sql(table: &str, column: &str, cascade: bool) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}{};",
        quote_ident(table),
        quote_ident(column),
        if cascade { " CASCADE" } else { "" }
    )
}

pub fn apply(
    executor: &dyn SchemaExecutor,
    table: &str,
    column: &str,
    cascade: bool,
) -> Result<Warnings, SchemaError> {
    executor.execute(&build_sql(table, column, cascade), &[])?;
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::MockCatalog;

    #[test]
    fn test_validate_column_must_exist() {
        let catalog = MockCatalog::new().with_table("users", &[("id", "integer")]);
        let err = validate(&catalog, "users", "age").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.target.unwrap().column.as_deref(), Some("age"));
    }

    #[test]
    fn test_validate_rejects_bad_identifier() {
        let catalog = MockCatalog::new().with_table("users", &[("id", "integer")]);
        let err = validate(&catalog, "users", "age; DROP TABLE users").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_build_sql() {
        assert_eq!(
            build_sql("users", "age", true),
            "ALTER TABLE \"users\" DROP COLUMN \"age\" CASCADE;"
        );
    }
}

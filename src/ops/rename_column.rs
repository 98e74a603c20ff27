//! RENAME_COLUMN: rename a column on an existing table.

use crate::catalog::CatalogReader;
use crate::ddl::{quote_ident, validate_identifier, validate_table_name};
use crate::error::{ErrorKind, ErrorTarget, SchemaError};
use crate::executor::SchemaExecutor;
use crate::ops::Warnings;

pub fn validate(
    catalog: &dyn CatalogReader,
    table: &str,
    from: &str,
    to: &str,
) -> Result<Warnings, SchemaError> {
    validate_table_name(table)?;
    validate_identifier(from, "column")?;
    validate_identifier(to, "column")?;

    if !catalog.table_exists(table)? {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("Table \"{}\" does not exist", table),
        )
        .with_target(ErrorTarget::table(table)));
    }
    if !catalog.column_exists(table, from)? {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("Column \"{}\" does not exist", from),
        )
        .with_target(ErrorTarget::column(table, from)));
    }
    if catalog.column_exists(table, to)? {
        return Err(SchemaError::new(
            ErrorKind::AlreadyExists,
            format!("Target column \"{}\" already exists", to),
        )
        .with_target(ErrorTarget::column(table, to)));
    }

    Ok(Vec::new())
}

pub fn build_sql(table: &str, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {};",
        quote_ident(table),
        quote_ident(from),
        quote_ident(to)
    )
}

pub fn apply(
    executor: &dyn SchemaExecutor,
    table: &str,
    from: &str,
    to: &str,
) -> Result<Warnings, SchemaError> {
    executor.execute(&build_sql(table, from, to), &[])?;
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::MockCatalog;

    #[test]
    fn test_validate_paths() {
        let catalog = MockCatalog::new().with_table("users", &[("id", "integer"), ("mail", "text")]);

        assert!(validate(&catalog, "users", "mail", "email").is_ok());

        let err = validate(&catalog, "users", "phone", "email").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = validate(&catalog, "users", "mail", "id").unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_build_sql() {
        assert_eq!(
            build_sql("users", "mail", "email"),
            "ALTER TABLE \"users\" RENAME COLUMN \"mail\" TO \"email\";"
        );
    }
}

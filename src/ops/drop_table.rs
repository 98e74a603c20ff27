//! DROP_TABLE: drop a table, optionally `IF EXISTS` and/or `CASCADE`.

use crate::catalog::CatalogReader;
use crate::ddl::{quote_ident, validate_table_name};
use crate::error::{ErrorKind, ErrorTarget, SchemaError};
use crate::executor::SchemaExecutor;
use crate::ops::Warnings;

pub fn validate(
    catalog: &dyn CatalogReader,
    name: &str,
    if_exists: bool,
) -> Result<Warnings, SchemaError> {
    validate_table_name(name)?;

    if !catalog.table_exists(name)? {
        if !if_exists {
            return Err(SchemaError::new(
                ErrorKind::NotFound,
                format!("Table \"{}\" does not exist", name),
            )
            .with_target(ErrorTarget::table(name)));
        }
        // ifExists makes the missing table a valid no-op
        return Ok(vec![format!(
            "Table \"{}\" does not exist; DROP TABLE IF EXISTS is a no-op",
            name
        )]);
    }

    Ok(Vec::new())
}

pub fn build_sql(name: &str, cascade: bool, if_exists: bool) -> String {
    format!(
        "DROP TABLE {}{}{};",
        if if_exists { "IF EXISTS " } else { "" },
        quote_ident(name),
        if cascade { " CASCADE" } else { "" }
    )
}

pub fn apply(
    executor: &dyn SchemaExecutor,
    name: &str,
    cascade: bool,
    if_exists: bool,
) -> Result<Warnings, SchemaError> {
    executor.execute(&build_sql(name, cascade, if_exists), &[])?;
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::MockCatalog;

    #[test]
    fn test_validate_missing_table() {
        let catalog = MockCatalog::new();
        let err = validate(&catalog, "users", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_validate_if_exists_noop_warns() {
        let catalog = MockCatalog::new();
        let warnings = validate(&catalog, "users", true).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no-op"));
    }

    #[test]
    fn test_validate_existing_table() {
        let catalog = MockCatalog::new().with_table("users", &[("id", "integer")]);
        assert!(validate(&catalog, "users", false).unwrap().is_empty());
    }

    #[test]
    fn test_build_sql() {
        assert_eq!(build_sql("users", false, false), "DROP TABLE \"users\";");
        assert_eq!(
            build_sql("users", true, true),
            "DROP TABLE IF EXISTS \"users\" CASCADE;"
        );
    }
}

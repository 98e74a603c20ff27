//! CHANGE_COLUMN_TYPE: alter a column's type, with a `USING` cast required
//! for conversions the type-family table flags as unsafe.

use crate::catalog::CatalogReader;
use crate::ddl::{quote_ident, requires_using, validate_column_type, validate_identifier, validate_table_name};
use crate::error::{ErrorKind, ErrorTarget, SchemaError};
use crate::executor::SchemaExecutor;
use crate::ops::Warnings;

pub fn validate(
    catalog: &dyn CatalogReader,
    table: &str,
    column: &str,
    new_type: &str,
    using: Option<&str>,
) -> Result<Warnings, SchemaError> {
    validate_table_name(table)?;
    validate_identifier(column, "column")?;
    validate_column_type(new_type)?;

    if let Some(using) = using {
        if using.contains(';') || using.contains("--") {
            return Err(SchemaError::validation(
                "USING expression contains disallowed characters",
            )
            .with_target(ErrorTarget::column(table, column)));
        }
    }

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

    let current = catalog.column_type(table, column)?;
    if let Some(current) = current {
        if requires_using(&current, new_type) && using.is_none() {
            let cast_target = new_type.to_lowercase();
            let cast_target = cast_target.split('(').next().unwrap_or("").to_string();
            return Err(SchemaError::new(
                ErrorKind::ConversionRequired,
                format!(
                    "Type change {} -> {} may require an explicit USING cast",
                    current, new_type
                ),
            )
            .with_target(ErrorTarget::column(table, column))
            .with_hint(format!(
                "Example: {{\"using\": \"{}::{}\"}}",
                column, cast_target
            )));
        }
    }

    Ok(Vec::new())
}

pub fn build_sql(
    table: &str,
    column: &str,
    new_type: &str,
    using: Option<&str>,
) -> Result<String, SchemaError> {
    let ty = validate_column_type(new_type)?;
    let using_clause = match using {
        Some(expr) => format!(" USING {}", expr),
        None => String::new(),
    };
    Ok(format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE {}{};",
        quote_ident(table),
        quote_ident(column),
        ty,
        using_clause
    ))
}

pub fn apply(
    executor: &dyn SchemaExecutor,
    table: &str,
    column: &str,
    new_type: &str,
    using: Option<&str>,
) -> Result<Warnings, SchemaError> {
    let sql = build_sql(table, column, new_type, using)?;
    executor.execute(&sql, &[])?;
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::MockCatalog;

    #[test]
    fn test_validate_safe_widening_needs_no_cast() {
        let catalog = MockCatalog::new().with_table("users", &[("age", "integer")]);
        assert!(validate(&catalog, "users", "age", "BIGINT", None).is_ok());
    }

    #[test]
    fn test_validate_unsafe_conversion_requires_using() {
        let catalog = MockCatalog::new().with_table("users", &[("age", "text")]);
        let err = validate(&catalog, "users", "age", "INT", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConversionRequired);
        assert!(err.hint.unwrap().contains("age::int"));

        // explicit cast expression satisfies the check
        assert!(validate(&catalog, "users", "age", "INT", Some("age::int")).is_ok());
    }

    #[test]
    fn test_validate_rejects_unsafe_using_expression() {
        let catalog = MockCatalog::new().with_table("users", &[("age", "text")]);
        let err = validate(&catalog, "users", "age", "INT", Some("age::int; DROP TABLE users"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_validate_type_allow_list_applies() {
        let catalog = MockCatalog::new().with_table("users", &[("age", "integer")]);
        assert!(validate(&catalog, "users", "age", "BYTEA", None).is_err());
    }

    #[test]
    fn test_build_sql() {
        assert_eq!(
            build_sql("users", "age", "BIGINT", None).unwrap(),
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE BIGINT;"
        );
        assert_eq!(
            build_sql("users", "age", "INT", Some("age::int")).unwrap(),
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE INT USING age::int;"
        );
    }
}

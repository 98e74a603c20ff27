//! ADD_COLUMN: add a column to an existing table.

use crate::catalog::CatalogReader;
use crate::command::ColumnDefinition;
use crate::ddl::{quote_ident, render_default, validate_column, validate_column_type, validate_table_name};
use crate::error::{ErrorKind, ErrorTarget, SchemaError};
use crate::executor::SchemaExecutor;
use crate::ops::Warnings;

pub fn validate(
    catalog: &dyn CatalogReader,
    table: &str,
    column: &ColumnDefinition,
) -> Result<Warnings, SchemaError> {
    validate_table_name(table)?;

    if !catalog.table_exists(table)? {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("Table \"{}\" does not exist", table),
        )
        .with_target(ErrorTarget::table(table)));
    }

    validate_column(column, 0)
        .map_err(|e| e.with_target(ErrorTarget::column(table, &column.name)))?;

    if catalog.column_exists(table, &column.name)? {
        return Err(SchemaError::new(
            ErrorKind::AlreadyExists,
            format!("Column \"{}\" already exists", column.name),
        )
        .with_target(ErrorTarget::column(table, &column.name)));
    }

    Ok(Vec::new())
}

pub fn build_sql(table: &str, column: &ColumnDefinition) -> Result<String, SchemaError> {
    let ty = validate_column_type(&column.data_type)?;
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(&column.name),
        ty
    );
    if !column.is_nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&render_default(default)?);
    }
    if let Some(check) = &column.check {
        sql.push_str(&format!(" CHECK ({})", check));
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    sql.push(';');
    Ok(sql)
}

pub fn apply(
    executor: &dyn SchemaExecutor,
    table: &str,
    column: &ColumnDefinition,
) -> Result<Warnings, SchemaError> {
    let sql = build_sql(table, column)?;
    executor.execute(&sql, &[])?;
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::MockCatalog;

    fn col(name: &str, ty: &str) -> ColumnDefinition {
        ColumnDefinition {
            name: name.to_string(),
            data_type: ty.to_string(),
            is_nullable: false,
            is_primary: false,
            default: None,
            check: None,
            unique: false,
            references: None,
        }
    }

    #[test]
    fn test_validate_table_must_exist() {
        let catalog = MockCatalog::new();
        let err = validate(&catalog, "users", &col("age", "INT")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_validate_column_must_not_exist() {
        let catalog = MockCatalog::new().with_table("users", &[("age", "integer")]);
        let err = validate(&catalog, "users", &col("age", "INT")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyExists);
        assert_eq!(err.target.unwrap().column.as_deref(), Some("age"));
    }

    #[test]
    fn test_validate_ok() {
        let catalog = MockCatalog::new().with_table("users", &[("id", "integer")]);
        assert!(validate(&catalog, "users", &col("age", "INT")).is_ok());
    }

    #[test]
    fn test_build_sql_with_default_and_nullability() {
        let mut c = col("status", "VARCHAR(16)");
        c.is_nullable = true;
        c.default = Some("active".to_string());
        let sql = build_sql("users", &c).unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE \"users\" ADD COLUMN \"status\" VARCHAR(16) DEFAULT 'active';"
        );
    }
}

//! RENAME_TABLE: rename an existing table.

use crate::catalog::CatalogReader;
use crate::ddl::{quote_ident, validate_table_name};
use crate::error::{ErrorKind, ErrorTarget, SchemaError};
use crate::executor::SchemaExecutor;
use crate::ops::Warnings;

pub fn validate(catalog: &dyn CatalogReader, from: &str, to: &str) -> Result<Warnings, SchemaError> {
    validate_table_name(from)?;
    validate_table_name(to)?;

    if !catalog.table_exists(from)? {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("Table \"{}\" does not exist", from),
        )
        .with_target(ErrorTarget::table(from)));
    }
    if catalog.table_exists(to)? {
        return Err(SchemaError::new(
            ErrorKind::AlreadyExists,
            format!("Target table \"{}\" already exists", to),
        )
        .with_target(ErrorTarget::table(to)));
    }

    Ok(Vec::new())
}

pub fn build_sql(from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {};",
        quote_ident(from),
        quote_ident(to)
    )
}

pub fn apply(executor: &dyn SchemaExecutor, from: &str, to: &str) -> Result<Warnings, SchemaError> {
    executor.execute(&build_sql(from, to), &[])?;
    Ok(Vec::new())
}

//! Foreign key operations: ADD_FOREIGN_KEY, DROP_FOREIGN_KEY and the
//! composed UPDATE_FOREIGN_KEY.
//!
//! UPDATE_FOREIGN_KEY is DROP followed by ADD: both phases validate before
//! either applies, so a bad replacement never leaves the column without its
//! original constraint.

use crate::catalog::{CatalogReader, IntrospectionCatalog};
use crate::command::{ForeignKeySpec, ReferentialAction};
use crate::ddl::{is_valid_identifier, quote_ident, validate_identifier, validate_table_name};
use crate::error::{ErrorKind, ErrorTarget, SchemaError};
use crate::executor::SchemaExecutor;
use crate::ops::Warnings;

pub fn validate_add(
    catalog: &dyn CatalogReader,
    spec: &ForeignKeySpec,
) -> Result<Warnings, SchemaError> {
    validate_table_name(&spec.table)?;
    validate_identifier(&spec.column, "column")?;
    validate_table_name(&spec.reference.table)?;
    validate_identifier(&spec.reference.column, "reference column")?;

    if !catalog.table_exists(&spec.table)? {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("Table \"{}\" does not exist", spec.table),
        )
        .with_target(ErrorTarget::table(&spec.table)));
    }
    if !catalog.column_exists(&spec.table, &spec.column)? {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("Column \"{}\" does not exist", spec.column),
        )
        .with_target(ErrorTarget::column(&spec.table, &spec.column)));
    }
    if !catalog.table_exists(&spec.reference.table)? {
        return Err(SchemaError::new(
            ErrorKind::FkTableMissing,
            format!(
                "Referenced table \"{}\" does not exist",
                spec.reference.table
            ),
        )
        .with_target(ErrorTarget::table(&spec.reference.table)));
    }
    if !catalog.column_exists(&spec.reference.table, &spec.reference.column)? {
        return Err(SchemaError::new(
            ErrorKind::FkColumnMissing,
            format!(
                "Referenced column \"{}({})\" does not exist",
                spec.reference.table, spec.reference.column
            ),
        )
        .with_target(ErrorTarget::column(
            &spec.reference.table,
            &spec.reference.column,
        )));
    }

    if let Some(rule) = &spec.on_delete {
        ReferentialAction::parse(rule)?;
    }
    if let Some(rule) = &spec.on_update {
        ReferentialAction::parse(rule)?;
    }

    Ok(Vec::new())
}

/// Builds the ADD CONSTRAINT statement from a validated spec.
pub fn build_add_sql(spec: &ForeignKeySpec) -> Result<String, SchemaError> {
    let constraint = match &spec.constraint_name {
        Some(name) if is_valid_identifier(name) => name.clone(),
        _ => format!("{}_{}_fkey", spec.table, spec.column),
    };

    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
        quote_ident(&spec.table),
        quote_ident(&constraint),
        quote_ident(&spec.column),
        quote_ident(&spec.reference.table),
        quote_ident(&spec.reference.column)
    );
    if let Some(rule) = &spec.on_delete {
        sql.push_str(&format!(" ON DELETE {}", ReferentialAction::parse(rule)?.as_sql()));
    }
    if let Some(rule) = &spec.on_update {
        sql.push_str(&format!(" ON UPDATE {}", ReferentialAction::parse(rule)?.as_sql()));
    }
    sql.push(';');
    Ok(sql)
}

pub fn apply_add(executor: &dyn SchemaExecutor, spec: &ForeignKeySpec) -> Result<Warnings, SchemaError> {
    let sql = build_add_sql(spec)?;
    executor.execute(&sql, &[])?;
    Ok(Vec::new())
}

pub fn validate_drop(
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

    Ok(Vec::new())
}

pub fn apply_drop(
    executor: &dyn SchemaExecutor,
    table: &str,
    column: &str,
) -> Result<Warnings, SchemaError> {
    // Constraint name is resolved at apply time so the drop targets whatever
    // FK currently exists on the column
    let catalog = IntrospectionCatalog::new(executor);
    let Some(constraint) = catalog.foreign_key_constraint(table, column)? else {
        return Err(SchemaError::new(
            ErrorKind::NotFound,
            format!("No foreign key found on column \"{}\"", column),
        )
        .with_target(ErrorTarget::column(table, column)));
    };

    let sql = format!(
        "ALTER TABLE {} DROP CONSTRAINT {};",
        quote_ident(table),
        quote_ident(&constraint)
    );
    executor.execute(&sql, &[])?;
    Ok(Vec::new())
}

pub fn validate_update(
    catalog: &dyn CatalogReader,
    spec: &ForeignKeySpec,
) -> Result<Warnings, SchemaError> {
    validate_drop(catalog, &spec.table, &spec.column)?;
    validate_add(catalog, spec)?;
    Ok(Vec::new())
}

pub fn apply_update(
    executor: &dyn SchemaExecutor,
    spec: &ForeignKeySpec,
) -> Result<Warnings, SchemaError> {
    apply_drop(executor, &spec.table, &spec.column)?;
    apply_add(executor, spec)?;
    Ok(Vec::new())
}

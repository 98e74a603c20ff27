//! CREATE_TABLE: create a new table with columns, a primary key and optional
//! inline foreign keys.

use crate::catalog::CatalogReader;
use crate::command::ColumnDefinition;
use crate::ddl::{quote_ident, render_default, validate_column, validate_column_type, validate_table_name};
use crate::error::{ErrorKind, ErrorTarget, SchemaError};
use crate::executor::SchemaExecutor;
use crate::ops::Warnings;
use std::collections::HashSet;

pub fn validate(
    catalog: &dyn CatalogReader,
    name: &str,
    columns: &[ColumnDefinition],
) -> Result<Warnings, SchemaError> {
    validate_table_name(name)?;

    if columns.is_empty() {
        return Err(SchemaError::validation(
            "\"columns\" must be a non-empty array",
        ));
    }

    if catalog.table_exists(name)? {
        return Err(SchemaError::new(
            ErrorKind::AlreadyExists,
            format!("Table \"{}\" already exists", name),
        )
        .with_target(ErrorTarget::table(name)));
    }

    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(
                SchemaError::validation("Duplicate column names in the column list")
                    .with_target(ErrorTarget::table(name)),
            );
        }
    }

    let mut needs_gen_random_uuid = false;
    for (i, column) in columns.iter().enumerate() {
        validate_column(column, i)
            .map_err(|e| e.with_target(ErrorTarget::column(name, &column.name)))?;

        if column
            .default
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains("gen_random_uuid"))
        {
            needs_gen_random_uuid = true;
        }

        if let Some(reference) = &column.references {
            validate_table_name(&reference.table)?;
            if !catalog.table_exists(&reference.table)? {
                return Err(SchemaError::new(
                    ErrorKind::FkTableMissing,
                    format!(
                        "Foreign key references missing table \"{}\"",
                        reference.table
                    ),
                )
                .with_target(ErrorTarget::column(name, &column.name)));
            }
            if !catalog.column_exists(&reference.table, &reference.column)? {
                return Err(SchemaError::new(
                    ErrorKind::FkColumnMissing,
                    format!(
                        "Foreign key references missing column \"{}({})\"",
                        reference.table, reference.column
                    ),
                )
                .with_target(ErrorTarget::column(name, &column.name)));
            }
        }
    }

    if !columns.iter().any(|c| c.is_primary) {
        return Err(
            SchemaError::validation("At least one primary key column is required")
                .with_target(ErrorTarget::table(name)),
        );
    }

    // gen_random_uuid() lives in pgcrypto (or core on 13+); probe before
    // emitting a default that would fail at apply time
    if needs_gen_random_uuid && !catalog.function_exists("gen_random_uuid")? {
        return Err(SchemaError::new(
            ErrorKind::MissingExtension,
            "gen_random_uuid() requires the pgcrypto extension",
        )
        .with_target(ErrorTarget::table(name))
        .with_hint("Run: CREATE EXTENSION IF NOT EXISTS \"pgcrypto\";"));
    }

    Ok(Vec::new())
}

/// Builds the CREATE TABLE statement from validated input.
pub fn build_sql(name: &str, columns: &[ColumnDefinition]) -> Result<String, SchemaError> {
    let mut defs = Vec::with_capacity(columns.len() + 1);

    for column in columns {
        let ty = validate_column_type(&column.data_type)?;
        let mut def = format!("{} {}", quote_ident(&column.name), ty);
        if !column.is_nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(&render_default(default)?);
        }
        if let Some(check) = &column.check {
            def.push_str(&format!(" CHECK ({})", check));
        }
        if column.unique {
            def.push_str(" UNIQUE");
        }
        defs.push(def);
    }

    let pk_cols: Vec<String> = columns
        .iter()
        .filter(|c| c.is_primary)
        .map(|c| quote_ident(&c.name))
        .collect();
    defs.push(format!("PRIMARY KEY ({})", pk_cols.join(", ")));

    for column in columns {
        if let Some(reference) = &column.references {
            defs.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                quote_ident(&column.name),
                quote_ident(&reference.table),
                quote_ident(&reference.column)
            ));
        }
    }

    Ok(format!(
        "CREATE TABLE {} ({});",
        quote_ident(name),
        defs.join(", ")
    ))
}

pub fn apply(
    executor: &dyn SchemaExecutor,
    name: &str,
    columns: &[ColumnDefinition],
) -> Result<Warnings, SchemaError> {
    let sql = build_sql(name, columns)?;
    executor.execute(&sql, &[])?;
    Ok(Vec::new())
}

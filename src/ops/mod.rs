//! The operation registry.
//!
//! Each schema operation lives in its own module with a `validate`/`apply`
//! pair: `validate` is a pure read over the [`CatalogReader`] and never
//! mutates state; `apply` emits the literal DDL statement through a
//! [`SchemaExecutor`]. Dispatch is an exhaustive match over [`Command`], so
//! every operation is covered at compile time.
//!
//! Statement builders are pure functions over already-validated input:
//! identifiers are allow-list validated then double-quoted, literals are
//! escaped, and expression channels (CHECK / USING) are character restricted.

pub mod add_column;
pub mod change_column_type;
pub mod create_table;
pub mod drop_column;
pub mod drop_table;
pub mod foreign_key;
pub mod rename_column;
pub mod rename_table;

use crate::catalog::CatalogReader;
use crate::command::Command;
use crate::error::SchemaError;
use crate::executor::SchemaExecutor;

/// Warnings emitted by a validate or apply phase.
pub type Warnings = Vec<String>;

/// Runs the validate phase of one command. Pure read; no statement is
/// executed beyond catalog queries.
pub fn validate(catalog: &dyn CatalogReader, cmd: &Command) -> Result<Warnings, SchemaError> {
    match cmd {
        Command::CreateTable { name, columns } => create_table::validate(catalog, name, columns),
        Command::DropTable {
            name, if_exists, ..
        } => drop_table::validate(catalog, name, *if_exists),
        Command::RenameTable { from, to } => rename_table::validate(catalog, from, to),
        Command::AddColumn { table, column } => add_column::validate(catalog, table, column),
        Command::DropColumn { table, column, .. } => drop_column::validate(catalog, table, column),
        Command::RenameColumn { table, from, to } => {
            rename_column::validate(catalog, table, from, to)
        }
        Command::ChangeColumnType {
            table,
            column,
            new_type,
            using,
        } => change_column_type::validate(catalog, table, column, new_type, using.as_deref()),
        Command::AddForeignKey(spec) => foreign_key::validate_add(catalog, spec),
        Command::DropForeignKey { table, column } => {
            foreign_key::validate_drop(catalog, table, column)
        }
        Command::UpdateForeignKey(spec) => foreign_key::validate_update(catalog, spec),
    }
}

/// Runs the apply phase of one command against an executor.
///
/// Callers are expected to have run [`validate`] first; apply still goes
/// through the statement builders, so invalid input cannot reach raw SQL.
pub fn apply(executor: &dyn SchemaExecutor, cmd: &Command) -> Result<Warnings, SchemaError> {
    match cmd {
        Command::CreateTable { name, columns } => create_table::apply(executor, name, columns),
        Command::DropTable {
            name,
            cascade,
            if_exists,
        } => drop_table::apply(executor, name, *cascade, *if_exists),
        Command::RenameTable { from, to } => rename_table::apply(executor, from, to),
        Command::AddColumn { table, column } => add_column::apply(executor, table, column),
        Command::DropColumn {
            table,
            column,
            cascade,
        } => drop_column::apply(executor, table, column, *cascade),
        Command::RenameColumn { table, from, to } => rename_column::apply(executor, table, from, to),
        Command::ChangeColumnType {
            table,
            column,
            new_type,
            using,
        } => change_column_type::apply(executor, table, column, new_type, using.as_deref()),
        Command::AddForeignKey(spec) => foreign_key::apply_add(executor, spec),
        Command::DropForeignKey { table, column } => foreign_key::apply_drop(executor, table, column),
        Command::UpdateForeignKey(spec) => foreign_key::apply_update(executor, spec),
    }
}

//! Batch execution over a transaction.
//!
//! A batch is an ordered list of commands executed inside one transaction,
//! under one of two failure policies:
//!
//! * `allOrNothing` — one savepoint around the whole batch; the first failure
//!   rolls every command back and the batch reports nothing applied.
//! * `bestEffort` — one savepoint per command; a failed command is rolled
//!   back and recorded, and execution continues with the next.
//!
//! Savepoints rather than transaction boundaries, because the batch runs
//! inside the advisory-lock transaction: a failed statement must not poison
//! the outer transaction that still holds the lock.

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogReader, IntrospectionCatalog};
use crate::command::Command;
use crate::error::SchemaError;
use crate::ops;
use crate::transaction::Transaction;

/// Failure policy for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatchMode {
    #[default]
    #[serde(rename = "allOrNothing")]
    AllOrNothing,
    #[serde(rename = "bestEffort")]
    BestEffort,
}

/// One successfully validated or applied command in a batch result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCommand {
    pub index: usize,
    pub op: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl AppliedCommand {
    fn new(index: usize, op: &'static str, warnings: Vec<String>) -> Self {
        Self {
            index,
            op,
            status: "OK",
            warnings,
        }
    }
}

/// One failed command in a batch result. The normalized error is flattened
/// into the entry, so the wire shape is `{index, op, status, code, message,
/// hint?, target?, details?}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedCommand {
    pub index: usize,
    pub op: &'static str,
    pub status: &'static str,
    #[serde(flatten)]
    pub error: SchemaError,
}

impl FailedCommand {
    fn new(index: usize, op: &'static str, error: SchemaError) -> Self {
        Self {
            index,
            op,
            status: "ERROR",
            error,
        }
    }
}

/// Per-command results of a batch, in submission order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// True iff no command failed.
    pub success: bool,
    pub applied: Vec<AppliedCommand>,
    pub failed: Vec<FailedCommand>,
    /// Every per-command warning, flattened, in submission order.
    pub warnings: Vec<String>,
}

impl BatchOutcome {
    fn finish(mut self) -> Self {
        self.success = self.failed.is_empty();
        self.warnings = self
            .applied
            .iter()
            .flat_map(|entry| entry.warnings.iter().cloned())
            .collect();
        self
    }
}

fn empty_batch_error() -> SchemaError {
    SchemaError::validation("\"commands\" must be a non-empty array")
}

/// Dry-run: validates every command against the catalog without executing
/// anything.
///
/// Unlike execution, validation does not stop at the first failure; the
/// caller gets the full list of problems in one pass. Commands are checked
/// against the current catalog state only, so a command depending on an
/// earlier command's effect (e.g. ADD_COLUMN on a table created in the same
/// batch) reports not-found in a dry run.
pub fn validate_commands(
    catalog: &dyn CatalogReader,
    commands: &[Command],
) -> Result<BatchOutcome, SchemaError> {
    if commands.is_empty() {
        return Err(empty_batch_error());
    }

    let mut outcome = BatchOutcome::default();
    for (index, cmd) in commands.iter().enumerate() {
        match ops::validate(catalog, cmd) {
            Ok(warnings) => outcome
                .applied
                .push(AppliedCommand::new(index, cmd.op_name(), warnings)),
            Err(error) => outcome
                .failed
                .push(FailedCommand::new(index, cmd.op_name(), error)),
        }
    }
    Ok(outcome.finish())
}

/// The savepoint seam the batch policies run over.
///
/// [`Transaction`] is the production implementation; the policies only see
/// this trait, so their rollback behavior is testable without a live
/// database (the way [`CatalogReader`] does for validation).
pub trait UnitOfWork: Sized {
    /// Open a nested unit (savepoint) that can be resolved independently.
    fn begin_nested(&mut self) -> Result<Self, SchemaError>;

    /// Validate and apply one command inside this unit, returning its
    /// warnings.
    fn run(&self, cmd: &Command) -> Result<Vec<String>, SchemaError>;

    /// Release the unit, keeping its effects.
    fn commit(self) -> Result<(), SchemaError>;

    /// Roll the unit back, discarding its effects.
    fn rollback(self) -> Result<(), SchemaError>;
}

impl UnitOfWork for Transaction {
    fn begin_nested(&mut self) -> Result<Self, SchemaError> {
        Transaction::begin_nested(self)
    }

    // validated against the transaction's own view of the catalog just
    // before it runs, so a command sees the uncommitted effects of earlier
    // commands in the same batch
    fn run(&self, cmd: &Command) -> Result<Vec<String>, SchemaError> {
        let mut warnings = {
            let catalog = IntrospectionCatalog::new(self);
            ops::validate(&catalog, cmd)?
        };
        warnings.extend(ops::apply(self, cmd)?);
        Ok(warnings)
    }

    fn commit(self) -> Result<(), SchemaError> {
        Transaction::commit(self)
    }

    fn rollback(self) -> Result<(), SchemaError> {
        Transaction::rollback(self)
    }
}

/// Executes a batch inside the given unit of work under the requested
/// policy.
pub fn apply_commands<U: UnitOfWork>(
    tx: &mut U,
    commands: &[Command],
    mode: BatchMode,
) -> Result<BatchOutcome, SchemaError> {
    if commands.is_empty() {
        return Err(empty_batch_error());
    }

    match mode {
        BatchMode::AllOrNothing => apply_all_or_nothing(tx, commands),
        BatchMode::BestEffort => apply_best_effort(tx, commands),
    }
}

fn apply_all_or_nothing<U: UnitOfWork>(
    tx: &mut U,
    commands: &[Command],
) -> Result<BatchOutcome, SchemaError> {
    let nested = tx.begin_nested()?;
    let mut outcome = BatchOutcome::default();

    for (index, cmd) in commands.iter().enumerate() {
        match nested.run(cmd) {
            Ok(warnings) => outcome
                .applied
                .push(AppliedCommand::new(index, cmd.op_name(), warnings)),
            Err(error) => {
                log::warn!(
                    "batch command {} ({}) failed, rolling back batch: {}",
                    index,
                    cmd.op_name(),
                    error
                );
                outcome
                    .failed
                    .push(FailedCommand::new(index, cmd.op_name(), error));
                // every prior command is undone with the savepoint
                outcome.applied.clear();
                nested.rollback()?;
                return Ok(outcome.finish());
            }
        }
    }

    nested.commit()?;
    Ok(outcome.finish())
}

fn apply_best_effort<U: UnitOfWork>(
    tx: &mut U,
    commands: &[Command],
) -> Result<BatchOutcome, SchemaError> {
    let mut outcome = BatchOutcome::default();

    for (index, cmd) in commands.iter().enumerate() {
        let nested = tx.begin_nested()?;
        match nested.run(cmd) {
            Ok(warnings) => {
                nested.commit()?;
                outcome
                    .applied
                    .push(AppliedCommand::new(index, cmd.op_name(), warnings));
            }
            Err(error) => {
                log::warn!(
                    "batch command {} ({}) failed, continuing: {}",
                    index,
                    cmd.op_name(),
                    error
                );
                nested.rollback()?;
                outcome
                    .failed
                    .push(FailedCommand::new(index, cmd.op_name(), error));
            }
        }
    }

    Ok(outcome.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mock::MockCatalog;
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory unit of work. Commands against a table whose name starts
    /// with "bad" fail; everything else succeeds. Savepoint traffic is
    /// journaled so tests can assert the rollback choreography.
    struct ScriptedWork {
        journal: Rc<RefCell<Vec<String>>>,
        depth: u32,
    }

    impl ScriptedWork {
        fn new() -> Self {
            Self {
                journal: Rc::new(RefCell::new(Vec::new())),
                depth: 0,
            }
        }

        fn journal(&self) -> Vec<String> {
            self.journal.borrow().clone()
        }

        fn record(&self, entry: String) {
            self.journal.borrow_mut().push(entry);
        }
    }

    impl UnitOfWork for ScriptedWork {
        fn begin_nested(&mut self) -> Result<Self, SchemaError> {
            let depth = self.depth + 1;
            self.record(format!("savepoint sp_{}", depth));
            Ok(Self {
                journal: self.journal.clone(),
                depth,
            })
        }

        fn run(&self, cmd: &Command) -> Result<Vec<String>, SchemaError> {
            let name = match cmd {
                Command::DropTable { name, .. } => name.clone(),
                other => other.op_name().to_string(),
            };
            self.record(format!("run {}", name));
            if name.starts_with("bad") {
                return Err(SchemaError::new(
                    ErrorKind::NotFound,
                    format!("Table \"{}\" does not exist", name),
                ));
            }
            Ok(Vec::new())
        }

        fn commit(self) -> Result<(), SchemaError> {
            self.record(format!("release sp_{}", self.depth));
            Ok(())
        }

        fn rollback(self) -> Result<(), SchemaError> {
            self.record(format!("rollback sp_{}", self.depth));
            Ok(())
        }
    }

    fn drop_table(name: &str) -> Command {
        Command::DropTable {
            name: name.into(),
            cascade: false,
            if_exists: false,
        }
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(
            serde_json::from_value::<BatchMode>(json!("allOrNothing")).unwrap(),
            BatchMode::AllOrNothing
        );
        assert_eq!(
            serde_json::from_value::<BatchMode>(json!("bestEffort")).unwrap(),
            BatchMode::BestEffort
        );
        assert!(serde_json::from_value::<BatchMode>(json!("partial")).is_err());
        assert_eq!(BatchMode::default(), BatchMode::AllOrNothing);
    }

    #[test]
    fn test_validate_commands_rejects_empty_batch() {
        let catalog = MockCatalog::new();
        assert!(validate_commands(&catalog, &[]).is_err());
    }

    #[test]
    fn test_validate_commands_reports_every_failure() {
        let catalog = MockCatalog::new().with_table("users", &[("id", "integer")]);
        let commands = vec![
            drop_table("users"),
            drop_table("missing_a"),
            drop_table("missing_b"),
        ];

        let outcome = validate_commands(&catalog, &commands).unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(outcome.applied[0].index, 0);
        assert_eq!(outcome.failed[0].index, 1);
        assert_eq!(outcome.failed[1].index, 2);
        assert!(!outcome.success);
    }

    #[test]
    fn test_outcome_serializes_in_submission_order() {
        let catalog = MockCatalog::new().with_table("users", &[("id", "integer")]);
        let commands = vec![drop_table("missing"), drop_table("users")];

        let outcome = validate_commands(&catalog, &commands).unwrap();
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["failed"][0]["index"], 0);
        assert_eq!(v["failed"][0]["op"], "DROP_TABLE");
        assert_eq!(v["failed"][0]["status"], "ERROR");
        assert_eq!(v["failed"][0]["code"], "not_found");
        assert_eq!(v["applied"][0]["index"], 1);
        assert_eq!(v["applied"][0]["status"], "OK");
    }

    #[test]
    fn test_all_or_nothing_commits_one_savepoint_around_the_batch() {
        let mut work = ScriptedWork::new();
        let commands = vec![drop_table("users"), drop_table("orders")];

        let outcome = apply_commands(&mut work, &commands, BatchMode::AllOrNothing).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.applied.len(), 2);
        assert!(outcome.failed.is_empty());
        assert_eq!(
            work.journal(),
            vec!["savepoint sp_1", "run users", "run orders", "release sp_1"]
        );
    }

    #[test]
    fn test_all_or_nothing_failure_rolls_back_and_clears_applied() {
        let mut work = ScriptedWork::new();
        let commands = vec![
            drop_table("users"),
            drop_table("bad_table"),
            drop_table("orders"),
        ];

        let outcome = apply_commands(&mut work, &commands, BatchMode::AllOrNothing).unwrap();
        assert!(!outcome.success);
        // the earlier success was undone with the savepoint, so it is not
        // reported as applied
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].index, 1);
        assert_eq!(outcome.failed[0].error.kind, ErrorKind::NotFound);
        // the third command never ran; the batch stopped at the failure
        assert_eq!(
            work.journal(),
            vec![
                "savepoint sp_1",
                "run users",
                "run bad_table",
                "rollback sp_1"
            ]
        );
    }

    #[test]
    fn test_best_effort_continues_past_failures_with_own_savepoints() {
        let mut work = ScriptedWork::new();
        let commands = vec![
            drop_table("users"),
            drop_table("bad_table"),
            drop_table("orders"),
        ];

        let outcome = apply_commands(&mut work, &commands, BatchMode::BestEffort).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(outcome.applied[0].index, 0);
        assert_eq!(outcome.applied[1].index, 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].index, 1);
        assert_eq!(
            work.journal(),
            vec![
                "savepoint sp_1",
                "run users",
                "release sp_1",
                "savepoint sp_1",
                "run bad_table",
                "rollback sp_1",
                "savepoint sp_1",
                "run orders",
                "release sp_1"
            ]
        );
    }

    #[test]
    fn test_apply_rejects_empty_batch() {
        let mut work = ScriptedWork::new();
        assert!(apply_commands(&mut work, &[], BatchMode::AllOrNothing).is_err());
        assert!(work.journal().is_empty());
    }

    #[test]
    fn test_dry_run_no_op_warning_surfaces() {
        let catalog = MockCatalog::new();
        let commands = vec![Command::DropTable {
            name: "ghost".into(),
            cascade: false,
            if_exists: true,
        }];

        let outcome = validate_commands(&catalog, &commands).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.applied[0].warnings.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
    }
}

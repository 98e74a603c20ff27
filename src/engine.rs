//! The top-level pipeline: snapshot, concurrency check, locked batch
//! execution, snapshot again.
//!
//! One [`SchemaEngine`] wraps one connection. `execute` is the mutating
//! entry point; `validate` and `snapshot` are read-only and take no lock.

use serde::{Deserialize, Serialize};

use crate::advisory_lock::with_schema_lock;
use crate::batch::{apply_commands, validate_commands, BatchMode, BatchOutcome};
use crate::catalog::IntrospectionCatalog;
use crate::command::Command;
use crate::config::EngineConfig;
use crate::connection::{self, redact_database_url, ConnectionError};
use crate::error::{ErrorKind, SchemaError};
use crate::executor::MayPostgresExecutor;
use crate::snapshot::{self, SchemaSnapshot};

/// One batch request, as received on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub commands: Vec<Command>,
    #[serde(default)]
    pub mode: BatchMode,
    #[serde(default)]
    pub dry_run: bool,
    /// Optimistic-concurrency token from an earlier snapshot.
    #[serde(default)]
    pub expected_hash: Option<String>,
}

/// Result of a batch request: per-command outcomes plus the schema hashes
/// bracketing the execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub dry_run: bool,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
    pub schema_hash_before: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_hash_after: Option<String>,
}

pub struct SchemaEngine {
    executor: MayPostgresExecutor,
    /// Advisory lock scope; also the identity logged for this engine.
    scope: String,
    config: EngineConfig,
}

impl SchemaEngine {
    /// Connects to the database and builds an engine around the connection.
    pub fn connect(connection_string: &str, config: EngineConfig) -> Result<Self, SchemaError> {
        let client = connection::connect(connection_string).map_err(|e| match e {
            ConnectionError::InvalidConnectionString(msg) => SchemaError::validation(msg),
            ConnectionError::PostgresError(err) => {
                SchemaError::new(ErrorKind::Database, err.to_string())
            }
        })?;

        log::info!(
            "schema engine ready for {}",
            redact_database_url(connection_string)
        );
        Ok(Self {
            executor: MayPostgresExecutor::new(client),
            scope: connection_string.to_string(),
            config,
        })
    }

    pub fn from_parts(executor: MayPostgresExecutor, scope: String, config: EngineConfig) -> Self {
        Self {
            executor,
            scope,
            config,
        }
    }

    /// Validates a batch against the live catalog without locking or
    /// applying anything.
    pub fn validate(&self, commands: &[Command]) -> Result<BatchOutcome, SchemaError> {
        let catalog = IntrospectionCatalog::new(&self.executor);
        validate_commands(&catalog, commands)
    }

    /// Captures a schema snapshot, optionally scoped to one table.
    pub fn snapshot(&self, table: Option<&str>) -> Result<SchemaSnapshot, SchemaError> {
        snapshot::capture(&self.executor, table)
    }

    /// Runs a batch: pre-snapshot, expected-hash check, then either a dry
    /// run or locked execution, then (for real runs) a post-snapshot.
    pub fn execute(&self, request: &BatchRequest) -> Result<BatchReport, SchemaError> {
        let before = snapshot::capture(&self.executor, None)?;
        check_expected_hash(request.expected_hash.as_deref(), &before.schema_hash)?;

        if request.dry_run {
            let outcome = self.validate(&request.commands)?;
            return Ok(BatchReport {
                dry_run: true,
                outcome,
                schema_hash_before: before.schema_hash,
                schema_hash_after: None,
            });
        }

        let outcome = with_schema_lock(
            &self.executor,
            &self.scope,
            self.config.lock_timeout(),
            |tx| apply_commands(tx, &request.commands, request.mode),
        )?;

        let after = snapshot::capture(&self.executor, None)?;
        log::info!(
            "batch finished: {} applied, {} failed, schema {} -> {}",
            outcome.applied.len(),
            outcome.failed.len(),
            &before.schema_hash[..12],
            &after.schema_hash[..12]
        );

        Ok(BatchReport {
            dry_run: false,
            outcome,
            schema_hash_before: before.schema_hash,
            schema_hash_after: Some(after.schema_hash),
        })
    }
}

/// Optimistic concurrency: a stale `expectedHash` refuses the whole batch
/// before anything runs.
fn check_expected_hash(expected: Option<&str>, actual: &str) -> Result<(), SchemaError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if expected == actual {
        return Ok(());
    }
    Err(SchemaError::new(
        ErrorKind::SchemaConflict,
        "The schema has changed since the expected hash was taken",
    )
    .with_details(serde_json::json!({
        "expectedHash": expected,
        "actualHash": actual,
    }))
    .with_hint("Fetch a fresh snapshot and retry with its schemaHash."))
}

//! Advisory-lock coordination for schema changes.
//!
//! All mutating batches against one database run under a single
//! `pg_advisory_lock`, keyed off the connection scope, so concurrent engine
//! instances serialize their schema changes. The lock is session-level and
//! is explicitly released on every exit path; the wait is bounded with a
//! transaction-local `statement_timeout` so a stuck peer surfaces as
//! [`ErrorKind::LockTimeout`] instead of an indefinite hang.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, SchemaError};
use crate::executor::{MayPostgresExecutor, SchemaExecutor};
use crate::transaction::Transaction;

/// Derives the two-key advisory lock identity for a scope string.
///
/// The first eight bytes of the scope's SHA-256 digest, big-endian, split
/// into two i32s for the two-argument form of `pg_advisory_lock`.
pub fn lock_key_for(scope: &str) -> (i32, i32) {
    let digest = Sha256::digest(scope.as_bytes());
    let a = i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let b = i32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]);
    (a, b)
}

/// SQLSTATEs raised when the bounded lock wait gives up, with a message
/// fallback for drivers that surface the cancellation as text only.
fn is_lock_wait_failure(err: &SchemaError) -> bool {
    if let Some(details) = &err.details {
        if matches!(
            details.get("sqlstate").and_then(|v| v.as_str()),
            Some("57014") | Some("55P03")
        ) {
            return true;
        }
    }
    err.message.contains("canceling statement") || err.message.contains("lock timeout")
}

/// Runs `f` inside a transaction that holds the schema advisory lock.
///
/// The transaction is committed when `f` succeeds and rolled back when it
/// fails; the lock is released either way. A lock wait that exceeds
/// `timeout` maps to [`ErrorKind::LockTimeout`].
pub fn with_schema_lock<T>(
    executor: &MayPostgresExecutor,
    scope: &str,
    timeout: Duration,
    f: impl FnOnce(&mut Transaction) -> Result<T, SchemaError>,
) -> Result<T, SchemaError> {
    let (a, b) = lock_key_for(scope);
    let mut tx = executor.begin()?;

    // SET does not take bind parameters; the value is a computed integer
    let timeout_ms = timeout.as_millis() as i64;
    if let Err(err) = tx.execute(
        &format!("SET LOCAL statement_timeout = {}", timeout_ms),
        &[],
    ) {
        let _ = tx.rollback();
        return Err(err);
    }

    log::debug!("acquiring schema advisory lock ({}, {})", a, b);
    if let Err(err) = tx.query_one("SELECT pg_advisory_lock($1, $2)", &[&a, &b]) {
        let _ = tx.rollback();
        if is_lock_wait_failure(&err) {
            return Err(SchemaError::new(
                ErrorKind::LockTimeout,
                format!(
                    "Could not acquire the schema lock within {} ms",
                    timeout_ms
                ),
            )
            .with_hint("Another schema change is in progress. Retry shortly."));
        }
        return Err(err);
    }

    // lift the bound once the lock is held so the batch itself is not
    // cancelled mid-DDL
    let result = tx
        .execute("SET LOCAL statement_timeout = DEFAULT", &[])
        .and_then(|_| f(&mut tx));

    let resolution = match &result {
        Ok(_) => tx.commit(),
        Err(err) => {
            log::warn!("rolling back locked schema transaction: {}", err);
            tx.rollback()
        }
    };

    // session-level lock: survives commit/rollback, must be released here
    if let Err(unlock_err) = executor.query_one("SELECT pg_advisory_unlock($1, $2)", &[&a, &b]) {
        log::warn!("failed to release schema advisory lock: {}", unlock_err);
    }

    let value = result?;
    resolution?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lock_key_is_deterministic() {
        let key = lock_key_for("postgresql://db.internal/app");
        assert_eq!(key, lock_key_for("postgresql://db.internal/app"));
    }

    #[test]
    fn test_lock_key_differs_per_scope() {
        assert_ne!(lock_key_for("db-a"), lock_key_for("db-b"));
    }

    #[test]
    fn test_lock_key_uses_digest_prefix() {
        let digest = Sha256::digest(b"scope");
        let (a, b) = lock_key_for("scope");
        assert_eq!(
            a,
            i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
        );
        assert_eq!(
            b,
            i32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]])
        );
    }

    #[test]
    fn test_lock_wait_failure_detection() {
        let timed_out = SchemaError::new(ErrorKind::Database, "canceling statement")
            .with_details(json!({"sqlstate": "57014"}));
        assert!(is_lock_wait_failure(&timed_out));

        let unrelated = SchemaError::new(ErrorKind::Database, "connection reset");
        assert!(!is_lock_wait_failure(&unrelated));

        let other_state = SchemaError::new(ErrorKind::Database, "syntax error")
            .with_details(json!({"sqlstate": "42601"}));
        assert!(!is_lock_wait_failure(&other_state));
    }
}

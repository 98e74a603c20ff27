//! Idempotency coordination over a distributed result cache.
//!
//! A mutating request carrying an idempotency token executes at most once
//! per database: the first arrival claims a short-lived lock entry, executes,
//! and publishes its result; concurrent arrivals with the same token either
//! replay the published result or wait briefly for it. The cache is a
//! correctness *optimization* — any backend failure degrades to plain
//! execution rather than failing the request.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ErrorKind, SchemaError};

const RESULT_PREFIX: &str = "idem:result:";
const LOCK_PREFIX: &str = "idem:lock:";

/// Minimum lifetime of a claim entry. A crashed owner must not block the
/// token forever, but the claim has to outlive any realistic batch.
const MIN_CLAIM_TTL: Duration = Duration::from_secs(60);

/// Options for a cache write.
#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    /// Only write if the key does not exist (SET NX).
    pub if_not_exists: bool,
    /// Expiry applied to the entry (SET PX).
    pub expiry: Duration,
}

/// Failure talking to the cache backend. Never fatal to the caller.
#[derive(Debug)]
pub struct CacheError {
    pub message: String,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cache error: {}", self.message)
    }
}

impl std::error::Error for CacheError {}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError {
            message: err.to_string(),
        }
    }
}

/// Key-value store used for idempotency bookkeeping.
pub trait ResultCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes an entry; returns false when `if_not_exists` was requested and
    /// the key was already present.
    fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<bool, CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// [`ResultCache`] over a Redis deployment, using `SET NX PX` for claims.
pub struct RedisResultCache {
    client: redis::Client,
}

impl RedisResultCache {
    pub fn new(url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

impl ResultCache for RedisResultCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_connection()?;
        Ok(redis::cmd("GET").arg(key).query(&mut conn)?)
    }

    fn set(&self, key: &str, value: &str, options: SetOptions) -> Result<bool, CacheError> {
        let mut conn = self.client.get_connection()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if options.if_not_exists {
            cmd.arg("NX");
        }
        cmd.arg("PX").arg(options.expiry.as_millis() as u64);
        let reply: Option<String> = cmd.query(&mut conn)?;
        Ok(reply.is_some())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_connection()?;
        redis::cmd("DEL").arg(key).query::<()>(&mut conn)?;
        Ok(())
    }
}

/// The replayable outcome of a mutating request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Result of running under idempotency: the outcome plus whether it was
/// replayed from the cache instead of executed.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyOutcome {
    pub result: StoredResult,
    pub replayed: bool,
}

/// Builds the cache key for a token.
///
/// The database URL participates only as a truncated digest, so tokens are
/// scoped per database without credentials ever reaching the cache.
pub fn cache_key(method: &str, path: &str, database_url: &str, token: &str) -> String {
    let db_digest = format!("{:x}", Sha256::digest(database_url.as_bytes()));
    format!("{}:{}:{}:{}", method, path, &db_digest[..16], token)
}

/// Timing knobs for the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct IdempotencySettings {
    /// How long a published result stays replayable.
    pub result_ttl: Duration,
    /// Total time a non-owner waits for the owner's result.
    pub wait_budget: Duration,
    /// Interval between result polls while waiting.
    pub poll_interval: Duration,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(600),
            wait_budget: Duration::from_millis(1500),
            poll_interval: Duration::from_millis(120),
        }
    }
}

/// Runs mutating requests at-most-once per idempotency key.
pub struct IdempotencyCoordinator<'a> {
    cache: &'a dyn ResultCache,
    settings: IdempotencySettings,
}

impl<'a> IdempotencyCoordinator<'a> {
    pub fn new(cache: &'a dyn ResultCache, settings: IdempotencySettings) -> Self {
        Self { cache, settings }
    }

    /// Executes `exec` under the idempotency protocol for `key`.
    ///
    /// * A published result for the key replays verbatim.
    /// * Otherwise the caller races to claim the key; the winner executes and
    ///   publishes, losers poll for the published result within the wait
    ///   budget and fall back to claiming if the winner's entry expires.
    /// * An exhausted wait budget surfaces as
    ///   [`ErrorKind::OperationInProgress`].
    /// * Any cache failure degrades to executing without idempotency.
    pub fn run<F>(&self, key: &str, exec: F) -> Result<IdempotencyOutcome, SchemaError>
    where
        F: FnOnce() -> Result<StoredResult, SchemaError>,
    {
        let result_key = format!("{}{}", RESULT_PREFIX, key);
        let lock_key = format!("{}{}", LOCK_PREFIX, key);
        let mut exec = Some(exec);

        match self.cache.get(&result_key) {
            Ok(Some(raw)) => {
                if let Some(result) = decode_stored(&raw) {
                    log::debug!("idempotent replay for key {}", key);
                    return Ok(IdempotencyOutcome {
                        result,
                        replayed: true,
                    });
                }
            }
            Ok(None) => {}
            Err(err) => return degrade(exec.take(), &err),
        }

        let claim_ttl = self.settings.result_ttl.max(MIN_CLAIM_TTL);
        let deadline = Instant::now() + self.settings.wait_budget;

        loop {
            let claim = self.cache.set(
                &lock_key,
                "1",
                SetOptions {
                    if_not_exists: true,
                    expiry: claim_ttl,
                },
            );
            match claim {
                Ok(true) => {
                    let Some(exec) = exec.take() else {
                        return Err(SchemaError::internal("idempotent execution re-entered"));
                    };
                    return self.execute_as_owner(&result_key, &lock_key, exec);
                }
                Ok(false) => {}
                Err(err) => return degrade(exec.take(), &err),
            }

            // another request owns the claim: wait for its result
            loop {
                if Instant::now() >= deadline {
                    return Err(SchemaError::new(
                        ErrorKind::OperationInProgress,
                        "A request with this idempotency token is already in progress",
                    )
                    .with_hint("Retry with the same token once the original request completes."));
                }
                thread::sleep(self.settings.poll_interval);

                match self.cache.get(&result_key) {
                    Ok(Some(raw)) => {
                        if let Some(result) = decode_stored(&raw) {
                            return Ok(IdempotencyOutcome {
                                result,
                                replayed: true,
                            });
                        }
                    }
                    Ok(None) => {}
                    Err(err) => return degrade(exec.take(), &err),
                }
                match self.cache.get(&lock_key) {
                    Ok(Some(_)) => {}
                    // claim expired without a result: race to take over
                    Ok(None) => break,
                    Err(err) => return degrade(exec.take(), &err),
                }
            }
        }
    }

    fn execute_as_owner<F>(
        &self,
        result_key: &str,
        lock_key: &str,
        exec: F,
    ) -> Result<IdempotencyOutcome, SchemaError>
    where
        F: FnOnce() -> Result<StoredResult, SchemaError>,
    {
        let outcome = exec();

        match &outcome {
            Ok(result) => {
                if let Ok(raw) = serde_json::to_string(result) {
                    let write = self.cache.set(
                        result_key,
                        &raw,
                        SetOptions {
                            if_not_exists: false,
                            expiry: self.settings.result_ttl,
                        },
                    );
                    if let Err(err) = write {
                        log::warn!("failed to publish idempotent result: {}", err);
                    }
                }
            }
            // failures are not cached: the caller may retry with the token
            Err(err) => log::debug!("idempotent execution failed, claim released: {}", err),
        }

        if let Err(err) = self.cache.delete(lock_key) {
            log::warn!("failed to release idempotency claim: {}", err);
        }

        outcome.map(|result| IdempotencyOutcome {
            result,
            replayed: false,
        })
    }
}

fn decode_stored(raw: &str) -> Option<StoredResult> {
    match serde_json::from_str(raw) {
        Ok(result) => Some(result),
        Err(err) => {
            log::warn!("discarding undecodable idempotency entry: {}", err);
            None
        }
    }
}

fn degrade<F>(exec: Option<F>, err: &CacheError) -> Result<IdempotencyOutcome, SchemaError>
where
    F: FnOnce() -> Result<StoredResult, SchemaError>,
{
    log::warn!("idempotency cache unavailable, executing without it: {}", err);
    let Some(exec) = exec else {
        return Err(SchemaError::internal("idempotent execution re-entered"));
    };
    Ok(IdempotencyOutcome {
        result: exec()?,
        replayed: false,
    })
}

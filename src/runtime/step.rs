//! Durable steps
//!
//! A step is an idempotency key (`run_id`, `step_name`) plus a unit of work.
//! The first successful result for a key is checkpointed in a `StepStore`; any
//! later attempt with the same key (a replayed run) returns the checkpoint
//! instead of repeating the side effect. Retriable failures are re-attempted
//! with exponential back-off, fatal failures are returned at once and never
//! checkpointed.
//!
//! A run id is bound to the workflow and user it was first used for, so a
//! replay can only ever see checkpoints of its own workflow.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqlitePool, Row};
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use tokio::sync::RwLock;

/// Idempotency key of a step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepKey {
    pub run_id: String,
    pub step_name: String,
}

impl StepKey {
    pub fn new(run_id: impl Into<String>, step_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            step_name: step_name.into(),
        }
    }
}

/// The workflow and user a run id belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOwner {
    pub run_id: String,
    pub workflow_id: String,
    pub user_id: String,
}

impl RunOwner {
    pub fn new(run_id: impl Into<String>, workflow_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            workflow_id: workflow_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Checkpoint storage for completed steps
#[async_trait]
pub trait StepStore: Send + Sync + std::fmt::Debug {
    async fn load(&self, key: &StepKey) -> EngineResult<Option<Value>>;
    async fn save(&self, key: &StepKey, output: &Value) -> EngineResult<()>;

    /// Bind `owner.run_id` to `owner` unless it is already bound; returns the
    /// owner the run id is bound to after the call
    async fn claim_run(&self, owner: &RunOwner) -> EngineResult<RunOwner>;
}

/// Bind a run id to its workflow and user, rejecting ids owned by anyone else
pub async fn claim_run(store: &dyn StepStore, owner: &RunOwner) -> EngineResult<()> {
    let holder = store.claim_run(owner).await?;
    if holder != *owner {
        tracing::warn!(
            "🚫 Run id {} is bound to another workflow, refusing replay of {}",
            owner.run_id,
            owner.workflow_id
        );
        return Err(EngineError::RunConflict(owner.run_id.clone()));
    }
    Ok(())
}

/// Checkpoints held in process memory; lost on restart
#[derive(Debug, Default)]
pub struct MemoryStepStore {
    completed: RwLock<HashMap<StepKey, Value>>,
    runs: RwLock<HashMap<String, RunOwner>>,
}

impl MemoryStepStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.completed.read().await.len()
    }
}

#[async_trait]
impl StepStore for MemoryStepStore {
    async fn load(&self, key: &StepKey) -> EngineResult<Option<Value>> {
        Ok(self.completed.read().await.get(key).cloned())
    }

    async fn save(&self, key: &StepKey, output: &Value) -> EngineResult<()> {
        self.completed.write().await.insert(key.clone(), output.clone());
        Ok(())
    }

    async fn claim_run(&self, owner: &RunOwner) -> EngineResult<RunOwner> {
        let mut runs = self.runs.write().await;
        Ok(runs
            .entry(owner.run_id.clone())
            .or_insert_with(|| owner.clone())
            .clone())
    }
}

/// Checkpoints persisted in SQLite; survive process restarts
#[derive(Debug, Clone)]
pub struct SqliteStepStore {
    pool: SqlitePool,
}

impl SqliteStepStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the run and checkpoint tables. Safe to call repeatedly.
    pub async fn init_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_runs (
                run_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                started_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS step_checkpoints (
                run_id TEXT NOT NULL,
                step_name TEXT NOT NULL,
                output JSON NOT NULL,
                completed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (run_id, step_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StepStore for SqliteStepStore {
    async fn load(&self, key: &StepKey) -> EngineResult<Option<Value>> {
        let row = sqlx::query("SELECT output FROM step_checkpoints WHERE run_id = ? AND step_name = ?")
            .bind(&key.run_id)
            .bind(&key.step_name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let output_json: String = row.get("output");
                Ok(Some(serde_json::from_str(&output_json)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, key: &StepKey, output: &Value) -> EngineResult<()> {
        // First completion wins; a checkpoint is never rewritten.
        sqlx::query(
            r#"
            INSERT INTO step_checkpoints (run_id, step_name, output)
            VALUES (?, ?, ?)
            ON CONFLICT(run_id, step_name) DO NOTHING
            "#,
        )
        .bind(&key.run_id)
        .bind(&key.step_name)
        .bind(serde_json::to_string(output)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_run(&self, owner: &RunOwner) -> EngineResult<RunOwner> {
        sqlx::query(
            r#"
            INSERT INTO step_runs (run_id, workflow_id, user_id)
            VALUES (?, ?, ?)
            ON CONFLICT(run_id) DO NOTHING
            "#,
        )
        .bind(&owner.run_id)
        .bind(&owner.workflow_id)
        .bind(&owner.user_id)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT workflow_id, user_id FROM step_runs WHERE run_id = ?")
            .bind(&owner.run_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(RunOwner::new(
            owner.run_id.as_str(),
            row.get::<String, _>("workflow_id"),
            row.get::<String, _>("user_id"),
        ))
    }
}

/// How often and how patiently a retriable step is re-attempted
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Runs steps for a single run id
///
/// Cloning is cheap; every clone shares the same store.
#[derive(Debug, Clone)]
pub struct StepRunner {
    run_id: String,
    store: Arc<dyn StepStore>,
    retry: RetryPolicy,
}

impl StepRunner {
    pub fn new(run_id: impl Into<String>, store: Arc<dyn StepStore>, retry: RetryPolicy) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            retry,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run `work` at most once to completion for this run
    ///
    /// `work` may be invoked several times when it fails with a retriable
    /// error, so it has to be safe to repeat until it succeeds.
    pub async fn run<T, F, Fut>(&self, step_name: &str, work: F) -> EngineResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let key = StepKey::new(self.run_id.as_str(), step_name);

        if let Some(checkpoint) = self.store.load(&key).await? {
            tracing::debug!("♻️ Step '{}' already completed in run {}, replaying checkpoint", step_name, self.run_id);
            return Ok(serde_json::from_value(checkpoint)?);
        }

        let mut attempt = 1;
        loop {
            match work().await {
                Ok(output) => {
                    self.store.save(&key, &serde_json::to_value(&output)?).await?;
                    tracing::debug!("✅ Step '{}' completed on attempt {}", step_name, attempt);
                    return Ok(output);
                }
                Err(error) if error.is_retriable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "🔁 Step '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                        step_name,
                        attempt,
                        self.retry.max_attempts,
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_retriable() {
                        tracing::error!("❌ Step '{}' exhausted {} attempts: {}", step_name, attempt, error);
                        return Err(EngineError::NonRetriable(format!(
                            "step '{}' failed after {} attempts: {}",
                            step_name, attempt, error
                        )));
                    }
                    return Err(error);
                }
            }
        }
    }
}

//! Workflow snapshot stores
//!
//! The engine only ever reads workflows, through `WorkflowStore`. Ownership is
//! enforced here: a workflow that exists but belongs to someone else is
//! reported exactly like one that does not exist.

use crate::error::{EngineError, EngineResult};
use crate::workflow::types::Workflow;
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Read contract the execution driver depends on
#[async_trait]
pub trait WorkflowStore: Send + Sync + std::fmt::Debug {
    /// Load the snapshot for `workflow_id` if `user_id` owns it
    async fn get_workflow(&self, workflow_id: &str, user_id: &str) -> EngineResult<Workflow>;
}

/// SQLite-backed workflow storage
///
/// Workflows are stored as a JSON definition with indexed id and owner columns.
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the workflows table. Safe to call repeatedly.
    pub async fn init_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                definition JSON NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_workflows_user
            ON workflows(user_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a workflow definition
    ///
    /// Writes normally come from the editor's CRUD layer; this is what it (and
    /// the tests) use to put snapshots where the engine can read them.
    pub async fn save_workflow(&self, workflow: &Workflow) -> EngineResult<()> {
        let definition_json = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, user_id, definition, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.user_id)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        tracing::debug!("💾 Saved workflow '{}' for user '{}'", workflow.id, workflow.user_id);
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for WorkflowStorage {
    async fn get_workflow(&self, workflow_id: &str, user_id: &str) -> EngineResult<Workflow> {
        let row = sqlx::query("SELECT definition FROM workflows WHERE id = ? AND user_id = ?")
            .bind(workflow_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let definition_json: String = row.get("definition");
                Ok(serde_json::from_str(&definition_json)?)
            }
            None => Err(EngineError::WorkflowNotFound(workflow_id.to_string())),
        }
    }
}

/// In-process store for embedding the engine without a database
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, workflow: Workflow) {
        self.workflows.write().await.insert(workflow.id.clone(), workflow);
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn get_workflow(&self, workflow_id: &str, user_id: &str) -> EngineResult<Workflow> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .filter(|workflow| workflow.user_id == user_id)
            .cloned()
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))
    }
}

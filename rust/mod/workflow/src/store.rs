use std::sync::Arc;

use depot_core::{page_limit, to_rfc3339, ListResult, ServiceError};
use depot_sql::{Row, SQLStore, Statement, Value};
use serde::de::DeserializeOwned;

use crate::model::{ParentRef, TaskListQuery, TaskStatus, Workflow, WorkflowTask};

/// SQL schema for workflows and their tasks.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS workflows (
    id           TEXT PRIMARY KEY,
    data         TEXT NOT NULL,
    parent_kind  TEXT NOT NULL,
    parent_id    TEXT NOT NULL,
    create_at    TEXT NOT NULL,
    UNIQUE (parent_kind, parent_id)
);
CREATE TABLE IF NOT EXISTS workflow_tasks (
    id           TEXT PRIMARY KEY,
    data         TEXT NOT NULL,
    workflow_id  TEXT NOT NULL REFERENCES workflows(id),
    parent_kind  TEXT NOT NULL,
    seq          INTEGER NOT NULL,
    status       TEXT NOT NULL,
    assigned_to  TEXT,
    create_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_wft_workflow ON workflow_tasks(workflow_id, seq);
CREATE INDEX IF NOT EXISTS idx_wft_status ON workflow_tasks(status);
CREATE INDEX IF NOT EXISTS idx_wft_assigned ON workflow_tasks(assigned_to);
";

/// Persistent storage for workflows, backed by SQLStore (SQLite).
pub struct WorkflowStore {
    db: Arc<dyn SQLStore>,
}

impl WorkflowStore {
    /// Create a new WorkflowStore and initialise the schema.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("workflow schema init: {e}")))?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Insert a workflow and all of its tasks in one transaction.
    ///
    /// Fails with `Conflict` if the parent already has a workflow.
    pub fn create_workflow(
        &self,
        workflow: &Workflow,
        tasks: &[WorkflowTask],
    ) -> Result<(), ServiceError> {
        let mut stmts = Vec::with_capacity(tasks.len() + 1);
        stmts.push(Statement::new(
            "INSERT INTO workflows (id, data, parent_kind, parent_id, create_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            vec![
                Value::Text(workflow.id.clone()),
                Value::Text(to_json(workflow)?),
                Value::Text(workflow.parent.kind.as_str().to_string()),
                Value::Text(workflow.parent.id.clone()),
                Value::Text(to_rfc3339(&workflow.create_at)),
            ],
        ));
        for task in tasks {
            stmts.push(Statement::new(
                "INSERT INTO workflow_tasks \
                 (id, data, workflow_id, parent_kind, seq, status, assigned_to, create_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                vec![
                    Value::Text(task.id.clone()),
                    Value::Text(to_json(task)?),
                    Value::Text(task.workflow_id.clone()),
                    Value::Text(task.parent.kind.as_str().to_string()),
                    Value::Integer(task.sequence as i64),
                    Value::Text(task.status.as_str().to_string()),
                    Value::opt_text(task.assigned_to.as_deref()),
                    Value::Text(to_rfc3339(&task.create_at)),
                ],
            ));
        }

        self.db.transaction(&stmts).map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::Conflict(format!("{} already has a workflow", workflow.parent))
            } else {
                ServiceError::Storage(e.to_string())
            }
        })?;
        Ok(())
    }

    pub fn get_workflow(&self, id: &str) -> Result<Option<Workflow>, ServiceError> {
        self.query_one(
            "SELECT data FROM workflows WHERE id = ?1",
            &[Value::Text(id.to_string())],
        )
    }

    pub fn find_by_parent(&self, parent: &ParentRef) -> Result<Option<Workflow>, ServiceError> {
        self.query_one(
            "SELECT data FROM workflows WHERE parent_kind = ?1 AND parent_id = ?2",
            &[
                Value::Text(parent.kind.as_str().to_string()),
                Value::Text(parent.id.clone()),
            ],
        )
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn get_task(&self, id: &str) -> Result<Option<WorkflowTask>, ServiceError> {
        self.query_one(
            "SELECT data FROM workflow_tasks WHERE id = ?1",
            &[Value::Text(id.to_string())],
        )
    }

    /// All tasks of a workflow, in sequence order.
    pub fn tasks_for_workflow(&self, workflow_id: &str) -> Result<Vec<WorkflowTask>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM workflow_tasks WHERE workflow_id = ?1 \
                 ORDER BY seq ASC, create_at ASC, id ASC",
                &[Value::Text(workflow_id.to_string())],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(row_to_record).collect()
    }

    /// Write `task` only if its stored status is still `expected`.
    ///
    /// Returns `false` when someone else changed the task first.
    pub fn update_task_if_status(
        &self,
        task: &WorkflowTask,
        expected: TaskStatus,
    ) -> Result<bool, ServiceError> {
        let affected = self
            .db
            .exec(
                "UPDATE workflow_tasks SET data = ?1, status = ?2, assigned_to = ?3 \
                 WHERE id = ?4 AND status = ?5",
                &[
                    Value::Text(to_json(task)?),
                    Value::Text(task.status.as_str().to_string()),
                    Value::opt_text(task.assigned_to.as_deref()),
                    Value::Text(task.id.clone()),
                    Value::Text(expected.as_str().to_string()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(affected > 0)
    }

    /// List tasks across workflows (e.g. a technician's queue).
    pub fn list_tasks(&self, query: &TaskListQuery) -> Result<ListResult<WorkflowTask>, ServiceError> {
        let limit = page_limit(query.limit);
        let offset = query.offset.unwrap_or(0);

        let mut where_clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let mut idx = 1;

        if let Some(status) = query.status {
            where_clauses.push(format!("status = ?{idx}"));
            params.push(Value::Text(status.as_str().to_string()));
            idx += 1;
        }
        if let Some(ref who) = query.assigned_to {
            where_clauses.push(format!("assigned_to = ?{idx}"));
            params.push(Value::Text(who.clone()));
            idx += 1;
        }
        if let Some(kind) = query.parent_kind {
            where_clauses.push(format!("parent_kind = ?{idx}"));
            params.push(Value::Text(kind.as_str().to_string()));
            idx += 1;
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) as cnt FROM workflow_tasks {where_sql}");
        let count_rows = self
            .db
            .query(&count_sql, &params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let total = count_rows
            .first()
            .and_then(|r| r.get_i64("cnt"))
            .unwrap_or(0) as usize;

        let select_sql = format!(
            "SELECT data FROM workflow_tasks {where_sql} \
             ORDER BY create_at ASC, seq ASC LIMIT ?{idx} OFFSET ?{}",
            idx + 1
        );
        let mut select_params = params;
        select_params.push(Value::Integer(limit as i64));
        select_params.push(Value::Integer(offset as i64));

        let rows = self
            .db
            .query(&select_sql, &select_params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let items = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResult { items, total })
    }

    fn query_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<T>, ServiceError> {
        let rows = self
            .db
            .query(sql, params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.first().map(row_to_record).transpose()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Internal(e.to_string()))
}

/// Deserialize a record from a row's `data` JSON column.
fn row_to_record<T: DeserializeOwned>(row: &Row) -> Result<T, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad record json: {e}")))
}

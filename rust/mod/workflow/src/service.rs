use std::collections::HashSet;
use std::sync::Arc;

use depot_core::{new_id, now, AuditEvent, AuditSink, ListResult, ServiceError};
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::model::{
    ApplyWorkflowRequest, ParentRef, TaskListQuery, TaskOutcome, TaskStatus, TaskWarning, Workflow,
    WorkflowTask, WorkflowView,
};
use crate::sequencer::{Sequencer, Transition};
use crate::store::WorkflowStore;

/// Task operations for all parent entities.
///
/// Each call loads the parent's task list, asks the [`Sequencer`] (built
/// from the workflow's mode) for a decision, and persists it with a
/// status-guarded write. The returned snapshot is authoritative.
pub struct WorkflowService {
    store: WorkflowStore,
    audit: Arc<dyn AuditSink>,
}

impl WorkflowService {
    pub fn new(store: WorkflowStore, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    // =======================================================================
    // Workflows
    // =======================================================================

    /// Apply a template to a parent entity, bulk-creating its tasks.
    pub fn apply(&self, req: ApplyWorkflowRequest) -> Result<WorkflowView, TaskError> {
        let parent_id = req.parent_id.trim();
        if parent_id.is_empty() {
            return Err(ServiceError::Validation("parentId is required".into()).into());
        }
        if req.template.trim().is_empty() {
            return Err(ServiceError::Validation("template is required".into()).into());
        }
        if req.steps.is_empty() {
            return Err(ServiceError::Validation("a workflow needs at least one step".into()).into());
        }

        let created = now();
        let workflow = Workflow {
            id: new_id(),
            parent: ParentRef {
                kind: req.parent_kind,
                id: parent_id.to_string(),
            },
            template: req.template.trim().to_string(),
            mode: req.mode,
            created_by: req.created_by,
            create_at: created,
        };

        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(req.steps.len());
        for (i, step) in req.steps.into_iter().enumerate() {
            let name = step.name.trim();
            if name.is_empty() {
                return Err(
                    ServiceError::Validation(format!("step {} has no name", i + 1)).into(),
                );
            }
            let sequence = step.sequence.unwrap_or(i as i32 + 1);
            if !seen.insert(sequence) {
                return Err(ServiceError::Validation(format!(
                    "duplicate sequence {sequence} in template"
                ))
                .into());
            }
            tasks.push(WorkflowTask {
                id: new_id(),
                workflow_id: workflow.id.clone(),
                parent: workflow.parent.clone(),
                name: name.to_string(),
                sequence,
                required: step.required,
                status: TaskStatus::Pending,
                assigned_to: step.assigned_to.filter(|a| !a.trim().is_empty()),
                started_at: None,
                completed_at: None,
                blocked_reason: None,
                completion_notes: None,
                skip_reason: None,
                create_at: created,
                update_at: created,
            });
        }
        tasks.sort_by_key(|t| t.sequence);

        self.store.create_workflow(&workflow, &tasks)?;
        info!(
            workflow = %workflow.id,
            parent = %workflow.parent,
            mode = workflow.mode.as_str(),
            tasks = tasks.len(),
            "workflow applied"
        );
        self.audit.record(
            AuditEvent::new("workflow", "workflow", &workflow.id, "apply")
                .with_detail(format!("{} ({} tasks)", workflow.parent, tasks.len())),
        );

        Ok(WorkflowView { workflow, tasks })
    }

    /// The workflow attached to `parent`, with tasks in sequence order.
    pub fn get_for_parent(&self, parent: &ParentRef) -> Result<WorkflowView, TaskError> {
        let workflow = self
            .store
            .find_by_parent(parent)?
            .ok_or_else(|| ServiceError::NotFound(format!("no workflow for {parent}")))?;
        let tasks = self.store.tasks_for_workflow(&workflow.id)?;
        Ok(WorkflowView { workflow, tasks })
    }

    // =======================================================================
    // Tasks: reads
    // =======================================================================

    pub fn get_task(&self, task_id: &str) -> Result<WorkflowTask, TaskError> {
        self.store
            .get_task(task_id)?
            .ok_or_else(|| TaskError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    pub fn list_tasks(&self, query: &TaskListQuery) -> Result<ListResult<WorkflowTask>, TaskError> {
        Ok(self.store.list_tasks(query)?)
    }

    // =======================================================================
    // Tasks: transitions
    // =======================================================================

    pub fn start(&self, task_id: &str) -> Result<TaskOutcome, TaskError> {
        self.transition(task_id, "start", |seq, tasks| seq.start(tasks, task_id, now()))
    }

    pub fn complete(&self, task_id: &str, notes: Option<&str>) -> Result<TaskOutcome, TaskError> {
        self.transition(task_id, "complete", |seq, tasks| {
            seq.complete(tasks, task_id, notes, now())
        })
    }

    pub fn block(&self, task_id: &str, reason: &str) -> Result<TaskOutcome, TaskError> {
        self.transition(task_id, "block", |seq, tasks| {
            seq.block(tasks, task_id, reason, now())
        })
    }

    pub fn unblock(&self, task_id: &str) -> Result<TaskOutcome, TaskError> {
        self.transition(task_id, "unblock", |seq, tasks| seq.unblock(tasks, task_id, now()))
    }

    pub fn skip(&self, task_id: &str, reason: Option<&str>) -> Result<TaskOutcome, TaskError> {
        self.transition(task_id, "skip", |seq, tasks| {
            seq.skip(tasks, task_id, reason, now())
        })
    }

    pub fn assign(&self, task_id: &str, assignee: Option<&str>) -> Result<TaskOutcome, TaskError> {
        self.transition(task_id, "assign", |seq, tasks| {
            seq.assign(tasks, task_id, assignee, now())
        })
    }

    /// Load → decide → guarded write → audit.
    fn transition<F>(&self, task_id: &str, action: &str, decide: F) -> Result<TaskOutcome, TaskError>
    where
        F: FnOnce(&Sequencer, &[WorkflowTask]) -> Result<Transition, TaskError>,
    {
        let task = self.get_task(task_id)?;
        let workflow = self.store.get_workflow(&task.workflow_id)?.ok_or_else(|| {
            ServiceError::Internal(format!(
                "task {task_id} references missing workflow {}",
                task.workflow_id
            ))
        })?;
        let siblings = self.store.tasks_for_workflow(&workflow.id)?;
        let sequencer = Sequencer::new(workflow.mode);

        let transition = decide(&sequencer, &siblings).inspect_err(|e| {
            debug!(task = task_id, action, error = %e, "task operation rejected");
        })?;

        if !transition.changed {
            return Ok(TaskOutcome {
                task: transition.task,
                warnings: transition.warnings,
            });
        }

        if !self
            .store
            .update_task_if_status(&transition.task, transition.previous)?
        {
            // Lost a race: report against what is stored now.
            let current = self.get_task(task_id)?;
            warn!(task = task_id, action, status = %current.status, "concurrent task update");
            return Err(ServiceError::InvalidState(format!(
                "task {task_id} changed concurrently (now {})",
                current.status
            ))
            .into());
        }

        let updated = transition.task;
        info!(
            task = %updated.id,
            parent = %updated.parent,
            action,
            from = %transition.previous,
            to = %updated.status,
            "task updated"
        );

        let mut event = AuditEvent::new("workflow", "task", &updated.id, action);
        for w in &transition.warnings {
            match w {
                TaskWarning::OutOfSequence { predecessor } => {
                    // Out-of-order completion is allowed in flexible mode
                    // but always leaves an audit trail.
                    warn!(
                        task = %updated.id,
                        predecessor = %predecessor,
                        "task completed out of sequence"
                    );
                    event = event.with_detail(format!("out of sequence; open predecessor {predecessor}"));
                }
            }
        }
        self.audit.record(event);

        Ok(TaskOutcome {
            task: updated,
            warnings: transition.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParentKind, SequencingMode, StepDefinition};
    use depot_core::MemoryAudit;
    use depot_sql::SqliteStore;

    fn service() -> (WorkflowService, Arc<MemoryAudit>) {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        let audit = Arc::new(MemoryAudit::new());
        let svc = WorkflowService::new(WorkflowStore::new(db).unwrap(), audit.clone());
        (svc, audit)
    }

    fn step(name: &str) -> StepDefinition {
        StepDefinition {
            name: name.into(),
            sequence: None,
            required: true,
            assigned_to: None,
        }
    }

    fn apply(svc: &WorkflowService, parent_id: &str, mode: SequencingMode) -> WorkflowView {
        svc.apply(ApplyWorkflowRequest {
            parent_kind: ParentKind::Ticket,
            parent_id: parent_id.into(),
            template: "laptop-repair".into(),
            mode,
            steps: vec![step("Diagnose"), step("Repair"), step("QA")],
            created_by: Some("admin".into()),
        })
        .unwrap()
    }

    #[test]
    fn apply_creates_tasks_in_order() {
        let (svc, audit) = service();
        let view = apply(&svc, "T-100", SequencingMode::Strict);
        let seqs: Vec<_> = view.tasks.iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(view.tasks.iter().all(|t| t.status == TaskStatus::Pending));

        let fetched = svc
            .get_for_parent(&ParentRef {
                kind: ParentKind::Ticket,
                id: "T-100".into(),
            })
            .unwrap();
        assert_eq!(fetched, view);
        assert_eq!(audit.events()[0].action, "apply");
    }

    #[test]
    fn apply_validates_template() {
        let (svc, _) = service();
        let err = svc
            .apply(ApplyWorkflowRequest {
                parent_kind: ParentKind::StockDocument,
                parent_id: "SD-1".into(),
                template: "count".into(),
                mode: SequencingMode::Strict,
                steps: vec![
                    StepDefinition {
                        sequence: Some(1),
                        ..step("a")
                    },
                    StepDefinition {
                        sequence: Some(1),
                        ..step("b")
                    },
                ],
                created_by: None,
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILED");

        let err = svc
            .apply(ApplyWorkflowRequest {
                parent_kind: ParentKind::StockDocument,
                parent_id: "SD-1".into(),
                template: "count".into(),
                mode: SequencingMode::Strict,
                steps: vec![],
                created_by: None,
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILED");
    }

    #[test]
    fn apply_twice_conflicts() {
        let (svc, _) = service();
        apply(&svc, "T-1", SequencingMode::Strict);
        let err = svc
            .apply(ApplyWorkflowRequest {
                parent_kind: ParentKind::Ticket,
                parent_id: "T-1".into(),
                template: "other".into(),
                mode: SequencingMode::Flexible,
                steps: vec![step("x")],
                created_by: None,
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "ALREADY_EXISTS");
    }

    #[test]
    fn strict_scenario_end_to_end() {
        let (svc, _) = service();
        let view = apply(&svc, "T-2", SequencingMode::Strict);
        let (t1, t2) = (&view.tasks[0].id, &view.tasks[1].id);

        let err = svc.start(t2).unwrap_err();
        match err {
            TaskError::SequenceViolation { blocking, .. } => assert_eq!(blocking.sequence, 1),
            other => panic!("unexpected {other:?}"),
        }

        svc.start(t1).unwrap();
        let done = svc.complete(t1, Some("fan noise")).unwrap();
        assert_eq!(done.task.status, TaskStatus::Completed);
        assert!(done.task.completed_at.unwrap() >= done.task.started_at.unwrap());

        let started = svc.start(t2).unwrap();
        assert_eq!(started.task.status, TaskStatus::InProgress);
        assert_eq!(svc.get_task(t2).unwrap(), started.task);
    }

    #[test]
    fn flexible_completion_warns_and_audits() {
        let (svc, audit) = service();
        let view = apply(&svc, "T-3", SequencingMode::Flexible);
        let t3 = &view.tasks[2].id;

        svc.start(t3).unwrap();
        let out = svc.complete(t3, None).unwrap();
        assert_eq!(out.task.status, TaskStatus::Completed);
        assert_eq!(out.warnings.len(), 1);

        let last = audit.events().pop().unwrap();
        assert_eq!(last.action, "complete");
        assert!(last.detail.unwrap().contains("out of sequence"));
    }

    #[test]
    fn block_unblock_cycle() {
        let (svc, _) = service();
        let view = apply(&svc, "T-4", SequencingMode::Strict);
        let t1 = &view.tasks[0].id;
        svc.start(t1).unwrap();

        let err = svc.block(t1, "").unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILED");

        let blocked = svc.block(t1, "awaiting parts").unwrap();
        assert_eq!(blocked.task.status, TaskStatus::Blocked);

        let resumed = svc.unblock(t1).unwrap();
        assert_eq!(resumed.task.status, TaskStatus::InProgress);
        assert_eq!(resumed.task.blocked_reason, None);
    }

    #[test]
    fn repeated_start_writes_nothing() {
        let (svc, audit) = service();
        let view = apply(&svc, "T-5", SequencingMode::Strict);
        let t1 = &view.tasks[0].id;
        let first = svc.start(t1).unwrap();
        let before = audit.events().len();
        let second = svc.start(t1).unwrap();
        assert_eq!(first.task, second.task);
        assert_eq!(audit.events().len(), before);
    }

    #[test]
    fn unknown_task() {
        let (svc, _) = service();
        assert_eq!(
            svc.start("missing").unwrap_err(),
            TaskError::NotFound {
                task_id: "missing".into()
            }
        );
    }

    #[test]
    fn assign_and_queue() {
        let (svc, _) = service();
        let view = apply(&svc, "T-6", SequencingMode::Strict);
        svc.assign(&view.tasks[1].id, Some("tech-9")).unwrap();

        let queue = svc
            .list_tasks(&TaskListQuery {
                assigned_to: Some("tech-9".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(queue.total, 1);
        assert_eq!(queue.items[0].id, view.tasks[1].id);
    }
}

//! Task sequencing rules.
//!
//! Pure functions over a parent's full task list. Nothing here touches
//! storage: the service loads the siblings, asks the [`Sequencer`] for a
//! [`Transition`], then persists it with a status-guarded write.

use chrono::{DateTime, Utc};

use crate::error::TaskError;
use crate::model::{SequencingMode, TaskAction, TaskStatus, TaskWarning, WorkflowTask};

/// The outcome of a legal operation, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Updated task snapshot.
    pub task: WorkflowTask,
    /// Status the task had when the decision was made (CAS guard).
    pub previous: TaskStatus,
    /// `false` for idempotent no-ops; nothing needs writing.
    pub changed: bool,
    pub warnings: Vec<TaskWarning>,
}

/// Evaluates task operations under one sequencing policy.
#[derive(Debug, Clone, Copy)]
pub struct Sequencer {
    mode: SequencingMode,
}

impl Sequencer {
    pub fn new(mode: SequencingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SequencingMode {
        self.mode
    }

    /// The earliest non-terminal task ranked strictly before `target`.
    ///
    /// Tasks sharing a sequence value form one rank, so a sibling with the
    /// same sequence never blocks. Ties inside the blocking rank resolve
    /// by name then id, to keep the reported predecessor stable.
    pub fn open_predecessor<'a>(
        siblings: &'a [WorkflowTask],
        target: &WorkflowTask,
    ) -> Option<&'a WorkflowTask> {
        siblings
            .iter()
            .filter(|t| t.id != target.id)
            .filter(|t| t.sequence < target.sequence && !t.status.is_terminal())
            .min_by(|a, b| {
                a.sequence
                    .cmp(&b.sequence)
                    .then_with(|| a.name.cmp(&b.name))
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    /// `pending | blocked → in_progress`. Re-starting an `in_progress`
    /// task is a no-op.
    pub fn start(
        &self,
        siblings: &[WorkflowTask],
        task_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, TaskError> {
        let task = find(siblings, task_id)?;
        check_allowed(task, TaskAction::Start)?;

        if task.status == TaskStatus::InProgress {
            return Ok(unchanged(task));
        }

        if self.mode == SequencingMode::Strict {
            if let Some(blocking) = Self::open_predecessor(siblings, task) {
                return Err(TaskError::SequenceViolation {
                    task_id: task.id.clone(),
                    blocking: blocking.task_ref(),
                });
            }
        }

        let mut next = task.clone();
        next.status = TaskStatus::InProgress;
        next.blocked_reason = None;
        if next.started_at.is_none() {
            next.started_at = Some(at);
        }
        next.update_at = at;
        Ok(changed(task.status, next, Vec::new()))
    }

    /// `in_progress → completed`. In flexible mode an open predecessor
    /// produces an [`TaskWarning::OutOfSequence`] instead of an error.
    pub fn complete(
        &self,
        siblings: &[WorkflowTask],
        task_id: &str,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Transition, TaskError> {
        let task = find(siblings, task_id)?;
        check_allowed(task, TaskAction::Complete)?;

        let mut warnings = Vec::new();
        if self.mode == SequencingMode::Flexible {
            if let Some(open) = Self::open_predecessor(siblings, task) {
                warnings.push(TaskWarning::OutOfSequence {
                    predecessor: open.task_ref(),
                });
            }
        }

        let mut next = task.clone();
        let started = *next.started_at.get_or_insert(at);
        next.status = TaskStatus::Completed;
        next.completed_at = Some(at.max(started));
        next.completion_notes = non_empty(notes);
        next.update_at = at;
        Ok(changed(task.status, next, warnings))
    }

    /// `in_progress → blocked`. A reason is mandatory.
    pub fn block(
        &self,
        siblings: &[WorkflowTask],
        task_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, TaskError> {
        let task = find(siblings, task_id)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TaskError::validation(task_id, "a blocked reason is required"));
        }
        check_allowed(task, TaskAction::Block)?;

        let mut next = task.clone();
        next.status = TaskStatus::Blocked;
        next.blocked_reason = Some(reason.to_string());
        next.update_at = at;
        Ok(changed(task.status, next, Vec::new()))
    }

    /// `blocked → in_progress`, clearing the reason.
    pub fn unblock(
        &self,
        siblings: &[WorkflowTask],
        task_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, TaskError> {
        let task = find(siblings, task_id)?;
        check_allowed(task, TaskAction::Unblock)?;

        let mut next = task.clone();
        next.status = TaskStatus::InProgress;
        next.blocked_reason = None;
        next.update_at = at;
        Ok(changed(task.status, next, Vec::new()))
    }

    /// `pending → skipped`, only for optional tasks.
    pub fn skip(
        &self,
        siblings: &[WorkflowTask],
        task_id: &str,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Transition, TaskError> {
        let task = find(siblings, task_id)?;
        check_allowed(task, TaskAction::Skip)?;
        if task.required {
            return Err(TaskError::validation(task_id, "required tasks cannot be skipped"));
        }

        let mut next = task.clone();
        next.status = TaskStatus::Skipped;
        next.skip_reason = non_empty(reason);
        next.update_at = at;
        Ok(changed(task.status, next, Vec::new()))
    }

    /// Set or clear the assignee of a non-terminal task. Status is untouched.
    pub fn assign(
        &self,
        siblings: &[WorkflowTask],
        task_id: &str,
        assignee: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Transition, TaskError> {
        let task = find(siblings, task_id)?;
        check_allowed(task, TaskAction::Assign)?;

        let assignee = non_empty(assignee);
        if assignee == task.assigned_to {
            return Ok(unchanged(task));
        }

        let mut next = task.clone();
        next.assigned_to = assignee;
        next.update_at = at;
        Ok(changed(task.status, next, Vec::new()))
    }
}

fn find<'a>(siblings: &'a [WorkflowTask], task_id: &str) -> Result<&'a WorkflowTask, TaskError> {
    siblings
        .iter()
        .find(|t| t.id == task_id)
        .ok_or_else(|| TaskError::NotFound {
            task_id: task_id.to_string(),
        })
}

fn check_allowed(task: &WorkflowTask, action: TaskAction) -> Result<(), TaskError> {
    if action.allowed_from().contains(&task.status) {
        Ok(())
    } else {
        Err(TaskError::InvalidState {
            task_id: task.id.clone(),
            status: task.status,
            action,
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

fn unchanged(task: &WorkflowTask) -> Transition {
    Transition {
        task: task.clone(),
        previous: task.status,
        changed: false,
        warnings: Vec::new(),
    }
}

fn changed(previous: TaskStatus, task: WorkflowTask, warnings: Vec<TaskWarning>) -> Transition {
    debug_assert!(
        previous == task.status || previous.can_transition_to(task.status),
        "illegal edge {previous} -> {}",
        task.status
    );
    Transition {
        task,
        previous,
        changed: true,
        warnings,
    }
}

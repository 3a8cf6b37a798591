use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a workflow task.
///
/// ```text
/// PENDING → IN_PROGRESS → COMPLETED
///         ↘            ⇅
///          SKIPPED    BLOCKED
/// ```
///
/// Nothing ever transitions back to PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "completed" => Some(Self::Completed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// The full transition table.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (*self, next),
            (Pending, InProgress)
                | (Pending, Skipped)
                | (InProgress, Completed)
                | (InProgress, Blocked)
                | (Blocked, InProgress)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator actions on a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Start,
    Complete,
    Block,
    Unblock,
    Skip,
    Assign,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Block => "block",
            Self::Unblock => "unblock",
            Self::Skip => "skip",
            Self::Assign => "assign",
        }
    }

    /// Statuses from which the action may be applied.
    pub fn allowed_from(&self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Self::Start => &[Pending, Blocked, InProgress],
            Self::Complete => &[InProgress],
            Self::Block => &[InProgress],
            Self::Unblock => &[Blocked],
            Self::Skip => &[Pending],
            Self::Assign => &[Pending, InProgress, Blocked],
        }
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parent entity + sequencing policy
// ---------------------------------------------------------------------------

/// Kind of entity a workflow is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    Ticket,
    StockDocument,
    ServiceRequest,
}

impl ParentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::StockDocument => "stock_document",
            Self::ServiceRequest => "service_request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ticket" => Some(Self::Ticket),
            "stock_document" => Some(Self::StockDocument),
            "service_request" => Some(Self::ServiceRequest),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the owning ticket / stock document / service request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub kind: ParentKind,
    pub id: String,
}

impl std::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Whether task order is enforced or advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingMode {
    /// A task may only start once every lower-sequence task is terminal.
    #[default]
    Strict,
    /// Any order is accepted; out-of-order completion yields a warning.
    Flexible,
}

impl SequencingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Flexible => "flexible",
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow + WorkflowTask
// ---------------------------------------------------------------------------

/// A workflow template applied to one parent entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub parent: ParentRef,
    /// Name of the template the tasks were created from.
    pub template: String,
    pub mode: SequencingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub create_at: DateTime<Utc>,
}

/// One unit of work inside a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTask {
    pub id: String,
    pub workflow_id: String,
    pub parent: ParentRef,

    // --- definition ---
    pub name: String,
    /// Position within the parent. Equal values form one rank.
    pub sequence: i32,
    pub required: bool,

    // --- state ---
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set if and only if `status == Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set if and only if `status == Blocked`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
}

impl WorkflowTask {
    pub fn task_ref(&self) -> TaskRef {
        TaskRef {
            id: self.id.clone(),
            sequence: self.sequence,
            name: self.name.clone(),
        }
    }
}

/// Short identification of a task, used in errors and warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub id: String,
    pub sequence: i32,
    pub name: String,
}

impl std::fmt::Display for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} '{}' ({})", self.sequence, self.name, self.id)
    }
}

/// Non-blocking notice attached to a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskWarning {
    /// Completed while a lower-sequence task was still open (flexible mode).
    OutOfSequence { predecessor: TaskRef },
}

/// Result of a task operation: the fresh snapshot plus any warnings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task: WorkflowTask,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<TaskWarning>,
}

/// A workflow with its tasks in sequence order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowView {
    pub workflow: Workflow,
    pub tasks: Vec<WorkflowTask>,
}

// ---------------------------------------------------------------------------
// API request types
// ---------------------------------------------------------------------------

/// One step of a workflow template.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub name: String,
    /// Defaults to the step's 1-based position in the list.
    #[serde(default)]
    pub sequence: Option<i32>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

fn default_required() -> bool {
    true
}

/// Body for `POST /workflows`: apply a template to a parent entity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyWorkflowRequest {
    pub parent_kind: ParentKind,
    pub parent_id: String,
    pub template: String,
    #[serde(default)]
    pub mode: SequencingMode,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Body for `POST /tasks/{id}/@complete`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body for `POST /tasks/{id}/@block`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRequest {
    #[serde(default)]
    pub reason: String,
}

/// Body for `POST /tasks/{id}/@skip`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body for `POST /tasks/{id}/@assign`. `null` clears the assignee.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    #[serde(default)]
    pub assignee: Option<String>,
}

/// Query parameters for `GET /tasks`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub parent_kind: Option<ParentKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Completed,
        TaskStatus::Skipped,
    ];

    #[test]
    fn nothing_returns_to_pending() {
        for s in ALL {
            assert!(!s.can_transition_to(TaskStatus::Pending), "{s} -> pending");
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [TaskStatus::Completed, TaskStatus::Skipped] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn blocked_is_reentrant() {
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Blocked));
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Blocked.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn status_string_forms_agree_with_serde() {
        for s in ALL {
            let json = serde_json::to_value(s).unwrap();
            assert_eq!(json, s.as_str());
            assert_eq!(TaskStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(TaskStatus::parse("done"), None);
    }

    #[test]
    fn apply_request_defaults() {
        let req: ApplyWorkflowRequest = serde_json::from_value(serde_json::json!({
            "parentKind": "service_request",
            "parentId": "sr-1",
            "template": "intake",
            "steps": [{"name": "Inspect"}]
        }))
        .unwrap();
        assert_eq!(req.mode, SequencingMode::Strict);
        assert_eq!(req.parent_kind, ParentKind::ServiceRequest);
        assert!(req.steps[0].required);
        assert_eq!(req.steps[0].sequence, None);
    }

    #[test]
    fn warning_is_tagged_by_code() {
        let w = TaskWarning::OutOfSequence {
            predecessor: TaskRef {
                id: "t1".into(),
                sequence: 1,
                name: "Diagnose".into(),
            },
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["code"], "OUT_OF_SEQUENCE");
        assert_eq!(json["predecessor"]["sequence"], 1);
    }
}

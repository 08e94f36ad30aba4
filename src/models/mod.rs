//! Data models for coxswain entities.
//!
//! This module defines the core data structures:
//! - `Sprint` / `Task` / `Blocker` - the task board entities
//! - `AgentEntry` - the agent registry with workload capacity
//! - `ArtifactMeta` / `Artifact` - versioned agent output
//! - `ContextPackage` - an assembled, token-budgeted context
//! - `ExecutionRecord` - the agent invocation audit ledger

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Task status in the board workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    InQa,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::InQa => "in-qa",
            TaskStatus::Done => "done",
        }
    }

    /// Statuses a task may transition to from this one.
    ///
    /// `todo` is initial; `done` is terminal. `blocked` is additionally
    /// reachable from any status via the blocker side effect, which
    /// deliberately bypasses this table.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Todo => &[TaskStatus::InProgress],
            TaskStatus::InProgress => {
                &[TaskStatus::Todo, TaskStatus::Blocked, TaskStatus::InQa]
            }
            TaskStatus::Blocked => &[TaskStatus::Todo, TaskStatus::InProgress],
            TaskStatus::InQa => &[TaskStatus::InProgress, TaskStatus::Done],
            TaskStatus::Done => &[],
        }
    }

    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "todo" => Ok(TaskStatus::Todo),
            "in-progress" | "in_progress" | "inprogress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "in-qa" | "in_qa" | "inqa" => Ok(TaskStatus::InQa),
            "done" => Ok(TaskStatus::Done),
            _ => Err(Error::InvalidInput(format!("Invalid task status: '{}'", s))),
        }
    }
}

/// Sprint lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintStatus {
    #[default]
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Planned => "planned",
            SprintStatus::Active => "active",
            SprintStatus::Completed => "completed",
            SprintStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SprintStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planned" => Ok(SprintStatus::Planned),
            "active" => Ok(SprintStatus::Active),
            "completed" => Ok(SprintStatus::Completed),
            "cancelled" | "canceled" => Ok(SprintStatus::Cancelled),
            _ => Err(Error::InvalidInput(format!("Invalid sprint status: '{}'", s))),
        }
    }
}

/// Category of obstacle blocking a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockerKind {
    Dependency,
    Technical,
    Clarification,
    Resource,
    External,
    Approval,
}

impl BlockerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockerKind::Dependency => "dependency",
            BlockerKind::Technical => "technical",
            BlockerKind::Clarification => "clarification",
            BlockerKind::Resource => "resource",
            BlockerKind::External => "external",
            BlockerKind::Approval => "approval",
        }
    }
}

impl fmt::Display for BlockerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BlockerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dependency" => Ok(BlockerKind::Dependency),
            "technical" => Ok(BlockerKind::Technical),
            "clarification" => Ok(BlockerKind::Clarification),
            "resource" => Ok(BlockerKind::Resource),
            "external" => Ok(BlockerKind::External),
            "approval" => Ok(BlockerKind::Approval),
            _ => Err(Error::InvalidInput(format!("Invalid blocker kind: '{}'", s))),
        }
    }
}

/// Blocker lifecycle, independent of the owning task's status field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockerStatus {
    #[default]
    Active,
    Resolved,
    Escalated,
}

impl BlockerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockerStatus::Active => "active",
            BlockerStatus::Resolved => "resolved",
            BlockerStatus::Escalated => "escalated",
        }
    }
}

impl fmt::Display for BlockerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BlockerStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(BlockerStatus::Active),
            "resolved" => Ok(BlockerStatus::Resolved),
            "escalated" => Ok(BlockerStatus::Escalated),
            _ => Err(Error::InvalidInput(format!(
                "Invalid blocker status: '{}'",
                s
            ))),
        }
    }
}

/// Role of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Developer,
    Reviewer,
    Architect,
    Manager,
    Specialist,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Developer => "developer",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Architect => "architect",
            AgentRole::Manager => "manager",
            AgentRole::Specialist => "specialist",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "developer" => Ok(AgentRole::Developer),
            "reviewer" => Ok(AgentRole::Reviewer),
            "architect" => Ok(AgentRole::Architect),
            "manager" => Ok(AgentRole::Manager),
            "specialist" => Ok(AgentRole::Specialist),
            _ => Err(Error::InvalidInput(format!("Invalid agent role: '{}'", s))),
        }
    }
}

/// Availability of a registered agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentAvailability {
    #[default]
    Available,
    Busy,
    Offline,
}

impl AgentAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentAvailability::Available => "available",
            AgentAvailability::Busy => "busy",
            AgentAvailability::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentAvailability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(AgentAvailability::Available),
            "busy" => Ok(AgentAvailability::Busy),
            "offline" => Ok(AgentAvailability::Offline),
            _ => Err(Error::InvalidInput(format!(
                "Invalid agent availability: '{}'",
                s
            ))),
        }
    }
}

/// Type tag on a stored artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    StructuredData,
    Prose,
    Code,
    #[default]
    Text,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::StructuredData => "structured-data",
            ArtifactType::Prose => "prose",
            ArtifactType::Code => "code",
            ArtifactType::Text => "text",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured-data" | "structured_data" => Ok(ArtifactType::StructuredData),
            "prose" => Ok(ArtifactType::Prose),
            "code" => Ok(ArtifactType::Code),
            "text" => Ok(ArtifactType::Text),
            _ => Err(Error::InvalidInput(format!(
                "Invalid artifact type: '{}'",
                s
            ))),
        }
    }
}

/// Kind of artifact-to-artifact dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Required,
    Optional,
    Reference,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Required => "required",
            DependencyKind::Optional => "optional",
            DependencyKind::Reference => "reference",
        }
    }
}

impl FromStr for DependencyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "required" => Ok(DependencyKind::Required),
            "optional" => Ok(DependencyKind::Optional),
            "reference" => Ok(DependencyKind::Reference),
            _ => Err(Error::InvalidInput(format!(
                "Invalid dependency kind: '{}'",
                s
            ))),
        }
    }
}

/// How strongly an agent requires a context artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementKind {
    Required,
    Optional,
    IfExists,
}

impl RequirementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementKind::Required => "required",
            RequirementKind::Optional => "optional",
            RequirementKind::IfExists => "if-exists",
        }
    }
}

impl FromStr for RequirementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "required" => Ok(RequirementKind::Required),
            "optional" => Ok(RequirementKind::Optional),
            "if-exists" | "if_exists" => Ok(RequirementKind::IfExists),
            _ => Err(Error::InvalidInput(format!(
                "Invalid requirement kind: '{}'",
                s
            ))),
        }
    }
}

/// Permission granted by an access rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    None,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::None => "none",
        }
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "none" => Ok(Permission::None),
            _ => Err(Error::InvalidInput(format!("Invalid permission: '{}'", s))),
        }
    }
}

/// Kind of resource an access rule governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Artifact,
    Context,
    History,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Artifact => "artifact",
            ResourceKind::Context => "context",
            ResourceKind::History => "history",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "artifact" => Ok(ResourceKind::Artifact),
            "context" => Ok(ResourceKind::Context),
            "history" => Ok(ResourceKind::History),
            _ => Err(Error::InvalidInput(format!(
                "Invalid resource kind: '{}'",
                s
            ))),
        }
    }
}

/// Status of one agent invocation in the execution ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Started,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Started => "started",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "started" => Ok(ExecutionStatus::Started),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            _ => Err(Error::InvalidInput(format!(
                "Invalid execution status: '{}'",
                s
            ))),
        }
    }
}

/// A typed project setting value.
///
/// Settings are stored as text plus a type tag; this enum is the single
/// in-memory representation so nothing downstream branches on the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Boolean(bool),
    Integer(i64),
    Json(serde_json::Value),
    String(String),
}

impl SettingValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            SettingValue::String(_) => "string",
            SettingValue::Integer(_) => "integer",
            SettingValue::Boolean(_) => "boolean",
            SettingValue::Json(_) => "json",
        }
    }

    /// Render the value as the text stored in the database.
    pub fn to_db_string(&self) -> String {
        match self {
            SettingValue::String(s) => s.clone(),
            SettingValue::Integer(i) => i.to_string(),
            SettingValue::Boolean(b) => b.to_string(),
            SettingValue::Json(v) => v.to_string(),
        }
    }

    /// Reconstruct a value from its stored text and type tag.
    pub fn from_db(type_tag: &str, value: &str) -> crate::Result<Self> {
        match type_tag {
            "string" => Ok(SettingValue::String(value.to_string())),
            "integer" => value
                .parse::<i64>()
                .map(SettingValue::Integer)
                .map_err(|_| Error::InvalidInput(format!("Invalid integer setting: '{}'", value))),
            "boolean" => Ok(SettingValue::Boolean(value.eq_ignore_ascii_case("true"))),
            "json" => Ok(SettingValue::Json(serde_json::from_str(value)?)),
            _ => Err(Error::InvalidInput(format!(
                "Invalid setting type: '{}'",
                type_tag
            ))),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

/// A time-boxed collection of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub status: SprintStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sprint plus a per-status breakdown of its tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintSummary {
    #[serde(flatten)]
    pub sprint: Sprint,
    pub task_counts: BTreeMap<String, i64>,
    pub total_tasks: i64,
}

/// Sprint-level completion and effort metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintMetrics {
    pub sprint_id: String,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub blocked_tasks: i64,
    /// `done / total * 100`, rounded to two decimals; 0 when the sprint is empty.
    pub completion_rate: f64,
    pub total_estimated_hours: f64,
    pub total_actual_hours: f64,
}

/// A work item on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Structured id: `{sprint_id}-{seq:03}`
    pub id: String,
    pub sprint_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Lower is more urgent.
    pub priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Task ids this task depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Active blockers only.
    #[serde(default)]
    pub blockers: Vec<Blocker>,
}

/// A recorded obstacle preventing task progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocker {
    /// Time-suffixed id: `{task_id}_blocker_{unix}`
    pub id: String,
    pub task_id: String,
    pub kind: BlockerKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_task_id: Option<String>,
    pub status: BlockerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
}

/// A registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub availability: AgentAvailability,
    pub max_concurrent_tasks: i64,
    pub created_at: DateTime<Utc>,
}

/// An agent's registry entry plus live workload figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentWorkload {
    #[serde(flatten)]
    pub agent: AgentEntry,
    /// Tasks currently assigned in any non-done status.
    pub current_tasks: i64,
    pub available_capacity: i64,
    pub at_capacity: bool,
}

/// One append-only audit row for a task mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    pub id: i64,
    pub task_id: String,
    pub field_changed: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// A free-form comment on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskComment {
    /// Time-suffixed id: `{task_id}_comment_{unix}`
    pub id: String,
    pub task_id: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Filters for task queries; all fields are optional and ANDed together.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub sprint_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub assigned_agent: Option<String>,
}

/// A generation marker scoping which artifacts are current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextVersion {
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<i64>,
}

/// Metadata row for a stored artifact; content lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Structured id: `{agent_id}/{name}/{version}`
    pub id: String,
    pub agent_id: String,
    pub artifact_type: ArtifactType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Location relative to the artifacts directory: `v{version}/{agent}/{name}`
    pub file_path: String,
    /// SHA-256 hex digest of the exact stored bytes.
    pub file_hash: String,
    pub version: i64,
    pub token_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A stored artifact with its content re-read from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(flatten)]
    pub meta: ArtifactMeta,
    pub content: String,
}

/// Input to `store_artifacts`: one artifact the caller wants persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub name: String,
    #[serde(default, rename = "type")]
    pub artifact_type: ArtifactType,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Result of a `store_artifacts` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreReceipt {
    pub version: i64,
    pub artifact_ids: Vec<String>,
}

/// Cached compressed representation of an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub artifact_id: String,
    pub summary: String,
    pub summary_token_count: i64,
    pub original_token_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// One access-control rule. Lower priority number wins on conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRule {
    /// `*` matches any agent.
    pub agent_pattern: String,
    pub resource: ResourceKind,
    /// `self` means resources owned by the requesting agent; `*` matches all.
    pub resource_pattern: String,
    pub permission: Permission,
    pub priority: i64,
}

/// Per-agent declaration of a context artifact requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequirement {
    pub agent_id: String,
    /// Artifact-name pattern, e.g. `system_architect/*` or the
    /// `project_context` sentinel.
    pub pattern: String,
    pub kind: RequirementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    pub prefer_summary: bool,
    pub priority: i64,
}

/// Audit entry for one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Time-suffixed id: `exec_{agent}_{YYYYmmdd_HHMMSS}`
    pub id: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<String>,
    pub status: ExecutionStatus,
    pub context_version: i64,
    #[serde(default)]
    pub input_artifacts: Vec<String>,
    pub input_token_count: i64,
    #[serde(default)]
    pub output_artifacts: Vec<String>,
    pub output_token_count: i64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Derived as `completed_at - started_at` when both are present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Metadata attached to an assembled context package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub max_tokens: i64,
    /// `max_tokens` minus the fixed instruction and task allowances.
    pub available_tokens: i64,
    pub tokens_used: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub assembled_at: DateTime<Utc>,
}

/// A token-budgeted context package for one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPackage {
    pub project_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_sprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    pub context_version: i64,
    /// Keyed by artifact id, in the order they were admitted.
    pub artifacts: BTreeMap<String, Artifact>,
    pub metadata: ContextMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_wire_strings() {
        assert_eq!(TaskStatus::InProgress.as_str(), "in-progress");
        assert_eq!(TaskStatus::InQa.as_str(), "in-qa");
        assert_eq!(
            serde_json::to_string(&TaskStatus::InQa).unwrap(),
            "\"in-qa\""
        );
        assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!("doing".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_transition_table() {
        assert!(TaskStatus::Todo.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Todo.can_transition_to(TaskStatus::Done));
        assert!(TaskStatus::InQa.can_transition_to(TaskStatus::Done));
        assert!(TaskStatus::Done.valid_transitions().is_empty());
        assert!(TaskStatus::Done.is_terminal());
    }

    #[test]
    fn test_setting_value_round_trip() {
        let v = SettingValue::Integer(42);
        assert_eq!(v.type_tag(), "integer");
        let back = SettingValue::from_db("integer", &v.to_db_string()).unwrap();
        assert_eq!(back, v);

        let j = SettingValue::Json(serde_json::json!({"a": [1, 2]}));
        let back = SettingValue::from_db("json", &j.to_db_string()).unwrap();
        assert_eq!(back, j);

        let b = SettingValue::from_db("boolean", "True").unwrap();
        assert_eq!(b, SettingValue::Boolean(true));
    }

    #[test]
    fn test_requirement_kind_wire_strings() {
        assert_eq!(RequirementKind::IfExists.as_str(), "if-exists");
        assert_eq!(
            "if_exists".parse::<RequirementKind>().unwrap(),
            RequirementKind::IfExists
        );
    }
}

//! SQLite-backed stores for the core data model.

pub mod audit;
pub mod backup;
pub mod events;
pub mod llm_jobs;
pub mod memories;
pub mod reminders;
pub mod search;
pub mod settings;
pub mod tags;
pub mod tasks;

pub use audit::{log_audit, AuditFilter, AuditRecord, AuditStore};
pub use backup::{BackupJob, BackupStore};
pub use events::{CreateEventInput, Event, EventStore, UpdateEventInput};
pub use llm_jobs::{CreateLlmJobInput, LlmJob, LlmJobFilter, LlmJobStore, UpdateLlmJobInput};
pub use memories::{
    remove_media_blob, CreateMemoryInput, Memory, MemoryStore, MemoryWithTags, UpdateMemoryInput,
};
pub use reminders::{
    CreateReminderInput, Reminder, ReminderFilter, ReminderStore, UpdateReminderInput,
};
pub use search::{remove_from_index, search_memories, SearchHit};
pub use settings::{SettingsStore, UserSettings};
pub use tags::{MemoryTag, TagStore};
pub use tasks::{CreateTaskInput, Task, TaskStore, TaskUpdateOutcome, UpdateTaskInput};

use serde::{Deserialize, Serialize};

/// How long a pending media memory lives before it expires.
pub const PENDING_MEMORY_TTL_DAYS: i64 = 7;

/// How long a suggested tag lives before it expires.
pub const SUGGESTED_TAG_TTL_DAYS: i64 = 7;

/// How long an event may sit pending before it is re-prompted.
pub const EVENT_REPROMPT_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Pending,
    Confirmed,
}

impl MemoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryStatus::Pending => "pending",
            MemoryStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(MemoryStatus::Pending),
            "confirmed" => Some(MemoryStatus::Confirmed),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaType::Image),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    Suggested,
    Confirmed,
}

impl TagStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TagStatus::Suggested => "suggested",
            TagStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "suggested" => Some(TagStatus::Suggested),
            "confirmed" => Some(TagStatus::Confirmed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    #[serde(rename = "NOT_DONE")]
    NotDone,
    #[serde(rename = "DONE")]
    Done,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::NotDone => "NOT_DONE",
            TaskState::Done => "DONE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NOT_DONE" => Some(TaskState::NotDone),
            "DONE" => Some(TaskState::Done),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Confirmed => "confirmed",
            EventStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(EventStatus::Pending),
            "confirmed" => Some(EventStatus::Confirmed),
            "rejected" => Some(EventStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSourceType {
    Email,
    Manual,
}

impl EventSourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSourceType::Email => "email",
            EventSourceType::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(EventSourceType::Email),
            "manual" => Some(EventSourceType::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ImageTag,
    IntentClassify,
    Followup,
    TaskMatch,
    EmailExtract,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::ImageTag,
        JobType::IntentClassify,
        JobType::Followup,
        JobType::TaskMatch,
        JobType::EmailExtract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::ImageTag => "image_tag",
            JobType::IntentClassify => "intent_classify",
            JobType::Followup => "followup",
            JobType::TaskMatch => "task_match",
            JobType::EmailExtract => "email_extract",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image_tag" => Some(JobType::ImageTag),
            "intent_classify" => Some(JobType::IntentClassify),
            "followup" => Some(JobType::Followup),
            "task_match" => Some(JobType::TaskMatch),
            "email_extract" => Some(JobType::EmailExtract),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Terminal jobs must never re-invoke the model on redelivery.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
    Confirmed,
    Rejected,
    Fired,
    Expired,
    Requeued,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
            AuditAction::Confirmed => "confirmed",
            AuditAction::Rejected => "rejected",
            AuditAction::Fired => "fired",
            AuditAction::Expired => "expired",
            AuditAction::Requeued => "requeued",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(AuditAction::Created),
            "updated" => Some(AuditAction::Updated),
            "deleted" => Some(AuditAction::Deleted),
            "confirmed" => Some(AuditAction::Confirmed),
            "rejected" => Some(AuditAction::Rejected),
            "fired" => Some(AuditAction::Fired),
            "expired" => Some(AuditAction::Expired),
            "requeued" => Some(AuditAction::Requeued),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Memory,
    Task,
    Reminder,
    Event,
    LlmJob,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Memory => "memory",
            EntityType::Task => "task",
            EntityType::Reminder => "reminder",
            EntityType::Event => "event",
            EntityType::LlmJob => "llm_job",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "memory" => Some(EntityType::Memory),
            "task" => Some(EntityType::Task),
            "reminder" => Some(EntityType::Reminder),
            "event" => Some(EntityType::Event),
            "llm_job" => Some(EntityType::LlmJob),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Insert the owner row if it does not exist yet. Every user-scoped create
/// path calls this so foreign keys stay satisfied without a separate user
/// registration step.
pub(crate) async fn ensure_user(
    db: &mut sqlx::SqliteConnection,
    user_id: crate::UserId,
) -> crate::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO users (user_id) VALUES (?)")
        .bind(user_id)
        .execute(db)
        .await
        .map_err(|e| crate::error::DbError::Query(format!("ensure user: {e}")))?;
    Ok(())
}

//! Shared state for the REST handlers.

use crate::store::{
    AuditStore, BackupStore, EventStore, LlmJobStore, MemoryStore, ReminderStore, SettingsStore,
    TagStore, TaskStore,
};
use crate::streams::Broker;
use sqlx::SqlitePool;

pub struct ApiState {
    pub pool: SqlitePool,
    pub memories: MemoryStore,
    pub tags: TagStore,
    pub tasks: TaskStore,
    pub reminders: ReminderStore,
    pub events: EventStore,
    pub llm_jobs: LlmJobStore,
    pub settings: SettingsStore,
    pub audit: AuditStore,
    pub backups: BackupStore,
    /// Absent when the broker is unreachable at startup; job creation
    /// still persists rows and logs the skipped publish.
    pub broker: Option<Broker>,
}

impl ApiState {
    pub fn new(pool: SqlitePool, broker: Option<Broker>) -> Self {
        Self {
            memories: MemoryStore::new(pool.clone()),
            tags: TagStore::new(pool.clone()),
            tasks: TaskStore::new(pool.clone()),
            reminders: ReminderStore::new(pool.clone()),
            events: EventStore::new(pool.clone()),
            llm_jobs: LlmJobStore::new(pool.clone()),
            settings: SettingsStore::new(pool.clone()),
            audit: AuditStore::new(pool.clone()),
            backups: BackupStore::new(pool.clone()),
            pool,
            broker,
        }
    }
}

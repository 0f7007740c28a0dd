//! Shared application state threaded through both control planes.

use std::sync::Arc;

use crate::repository::{AuditLog, JobRepository, OutboundQueueRepository, ProfileRepository};
use crate::services::{RestartRuntime, TaskMutationService};

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobRepository,
    pub outbound: OutboundQueueRepository,
    pub audit: AuditLog,
    pub profile: ProfileRepository,
    pub mutations: Arc<TaskMutationService>,
    pub restart: Arc<dyn RestartRuntime>,
    pub started_at: i64,
    pub version: &'static str,
}

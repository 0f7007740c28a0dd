//! Handler registration and the cancellation-aware invocation contract.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::watch;

/// The result a handler reports back to the scheduler. Handlers never
/// propagate exceptions to the tick loop (§7 propagation policy); any error
/// must be folded into `JobOutcome::Failed`.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Success { result_json: Option<String> },
    Failed { error_code: Option<String>, error_message: String },
    Skipped { error_message: Option<String> },
}

/// One registered job handler, keyed by `Job.type`.
///
/// Handlers must be idempotent: a stale-lease reclaim may invoke the same
/// logical firing twice (§4.E stale leases).
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// `payload` is the job's opaque serialized application data.
    /// `cancelled` fires when the lease is about to expire; handlers should
    /// poll it and return promptly.
    async fn run(&self, payload: Option<String>, cancelled: watch::Receiver<bool>) -> JobOutcome;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }
}

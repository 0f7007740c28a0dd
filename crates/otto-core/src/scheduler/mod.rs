//! Scheduler (§4.E): polls the job repository, leases due jobs, dispatches
//! to handlers, records runs, and reschedules or finalizes.

pub mod handler;
pub mod tokio_scheduler;

pub use handler::{HandlerRegistry, JobHandler, JobOutcome};
pub use tokio_scheduler::TokioScheduler;

/// Job `type` values seeded by the scheduler at startup if absent. These are
/// `managedBy=system` and immutable via the control planes.
pub use crate::database::models::SYSTEM_RESERVED_JOB_TYPES;

//! Repository façades. Every multi-row mutation runs inside an explicit
//! transaction; `JobRepository::claim_due` is the one compare-and-set
//! critical section guarded by `BEGIN IMMEDIATE`.

pub mod audit_log;
pub mod job_repository;
pub mod outbound_repository;
pub mod profile_repository;

pub use audit_log::AuditLog;
pub use job_repository::JobRepository;
pub use outbound_repository::OutboundQueueRepository;
pub use profile_repository::ProfileRepository;

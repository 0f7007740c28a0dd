//! Core library for the Otto personal-assistant runtime: embedded store,
//! job scheduler, outbound message queue, immutable audit log, and the two
//! authenticated HTTP control planes.

pub mod agent;
pub mod config;
pub mod database;
pub mod error;
pub mod http;
pub mod logging;
pub mod outbound;
pub mod repository;
pub mod scheduler;
pub mod services;

pub use error::{OttoError, OttoResult};

/// Current epoch milliseconds. The sole place the runtime reads wall-clock
/// time, so tests can reason about it consistently.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_monotonic_enough_to_be_positive() {
        assert!(now_millis() > 0);
    }
}

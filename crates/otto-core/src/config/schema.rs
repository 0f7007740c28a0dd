//! TOML configuration schema for the Otto runtime.
//!
//! All fields have `#[serde(default)]` so a partially-filled `config.toml`
//! works correctly.  Missing sections fall back to their `Default` impl.
//!
//! Example `<home>/config.toml`:
//! ```toml
//! [scheduler]
//! tick_ms = 1000
//! lease_ms = 60000
//! worker_pool_size = 8
//!
//! [delivery]
//! tick_ms = 500
//! backoff_base_secs = 5
//! backoff_cap_secs = 300
//! max_attempts = 8
//!
//! [http]
//! internal_host = "127.0.0.1"
//! internal_port = 4180
//! external_host = "0.0.0.0"
//! external_port = 4190
//! ```

use serde::{Deserialize, Serialize};

// ─── SchedulerConfig ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick period `P` in milliseconds (recommended 500 ms – 2 s).
    pub tick_ms: u64,
    /// Lease duration in milliseconds (recommended 5-10x `tick_ms`, floor 60s).
    pub lease_ms: u64,
    /// Worker pool size `W` (recommended 2x host cores, minimum 4).
    pub worker_pool_size: usize,
    /// Max jobs claimed per tick.
    pub claim_batch_limit: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            lease_ms: 60_000,
            worker_pool_size: default_worker_pool_size(),
            claim_batch_limit: 32,
        }
    }
}

fn default_worker_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() * 2).max(4))
        .unwrap_or(4)
}

// ─── DeliveryConfig ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Tick period `Q` in milliseconds (recommended 250 ms – 1 s).
    pub tick_ms: u64,
    /// Exponential backoff base, in seconds (`B`).
    pub backoff_base_secs: u64,
    /// Exponential backoff cap, in seconds (`C`).
    pub backoff_cap_secs: u64,
    /// Maximum delivery attempts before escalating to permanent failure.
    pub max_attempts: u32,
    /// Max messages claimed per tick.
    pub batch_limit: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            backoff_base_secs: 5,
            backoff_cap_secs: 300,
            max_attempts: 8,
            batch_limit: 32,
        }
    }
}

// ─── HttpConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub internal_host: String,
    pub internal_port: u16,
    pub external_host: String,
    pub external_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            internal_host: "127.0.0.1".to_string(),
            internal_port: 4180,
            external_host: "0.0.0.0".to_string(),
            external_port: 4190,
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────

/// Top-level runtime configuration.
///
/// Loaded from `<home>/config.toml`, falling back to defaults, then
/// overridden by `OTTO_*` environment variables (see [`super::loader`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub delivery: DeliveryConfig,
    pub http: HttpConfig,
}

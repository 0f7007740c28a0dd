//! The injected `restartRuntime` collaborator invoked by
//! `POST /external/system/restart` (§4.I).

use async_trait::async_trait;

#[async_trait]
pub trait RestartRuntime: Send + Sync {
    async fn restart(&self) -> Result<(), String>;
}

/// A collaborator that logs the request and takes no further action — used
/// when no process supervisor is wired in (e.g. local development).
pub struct NoopRestart;

#[async_trait]
impl RestartRuntime for NoopRestart {
    async fn restart(&self) -> Result<(), String> {
        tracing::warn!("system restart requested but no restart collaborator is configured");
        Ok(())
    }
}

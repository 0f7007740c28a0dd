//! The injected transport collaborator through which outbound messages are
//! shipped. Deliberately out of scope: Telegram ingestion and the wire
//! protocol itself (§1) — this crate only specifies the trait boundary.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Ok,
    Transient,
    Permanent,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, chat_id: i64, content: &str) -> SendOutcome;
}

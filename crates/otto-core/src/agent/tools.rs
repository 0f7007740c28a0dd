//! Tool registration and dispatch (§4.K supplement): `executeTools` and the
//! `/internal/tools/queue-telegram-message` HTTP endpoint both call into the
//! same [`ToolRegistry`] entry, so the two surfaces never drift.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::http::dto::QueueTelegramMessageRequest;
use crate::http::internal::queue_telegram_message_tool;
use crate::http::state::AppState;

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    async fn call(&self, args: Value) -> ToolResult;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, tool: Arc<dyn Tool>) {
        self.tools.insert(name.into(), tool);
    }

    /// Dispatch `call` by name. An unregistered name produces a failed
    /// [`ToolResult`] rather than an exception (§4.J `executeTools`).
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        match self.tools.get(&call.name) {
            Some(tool) => {
                let mut result = tool.call(call.args.clone()).await;
                result.tool_call_id = call.id.clone();
                result
            }
            None => ToolResult {
                tool_call_id: call.id.clone(),
                success: false,
                output: None,
                error: Some("Tool not registered.".to_string()),
            },
        }
    }
}

/// The `queue_telegram_message` tool: bound into [`ToolRegistry`] for the
/// agent loop, and reused directly by the internal control plane endpoint.
pub struct QueueTelegramMessageTool {
    state: AppState,
}

impl QueueTelegramMessageTool {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for QueueTelegramMessageTool {
    async fn call(&self, args: Value) -> ToolResult {
        let req: QueueTelegramMessageRequest = match serde_json::from_value(args) {
            Ok(req) => req,
            Err(e) => {
                return ToolResult {
                    tool_call_id: String::new(),
                    success: false,
                    output: None,
                    error: Some(format!("invalid arguments: {e}")),
                }
            }
        };

        match queue_telegram_message_tool(&self.state, req).await {
            Ok(response) => ToolResult {
                tool_call_id: String::new(),
                success: true,
                output: serde_json::to_value(response).ok(),
                error: None,
            },
            Err(e) => ToolResult {
                tool_call_id: String::new(),
                success: false,
                output: None,
                error: Some(e.to_string()),
            },
        }
    }
}

//! One conversational turn, expressed as a linear state machine with a
//! conditional edge after `classify` (§4.J, §9 design notes).
//!
//! ```text
//! normalize -> assembleContext -> classify
//!                                    |
//!                        needsTools? |no  -> composeResponse -> end
//!                                    |yes
//!                                 plan -> policyCheck -> executeTools -> composeResponse -> end
//! ```

use serde::{Deserialize, Serialize};

use super::tools::{ToolCall, ToolRegistry, ToolResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("invalid_input: {0}")]
    InvalidInput(String),
    #[error("classifier_invalid: {0}")]
    ClassifierInvalid(String),
}

/// Classification result: domains this turn touches, and whether tool use
/// is required.
#[derive(Debug, Clone)]
pub struct Classification {
    pub domains: Vec<String>,
    pub needs_tools: bool,
}

/// A policy decision recorded for one candidate tool call.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub tool_call_id: String,
    pub allowed: bool,
    pub reason: Option<String>,
}

/// The typed state bag threaded through the turn; each step merges its
/// deltas into it. `threadId` keys state across concurrently running turns
/// (§4.J concurrency).
#[derive(Debug, Clone, Default)]
pub struct TurnState {
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub context: Vec<String>,
    pub classification: Option<Classification>,
    pub tool_calls: Vec<ToolCall>,
    pub policy_decisions: Vec<PolicyDecision>,
    pub tool_results: Vec<ToolResult>,
    pub response: Option<Message>,
}

/// A caller-supplied allow-list of domain labels for `classify`, and the
/// synchronous policy predicate for `policyCheck`.
pub trait TurnPolicy: Send + Sync {
    fn allowed_domains(&self) -> &[String];
    fn allow_tool_call(&self, call: &ToolCall) -> bool;
}

/// Pluggable classifier and planner: the only steps that call out to an LLM
/// (deliberately out of scope at the implementation level, §1).
pub trait Classifier: Send + Sync {
    fn classify(&self, messages: &[Message], allowed_domains: &[String]) -> Result<Classification, TurnError>;
}

pub trait Planner: Send + Sync {
    /// Returns `None` when no tool calls are needed (planning is optional
    /// per installation, §4.J).
    fn plan(&self, state: &TurnState) -> Option<Vec<ToolCall>>;
}

pub trait ResponseComposer: Send + Sync {
    fn compose(&self, state: &TurnState) -> Message;
}

/// Run one turn to completion, in strict step order.
pub async fn run_turn(
    thread_id: String,
    messages: Vec<Message>,
    policy: &dyn TurnPolicy,
    classifier: &dyn Classifier,
    planner: &dyn Planner,
    tools: &ToolRegistry,
    composer: &dyn ResponseComposer,
) -> Result<TurnState, TurnError> {
    // normalize
    if messages.is_empty() {
        return Err(TurnError::InvalidInput("messages must be non-empty".to_string()));
    }

    let mut state = TurnState {
        thread_id,
        messages,
        ..Default::default()
    };

    // assembleContext: left as a no-op extension point — prompt-template
    // composition from on-disk files is out of scope (§1).
    state.context = Vec::new();

    // classify
    let classification = classifier.classify(&state.messages, policy.allowed_domains())?;
    let needs_tools = classification.needs_tools;
    state.classification = Some(classification);

    if needs_tools {
        // plan
        if let Some(calls) = planner.plan(&state) {
            state.tool_calls = calls;
        }

        // policyCheck: denied calls are removed and recorded.
        let mut surviving = Vec::with_capacity(state.tool_calls.len());
        for call in state.tool_calls.drain(..) {
            let allowed = policy.allow_tool_call(&call);
            state.policy_decisions.push(PolicyDecision {
                tool_call_id: call.id.clone(),
                allowed,
                reason: if allowed { None } else { Some("denied by policy".to_string()) },
            });
            if allowed {
                surviving.push(call);
            }
        }

        // executeTools: unknown names produce a failed result, not an
        // exception; all results run to completion before proceeding.
        let mut results = Vec::with_capacity(surviving.len());
        for call in surviving {
            results.push(tools.dispatch(&call).await);
        }
        state.tool_results = results;
    }

    // composeResponse
    let response = composer.compose(&state);
    state.response = Some(response);

    Ok(state)
}

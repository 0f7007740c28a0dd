//! Agent loop (§4.J): interface-level state-machine orchestration of a
//! single conversational turn. The LLM calls themselves are out of scope
//! (§1) — this module specifies the orchestration contract and the shared
//! tool surface (§4.K).

pub mod tools;
pub mod turn;

pub use tools::{ToolRegistry, ToolResult};
pub use turn::{run_turn, Message, TurnError, TurnState};

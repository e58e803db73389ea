//! Sales agent runtime.
//!
//! [`SalesAgent`] drives one task cycle on behalf of a signed-in user:
//! 1. **Delegated token** - exchange the user's ID token for a scoped token
//! 2. **Reasoning** - ask the reasoning engine for an answer
//! 3. **Audit** - describe who acted and whether the agent proved its identity
//!
//! Exchange and reasoning failures degrade the result instead of failing the
//! call. Tool calls are the exception: without a scoped token there is
//! nothing to attach, so [`SalesAgent::call_tool`] returns the exchange error.

pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod result;
pub mod tools;

pub use error::AgentError;
pub use llm::{HttpReasoningEngine, ReasoningEngine, ReasoningEngineError, ReasoningSettings};
pub use orchestrator::SalesAgent;
pub use result::{AgentSummary, SecuritySummary, TaskContext, TaskResult, TokenExchangeReport};
pub use tools::{PlaceholderToolInvoker, ToolCall, ToolError, ToolInvoker, ToolResult};

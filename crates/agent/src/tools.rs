use async_trait::async_trait;
use progear_core::ScopedToken;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A named downstream capability call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub params: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self { name: name.into(), params }
    }
}

/// Outcome of [`crate::SalesAgent::call_tool`].
///
/// `token_used` reports whether a scoped token was attached to the call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub params: Value,
    pub result: Value,
    pub token_used: bool,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool name must not be empty")]
    EmptyName,
    #[error("tool `{name}` failed: {message}")]
    Failed { name: String, message: String },
}

#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, call: &ToolCall, token: &ScopedToken) -> Result<Value, ToolError>;
}

/// Dispatch seam used until resource servers are wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderToolInvoker;

#[async_trait]
impl ToolInvoker for PlaceholderToolInvoker {
    async fn invoke(&self, call: &ToolCall, token: &ScopedToken) -> Result<Value, ToolError> {
        if token.secret().trim().is_empty() {
            return Err(ToolError::Failed {
                name: call.name.clone(),
                message: "no scoped token attached".to_string(),
            });
        }
        Ok(Value::String(format!("[MCP] Tool {} called (implementation pending)", call.name)))
    }
}

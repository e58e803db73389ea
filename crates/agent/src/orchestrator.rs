//! The sales agent orchestrator.
//!
//! One [`SalesAgent`] serves one user session. It owns its token and
//! audit-info caches; nothing is shared between instances.

use std::sync::Arc;

use progear_core::{
    AgentIdentity, AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
    ResourceSelector, ScopedToken, Slot, TokenInfo,
};
use progear_identity::{AuditInfoError, AuthExchangeError, IdentityClient, UserAssertion};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::llm::ReasoningEngine;
use crate::prompt::system_prompt;
use crate::result::{AgentSummary, SecuritySummary, TaskContext, TaskResult, TokenExchangeReport};
use crate::tools::{PlaceholderToolInvoker, ToolCall, ToolError, ToolInvoker, ToolResult};

pub struct SalesAgent {
    identity: AgentIdentity,
    assertion: UserAssertion,
    identity_client: Arc<dyn IdentityClient>,
    reasoning: Arc<dyn ReasoningEngine>,
    tools: Arc<dyn ToolInvoker>,
    audit: Arc<dyn AuditSink>,
    token: Slot<ScopedToken>,
    audit_info: Slot<TokenInfo>,
}

impl SalesAgent {
    pub fn new(
        identity: AgentIdentity,
        assertion: UserAssertion,
        identity_client: Arc<dyn IdentityClient>,
        reasoning: Arc<dyn ReasoningEngine>,
    ) -> Self {
        Self {
            identity,
            assertion,
            identity_client,
            reasoning,
            tools: Arc::new(PlaceholderToolInvoker),
            audit: Arc::new(NoopAuditSink),
            token: Slot::new(),
            audit_info: Slot::new(),
        }
    }

    pub fn with_tool_invoker(mut self, tools: Arc<dyn ToolInvoker>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub async fn has_cached_token(&self) -> bool {
        self.token.has_value().await
    }

    pub async fn invalidate_token(&self) {
        self.token.invalidate().await;
    }

    pub async fn invalidate_audit_info(&self) {
        self.audit_info.invalidate().await;
    }

    /// Audit info for the session's user, fetched once and then reused.
    pub async fn audit_info(&self) -> Result<TokenInfo, AuditInfoError> {
        self.audit_info.get_or_try_init(|| self.identity_client.token_info(&self.assertion)).await
    }

    /// Runs one task. Never fails: exchange, reasoning and audit failures are
    /// reported inside the returned [`TaskResult`].
    pub async fn process(&self, task: &str, context: &TaskContext) -> TaskResult {
        let correlation_id = context.correlation_id.as_str();

        let exchange = self.exchange(ResourceSelector::All, context).await;
        if exchange.is_err() {
            self.token.invalidate().await;
        }
        let token_exchange = TokenExchangeReport::from_outcome(
            &exchange,
            self.identity_client.audience(),
            self.identity.scopes(),
        );

        let result = self.reason(task, context).await;
        let security = self.security_summary(context).await;

        info!(
            event_name = "agent.task.completed",
            correlation_id,
            agent_id = self.identity.id(),
            token_exchange_success = token_exchange.success(),
            audit_complete = security.audit_complete,
            "task processed"
        );

        TaskResult {
            agent: AgentSummary::from(&self.identity),
            result,
            token_exchange,
            security,
            tools_called: Vec::new(),
        }
    }

    /// Calls a downstream tool with the cached token, exchanging first when no
    /// token is cached. Exchange failure is returned, never papered over.
    pub async fn call_tool(
        &self,
        name: &str,
        params: Value,
        context: &TaskContext,
    ) -> Result<ToolResult, AgentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ToolError::EmptyName.into());
        }
        let correlation_id = context.correlation_id.as_str();

        let token = match self.token.get().await {
            Some(token) => token,
            None => self.exchange(ResourceSelector::All, context).await?,
        };

        let call = ToolCall::new(name, params);
        info!(
            event_name = "agent.tool.invoked",
            correlation_id,
            agent_id = self.identity.id(),
            tool = name,
            "calling tool with scoped token"
        );
        let outcome = self.tools.invoke(&call, &token).await;
        let tool_outcome = if outcome.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failed };
        self.audit.emit(
            self.audit_event(context, "agent.tool.invoked", AuditCategory::ToolCall, tool_outcome)
                .with_metadata("tool", name),
        );

        Ok(ToolResult { tool: call.name, params: call.params, result: outcome?, token_used: true })
    }

    /// Audit event stamped with the caller's correlation id and task metadata.
    fn audit_event(
        &self,
        context: &TaskContext,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        let event = AuditEvent::new(
            context.correlation_id.as_str(),
            event_type,
            category,
            self.identity.id(),
            outcome,
        );
        context
            .metadata
            .iter()
            .fold(event, |event, (key, value)| event.with_metadata(key.as_str(), value.as_str()))
    }

    async fn exchange(
        &self,
        resource: ResourceSelector,
        context: &TaskContext,
    ) -> Result<ScopedToken, AuthExchangeError> {
        let correlation_id = context.correlation_id.as_str();
        match self.identity_client.exchange_token(&self.assertion, resource).await {
            Ok(token) => {
                self.token.set(token.clone()).await;
                self.audit.emit(
                    self.audit_event(
                        context,
                        "agent.token_exchange.succeeded",
                        AuditCategory::TokenExchange,
                        AuditOutcome::Success,
                    )
                    .with_metadata("resource", resource.as_str())
                    .with_metadata("scopes", token.scopes.join(" ")),
                );
                Ok(token)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.token_exchange.failed",
                    correlation_id,
                    agent_id = self.identity.id(),
                    error_kind = ?error.kind(),
                    error = %error,
                    "token exchange failed"
                );
                let outcome = if error.is_policy_denial() {
                    AuditOutcome::Rejected
                } else {
                    AuditOutcome::Failed
                };
                self.audit.emit(
                    self.audit_event(
                        context,
                        "agent.token_exchange.failed",
                        AuditCategory::TokenExchange,
                        outcome,
                    )
                    .with_metadata("resource", resource.as_str())
                    .with_metadata("error", error.to_string()),
                );
                Err(error)
            }
        }
    }

    async fn reason(&self, task: &str, context: &TaskContext) -> String {
        let correlation_id = context.correlation_id.as_str();
        let system = system_prompt(&self.identity);
        match self.reasoning.generate(&system, task).await {
            Ok(text) => {
                self.audit.emit(self.audit_event(
                    context,
                    "agent.reasoning.completed",
                    AuditCategory::Reasoning,
                    AuditOutcome::Success,
                ));
                text
            }
            Err(error) => {
                warn!(
                    event_name = "agent.reasoning.failed",
                    correlation_id,
                    agent_id = self.identity.id(),
                    error = %error,
                    "reasoning engine failed"
                );
                self.audit.emit(
                    self.audit_event(
                        context,
                        "agent.reasoning.failed",
                        AuditCategory::Reasoning,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                format!("I apologize, but I encountered an error processing your request: {error}")
            }
        }
    }

    async fn security_summary(&self, context: &TaskContext) -> SecuritySummary {
        let correlation_id = context.correlation_id.as_str();
        match self.audit_info().await {
            Ok(info) => SecuritySummary::from_token_info(&info),
            Err(error) => {
                warn!(
                    event_name = "agent.audit_info.failed",
                    correlation_id,
                    agent_id = self.identity.id(),
                    error = %error,
                    "audit info unavailable, reporting locally decoded claims only"
                );
                self.audit.emit(
                    self.audit_event(
                        context,
                        "agent.audit_info.failed",
                        AuditCategory::Introspection,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                let user = self.assertion.decode_claims().unwrap_or_default();
                SecuritySummary::incomplete(user, self.identity_client.is_demo_mode(), &error)
            }
        }
    }
}

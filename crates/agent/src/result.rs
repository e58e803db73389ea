use std::collections::BTreeMap;

use progear_core::token::FLOW_SUMMARY;
use progear_core::{AgentAuthStatus, AgentIdentity, ScopedToken, TokenInfo, UserClaims};
use progear_identity::{AuditInfoError, AuthExchangeError, AuthFailureKind};
use serde::Serialize;
use uuid::Uuid;

use crate::tools::ToolResult;

/// Per-request metadata threaded through logs and audit events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskContext {
    pub correlation_id: String,
    pub metadata: BTreeMap<String, String>,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self { correlation_id: Uuid::new_v4().to_string(), metadata: BTreeMap::new() }
    }
}

impl TaskContext {
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), metadata: BTreeMap::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub id: String,
    pub client_id: String,
}

impl From<&AgentIdentity> for AgentSummary {
    fn from(identity: &AgentIdentity) -> Self {
        Self {
            name: identity.name().to_string(),
            id: identity.id().to_string(),
            client_id: identity.client_id().to_string(),
        }
    }
}

/// Outcome of one exchange attempt.
///
/// Only constructible from the exchange result itself, so `success` and
/// `has_mcp_token` always agree and a failure always carries its error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenExchangeReport {
    success: bool,
    error: Option<String>,
    error_kind: Option<AuthFailureKind>,
    flow: &'static str,
    audience: String,
    scopes: Vec<String>,
    granted_scopes: Vec<String>,
    has_mcp_token: bool,
}

impl TokenExchangeReport {
    pub fn from_outcome(
        outcome: &Result<ScopedToken, AuthExchangeError>,
        audience: &str,
        requested_scopes: &[String],
    ) -> Self {
        let (error, error_kind, granted_scopes) = match outcome {
            Ok(token) => (None, None, token.scopes.clone()),
            Err(error) => (Some(error.to_string()), Some(error.kind()), Vec::new()),
        };
        Self {
            success: outcome.is_ok(),
            error,
            error_kind,
            flow: FLOW_SUMMARY,
            audience: audience.to_string(),
            scopes: requested_scopes.to_vec(),
            granted_scopes,
            has_mcp_token: outcome.is_ok(),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<AuthFailureKind> {
        self.error_kind
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn granted_scopes(&self) -> &[String] {
        &self.granted_scopes
    }

    pub fn has_mcp_token(&self) -> bool {
        self.has_mcp_token
    }
}

/// Who is acting, and how sure we are about it.
///
/// `agent_auth_status` is `None` when the audit lookup itself failed; the
/// agent's status is then unknown rather than assumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SecuritySummary {
    pub user: UserClaims,
    pub agent_authenticated: bool,
    pub agent_auth_status: Option<AgentAuthStatus>,
    pub demo_mode: bool,
    pub audit_complete: bool,
    pub audit_error: Option<String>,
}

impl SecuritySummary {
    pub fn from_token_info(info: &TokenInfo) -> Self {
        Self {
            user: info.user.clone(),
            agent_authenticated: info.agent.is_authenticated(),
            agent_auth_status: Some(info.agent.status),
            demo_mode: info.demo_mode,
            audit_complete: true,
            audit_error: None,
        }
    }

    pub fn incomplete(user: UserClaims, demo_mode: bool, error: &AuditInfoError) -> Self {
        Self {
            user,
            agent_authenticated: false,
            agent_auth_status: None,
            demo_mode,
            audit_complete: false,
            audit_error: Some(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskResult {
    pub agent: AgentSummary,
    pub result: String,
    pub token_exchange: TokenExchangeReport,
    pub security: SecuritySummary,
    pub tools_called: Vec<ToolResult>,
}

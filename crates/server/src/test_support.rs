use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use progear_agent::{PlaceholderToolInvoker, ReasoningEngine, ReasoningEngineError};
use progear_core::identity::DEFAULT_SCOPES;
use progear_core::{AgentIdentity, InMemoryAuditSink, ResourceSelector, ScopedToken, TokenInfo};
use progear_identity::{
    AuditInfoError, AuthExchangeError, IdentityClient, OktaIdentityClient, UserAssertion,
};
use serde_json::json;

use crate::bootstrap::AppState;

pub struct EchoReasoning;

#[async_trait]
impl ReasoningEngine for EchoReasoning {
    async fn generate(&self, _system: &str, task: &str) -> Result<String, ReasoningEngineError> {
        Ok(format!("stub answer: {task}"))
    }
}

pub struct SlowReasoning;

#[async_trait]
impl ReasoningEngine for SlowReasoning {
    async fn generate(&self, _system: &str, _task: &str) -> Result<String, ReasoningEngineError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(String::new())
    }
}

/// Identity client whose exchange always fails with the given error.
pub struct FailingIdentity(pub AuthExchangeError);

#[async_trait]
impl IdentityClient for FailingIdentity {
    async fn exchange_token(
        &self,
        _assertion: &UserAssertion,
        _resource: ResourceSelector,
    ) -> Result<ScopedToken, AuthExchangeError> {
        Err(self.0.clone())
    }

    async fn token_info(&self, _assertion: &UserAssertion) -> Result<TokenInfo, AuditInfoError> {
        Err(AuditInfoError::Transport("introspection disabled in tests".to_string()))
    }

    fn audience(&self) -> &str {
        "api://progear-mcp"
    }

    fn is_demo_mode(&self) -> bool {
        false
    }
}

pub fn identity() -> AgentIdentity {
    AgentIdentity::new(
        "wlp8x5q7mvH86KvFJ0g7",
        "ProGear Sales Agent",
        "0oa8x5nsjp8aDUpB70g7",
        DEFAULT_SCOPES,
    )
    .expect("identity")
}

pub fn demo_state() -> AppState {
    AppState {
        identity: identity(),
        identity_client: Arc::new(OktaIdentityClient::demo(identity(), "api://progear-mcp")),
        reasoning: Arc::new(EchoReasoning),
        tools: Arc::new(PlaceholderToolInvoker),
        audit: Arc::new(InMemoryAuditSink::default()),
        request_timeout: Duration::from_secs(5),
    }
}

pub fn id_token(exp_offset_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "RS256"}).to_string());
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "sub": "00u8sales1",
            "email": "sam.rep@progear.example",
            "iss": "https://progear.okta.com",
            "exp": Utc::now().timestamp() + exp_offset_secs,
        })
        .to_string(),
    );
    format!("{header}.{payload}.c2ln")
}

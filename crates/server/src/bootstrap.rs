use std::sync::Arc;
use std::time::Duration;

use progear_agent::{
    HttpReasoningEngine, PlaceholderToolInvoker, ReasoningEngine, ReasoningEngineError,
    SalesAgent, ToolInvoker,
};
use progear_core::config::{AppConfig, ConfigError, LoadOptions};
use progear_core::{AgentIdentity, AuditSink, DomainError};
use progear_identity::{AuthExchangeError, IdentityClient, OktaIdentityClient, UserAssertion};
use thiserror::Error;
use tracing::info;

use crate::audit::TracingAuditSink;

/// Long-lived collaborators shared by every request.
///
/// Agents are cheap and built per request, so token caches never cross
/// user sessions.
#[derive(Clone)]
pub struct AppState {
    pub identity: AgentIdentity,
    pub identity_client: Arc<dyn IdentityClient>,
    pub reasoning: Arc<dyn ReasoningEngine>,
    pub tools: Arc<dyn ToolInvoker>,
    pub audit: Arc<dyn AuditSink>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn agent_for(&self, assertion: UserAssertion) -> SalesAgent {
        SalesAgent::new(
            self.identity.clone(),
            assertion,
            self.identity_client.clone(),
            self.reasoning.clone(),
        )
        .with_tool_invoker(self.tools.clone())
        .with_audit_sink(self.audit.clone())
    }
}

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent identity is invalid: {0}")]
    Identity(#[from] DomainError),
    #[error("identity client could not be created: {0}")]
    IdentityClient(#[source] AuthExchangeError),
    #[error("reasoning engine could not be created: {0}")]
    Reasoning(#[source] ReasoningEngineError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        agent_id = %config.agent.id,
        "starting application bootstrap"
    );

    let identity = config.agent_identity()?;
    let identity_client =
        OktaIdentityClient::from_app_config(&config).map_err(BootstrapError::IdentityClient)?;
    info!(
        event_name = "system.bootstrap.identity_ready",
        correlation_id = "bootstrap",
        agent_id = identity.id(),
        demo_mode = identity_client.is_demo_mode(),
        "identity client initialized"
    );

    let reasoning = HttpReasoningEngine::from_config(&config.llm).map_err(BootstrapError::Reasoning)?;
    info!(
        event_name = "system.bootstrap.reasoning_ready",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        model = %config.llm.model(),
        "reasoning engine initialized"
    );

    let state = AppState {
        identity,
        identity_client: Arc::new(identity_client),
        reasoning: Arc::new(reasoning),
        tools: Arc::new(PlaceholderToolInvoker),
        audit: Arc::new(TracingAuditSink),
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
    };

    Ok(Application { config, state })
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::path::PathBuf;
    use std::sync::OnceLock;

    use progear_core::config::{ConfigOverrides, LoadOptions};
    use tokio::sync::{Mutex, MutexGuard};

    use crate::bootstrap::bootstrap;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Holds the env lock with every `PROGEAR_*` variable removed, restoring them on drop.
    struct IsolatedEnv {
        saved: Vec<(String, String)>,
        _guard: MutexGuard<'static, ()>,
    }

    impl IsolatedEnv {
        async fn acquire() -> Self {
            let guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().await;
            let saved: Vec<(String, String)> =
                env::vars().filter(|(key, _)| key.starts_with("PROGEAR_")).collect();
            for (key, _) in &saved {
                env::remove_var(key);
            }
            Self { saved, _guard: guard }
        }
    }

    impl Drop for IsolatedEnv {
        fn drop(&mut self) {
            for (key, _) in env::vars().filter(|(key, _)| key.starts_with("PROGEAR_")) {
                env::remove_var(key);
            }
            for (key, value) in &self.saved {
                env::set_var(key, value);
            }
        }
    }

    // A missing explicit path skips the working-directory lookup, so a stray
    // `progear.toml` cannot leak into these tests.
    fn isolated_options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/progear.toml")),
            overrides,
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_in_live_mode_without_agent_key() {
        let _env = IsolatedEnv::acquire().await;
        let result = bootstrap(isolated_options(ConfigOverrides {
            okta_demo_mode: Some(false),
            okta_domain: Some("https://progear.okta.com".to_string()),
            okta_authorization_server_id: Some("aus8xdftgwlTMxp3u0g7".to_string()),
            llm_api_key: Some("sk-test".to_string()),
            ..ConfigOverrides::default()
        }))
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("private_key_jwk"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn demo_bootstrap_builds_request_scoped_agents() {
        let _env = IsolatedEnv::acquire().await;
        let app = bootstrap(isolated_options(ConfigOverrides {
            llm_api_key: Some("sk-test".to_string()),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("demo bootstrap should succeed");

        assert!(app.state.identity_client.is_demo_mode());
        assert_eq!(app.state.identity.id(), "wlp8x5q7mvH86KvFJ0g7");

        let first = app.state.agent_for(progear_identity::UserAssertion::new("a.b.c"));
        let second = app.state.agent_for(progear_identity::UserAssertion::new("a.b.c"));
        assert!(!first.has_cached_token().await);
        assert!(!second.has_cached_token().await);
    }

    #[tokio::test]
    async fn demo_override_wins_over_live_environment() {
        let _env = IsolatedEnv::acquire().await;
        env::set_var("PROGEAR_OKTA_DEMO_MODE", "false");
        env::set_var("PROGEAR_OKTA_DOMAIN", "https://progear.okta.com");
        env::set_var("PROGEAR_OKTA_AUTHORIZATION_SERVER_ID", "aus8xdftgwlTMxp3u0g7");

        let result = bootstrap(isolated_options(ConfigOverrides {
            okta_demo_mode: Some(true),
            llm_api_key: Some("sk-test".to_string()),
            ..ConfigOverrides::default()
        }))
        .await;

        let app = result.expect("override wins over environment");
        assert!(app.state.identity_client.is_demo_mode());
    }
}

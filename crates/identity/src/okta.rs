//! Okta ID-JAG (Cross App Access) identity client.
//!
//! Live mode performs the two-step exchange:
//! 1. user ID token + agent assertion → ID-JAG at the org token endpoint
//! 2. ID-JAG + agent assertion → resource access token at the custom
//!    authorization server
//!
//! Demo mode mints local placeholder tokens and never touches the network.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use progear_core::config::AppConfig;
use progear_core::token::TOKEN_TYPE_ID_JAG;
use progear_core::token::TOKEN_TYPE_ID_TOKEN;
use progear_core::{
    AgentAuthStatus, AgentAuthentication, AgentIdentity, ExchangeFlow, ResourceSelector,
    ScopedToken, TokenInfo, UserClaims,
};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assertion::{AgentSigningKey, CLIENT_ASSERTION_TYPE};
use crate::claims::UserAssertion;
use crate::error::{classify_token_error, AuditInfoError, AuthExchangeError, OAuthErrorBody};
use crate::IdentityClient;

const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const GRANT_TYPE_JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const STEP_ID_JAG: &str = "id_jag";
const STEP_ACCESS_TOKEN: &str = "access_token";

#[derive(Clone, Debug)]
pub struct IdentityClientConfig {
    pub identity: AgentIdentity,
    pub domain: String,
    pub authorization_server_id: String,
    pub audience: String,
    pub demo_mode: bool,
    pub timeout: Duration,
}

impl IdentityClientConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, AuthExchangeError> {
        let identity = config
            .agent_identity()
            .map_err(|error| AuthExchangeError::Configuration(error.to_string()))?;
        Ok(Self {
            identity,
            domain: config.okta.domain.trim_end_matches('/').to_string(),
            authorization_server_id: config.okta.authorization_server_id.trim().to_string(),
            audience: config.okta.audience.clone(),
            demo_mode: config.okta.demo_mode,
            timeout: Duration::from_secs(config.okta.timeout_secs),
        })
    }

    pub fn demo(identity: AgentIdentity, audience: impl Into<String>) -> Self {
        Self {
            identity,
            domain: String::new(),
            authorization_server_id: String::new(),
            audience: audience.into(),
            demo_mode: true,
            timeout: Duration::from_secs(15),
        }
    }

    fn org_token_endpoint(&self) -> String {
        format!("{}/oauth2/v1/token", self.domain)
    }

    fn introspect_endpoint(&self) -> String {
        format!("{}/oauth2/v1/introspect", self.domain)
    }

    fn issuer(&self) -> String {
        format!("{}/oauth2/{}", self.domain, self.authorization_server_id)
    }

    fn resource_token_endpoint(&self) -> String {
        format!("{}/v1/token", self.issuer())
    }
}

#[derive(Debug)]
pub struct OktaIdentityClient {
    config: IdentityClientConfig,
    http: Client,
    signing_key: Option<AgentSigningKey>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    sub: Option<String>,
    username: Option<String>,
    email: Option<String>,
    name: Option<String>,
    iss: Option<String>,
    exp: Option<i64>,
}

impl OktaIdentityClient {
    pub fn new(
        config: IdentityClientConfig,
        signing_key: Option<AgentSigningKey>,
    ) -> Result<Self, AuthExchangeError> {
        if !config.demo_mode {
            if signing_key.is_none() {
                return Err(AuthExchangeError::Configuration(
                    "live mode requires the agent private key".to_string(),
                ));
            }
            if config.domain.is_empty() || config.authorization_server_id.is_empty() {
                return Err(AuthExchangeError::Configuration(
                    "live mode requires an Okta domain and authorization server id".to_string(),
                ));
            }
        }

        let http = Client::builder().timeout(config.timeout).build().map_err(|error| {
            AuthExchangeError::Configuration(format!("could not build http client: {error}"))
        })?;

        Ok(Self { config, http, signing_key })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self, AuthExchangeError> {
        let client_config = IdentityClientConfig::from_app_config(config)?;
        let signing_key = if config.okta.demo_mode {
            None
        } else {
            config
                .agent
                .private_key_jwk
                .as_ref()
                .map(|jwk| AgentSigningKey::from_jwk(jwk.expose_secret()))
                .transpose()?
        };
        Self::new(client_config, signing_key)
    }

    pub fn demo(identity: AgentIdentity, audience: impl Into<String>) -> Self {
        Self {
            config: IdentityClientConfig::demo(identity, audience),
            http: Client::new(),
            signing_key: None,
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.config.identity
    }

    fn requested_scopes(&self, resource: ResourceSelector) -> Result<Vec<String>, AuthExchangeError> {
        let scopes = self.config.identity.scopes_for(resource);
        if scopes.is_empty() {
            return Err(AuthExchangeError::ScopeDenied {
                resource: resource.to_string(),
                reason: format!(
                    "agent `{}` is not configured for any `{resource}` scope",
                    self.config.identity.id()
                ),
            });
        }
        Ok(scopes)
    }

    fn client_assertion(&self, audience: &str) -> Result<String, AuthExchangeError> {
        let key = self.signing_key.as_ref().ok_or_else(|| {
            AuthExchangeError::Configuration("agent private key is not loaded".to_string())
        })?;
        key.client_assertion(self.config.identity.client_id(), audience)
    }

    fn demo_token(&self, resource: ResourceSelector, scopes: Vec<String>) -> ScopedToken {
        let token = format!("demo-mcp-token.{resource}.{}", Uuid::new_v4().simple());
        ScopedToken::new(token, self.config.audience.clone(), scopes, resource)
            .with_expires_in(Some(3600))
    }

    async fn request_id_jag(
        &self,
        assertion: &UserAssertion,
        resource: ResourceSelector,
        scopes: &[String],
    ) -> Result<TokenResponse, AuthExchangeError> {
        let endpoint = self.config.org_token_endpoint();
        let client_assertion = self.client_assertion(&endpoint)?;
        let form = vec![
            ("grant_type", GRANT_TYPE_TOKEN_EXCHANGE.to_string()),
            ("requested_token_type", TOKEN_TYPE_ID_JAG.to_string()),
            ("subject_token", assertion.expose().to_string()),
            ("subject_token_type", TOKEN_TYPE_ID_TOKEN.to_string()),
            ("audience", self.config.issuer()),
            ("scope", scopes.join(" ")),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()),
            ("client_assertion", client_assertion),
        ];
        self.post_token_form(STEP_ID_JAG, resource, &endpoint, &form).await
    }

    async fn redeem_id_jag(
        &self,
        id_jag: &str,
        resource: ResourceSelector,
        scopes: &[String],
    ) -> Result<TokenResponse, AuthExchangeError> {
        let endpoint = self.config.resource_token_endpoint();
        let client_assertion = self.client_assertion(&endpoint)?;
        let form = vec![
            ("grant_type", GRANT_TYPE_JWT_BEARER.to_string()),
            ("assertion", id_jag.to_string()),
            ("scope", scopes.join(" ")),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()),
            ("client_assertion", client_assertion),
        ];
        self.post_token_form(STEP_ACCESS_TOKEN, resource, &endpoint, &form).await
    }

    async fn post_token_form(
        &self,
        step: &str,
        resource: ResourceSelector,
        endpoint: &str,
        form: &[(&str, String)],
    ) -> Result<TokenResponse, AuthExchangeError> {
        debug!(
            event_name = "identity.token_request.sent",
            agent_id = self.config.identity.id(),
            step,
            endpoint,
            "posting token request"
        );

        let response = self
            .http
            .post(endpoint)
            .form(form)
            .send()
            .await
            .map_err(|error| AuthExchangeError::Transport(format!("{step}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| AuthExchangeError::Transport(format!("{step}: {error}")))?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<OAuthErrorBody>(&body).ok();
            let error = classify_token_error(step, resource, status.as_u16(), parsed);
            warn!(
                event_name = "identity.token_request.rejected",
                agent_id = self.config.identity.id(),
                step,
                status = status.as_u16(),
                error_kind = ?error.kind(),
                "token endpoint rejected request"
            );
            return Err(error);
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|error| {
            AuthExchangeError::MalformedResponse(format!("{step}: {error}"))
        })?;
        if token.access_token.trim().is_empty() {
            return Err(AuthExchangeError::MalformedResponse(format!(
                "{step}: token endpoint returned an empty access token"
            )));
        }
        Ok(token)
    }

    fn agent_authentication(&self, status: AgentAuthStatus) -> AgentAuthentication {
        AgentAuthentication {
            agent_id: self.config.identity.id().to_string(),
            client_id: self.config.identity.client_id().to_string(),
            has_private_key: self.signing_key.is_some(),
            status,
        }
    }

    fn flow(&self) -> ExchangeFlow {
        ExchangeFlow::id_jag(self.config.audience.clone(), self.config.identity.scopes().to_vec())
    }

    async fn introspect(
        &self,
        assertion: &UserAssertion,
        local: UserClaims,
    ) -> Result<(UserClaims, AgentAuthStatus), AuditInfoError> {
        let endpoint = self.config.introspect_endpoint();
        let client_assertion = self
            .client_assertion(&endpoint)
            .map_err(|error| AuditInfoError::Configuration(error.to_string()))?;
        let form = vec![
            ("token", assertion.expose().to_string()),
            ("token_type_hint", "id_token".to_string()),
            ("client_id", self.config.identity.client_id().to_string()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()),
            ("client_assertion", client_assertion),
        ];

        let response = self
            .http
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|error| AuditInfoError::Transport(error.to_string()))?;
        let status = response.status();
        let body =
            response.text().await.map_err(|error| AuditInfoError::Transport(error.to_string()))?;

        if status.is_success() {
            let introspected: IntrospectionResponse = serde_json::from_str(&body)
                .map_err(|error| AuditInfoError::MalformedResponse(error.to_string()))?;
            let claims = UserClaims {
                sub: introspected.sub,
                email: introspected.email,
                name: introspected.name,
                preferred_username: introspected.username,
                issuer: introspected.iss,
                expires_at: introspected.exp.and_then(|exp| chrono::DateTime::from_timestamp(exp, 0)),
                active: Some(introspected.active),
            };
            return Ok((claims.merged_with(&local), AgentAuthStatus::Verified));
        }

        let parsed = serde_json::from_str::<OAuthErrorBody>(&body).ok();
        let invalid_client = parsed
            .as_ref()
            .and_then(|body| body.error.as_deref())
            .is_some_and(|code| code == "invalid_client");
        if status == StatusCode::UNAUTHORIZED || invalid_client {
            warn!(
                event_name = "identity.introspection.agent_rejected",
                agent_id = self.config.identity.id(),
                status = status.as_u16(),
                "authorization server rejected the agent assertion"
            );
            return Ok((local, AgentAuthStatus::Rejected));
        }

        let message = parsed
            .and_then(|body| body.error_description.or(body.error))
            .unwrap_or_else(|| "introspection failed".to_string());
        Err(AuditInfoError::Upstream { status: status.as_u16(), message })
    }
}

#[async_trait]
impl IdentityClient for OktaIdentityClient {
    async fn exchange_token(
        &self,
        assertion: &UserAssertion,
        resource: ResourceSelector,
    ) -> Result<ScopedToken, AuthExchangeError> {
        assertion.usable_claims(Utc::now()).map_err(AuthExchangeError::InvalidUserAssertion)?;
        let scopes = self.requested_scopes(resource)?;

        if self.config.demo_mode {
            info!(
                event_name = "identity.exchange.demo_token_issued",
                agent_id = self.config.identity.id(),
                resource = %resource,
                "demo mode: issued local placeholder token"
            );
            return Ok(self.demo_token(resource, scopes));
        }

        let id_jag = self.request_id_jag(assertion, resource, &scopes).await?;
        let access = self.redeem_id_jag(&id_jag.access_token, resource, &scopes).await?;

        let granted = access
            .scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|granted| !granted.is_empty())
            .unwrap_or(scopes);

        info!(
            event_name = "identity.exchange.granted",
            agent_id = self.config.identity.id(),
            resource = %resource,
            granted_scopes = %granted.join(" "),
            "delegated token exchange succeeded"
        );

        Ok(ScopedToken::new(access.access_token, self.config.audience.clone(), granted, resource)
            .with_token_type(access.token_type.unwrap_or_else(|| "Bearer".to_string()))
            .with_expires_in(access.expires_in))
    }

    async fn token_info(&self, assertion: &UserAssertion) -> Result<TokenInfo, AuditInfoError> {
        let local = assertion.decode_claims().map_err(AuditInfoError::InvalidUserAssertion)?;

        let (user, status) = if self.config.demo_mode {
            (local, AgentAuthStatus::NotAttempted)
        } else {
            self.introspect(assertion, local).await?
        };

        Ok(TokenInfo {
            user,
            agent: self.agent_authentication(status),
            demo_mode: self.config.demo_mode,
            flow: self.flow(),
        })
    }

    fn audience(&self) -> &str {
        &self.config.audience
    }

    fn is_demo_mode(&self) -> bool {
        self.config.demo_mode
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use axum::{Form, Json, Router};
    use progear_core::identity::DEFAULT_SCOPES;
    use progear_core::{AgentAuthStatus, AgentIdentity, ResourceSelector};
    use serde_json::{json, Value};

    use super::{IdentityClientConfig, OktaIdentityClient};
    use crate::assertion::tests::{verify_assertion, RSA_JWK};
    use crate::assertion::AgentSigningKey;
    use crate::claims::tests::id_token;
    use crate::claims::UserAssertion;
    use crate::error::{AuditInfoError, AuthExchangeError, AuthFailureKind};
    use crate::IdentityClient;

    const AUTH_SERVER_ID: &str = "aus8xdftgwlTMxp3u0g7";
    const CLIENT_ID: &str = "0oa8x5nsjp8aDUpB70g7";

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Behavior {
        Grant,
        RejectAgent,
        DenyPolicy,
        IntrospectionDown,
    }

    #[derive(Clone)]
    struct MockOkta {
        behavior: Behavior,
        agent_jwk: Value,
        requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    impl MockOkta {
        fn record(&self, form: &HashMap<String, String>) {
            self.requests.lock().expect("requests lock").push(form.clone());
        }

        fn agent_ok(&self, form: &HashMap<String, String>) -> bool {
            if self.behavior == Behavior::RejectAgent {
                return false;
            }
            form.get("client_assertion")
                .and_then(|jws| verify_assertion(jws, &self.agent_jwk))
                .is_some_and(|claims| claims.iss == CLIENT_ID)
        }
    }

    fn oauth_error(status: StatusCode, code: &str, description: &str) -> (StatusCode, Json<Value>) {
        (status, Json(json!({"error": code, "error_description": description})))
    }

    async fn org_token(
        State(mock): State<MockOkta>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        mock.record(&form);
        if !mock.agent_ok(&form) {
            return oauth_error(StatusCode::UNAUTHORIZED, "invalid_client", "client assertion invalid");
        }
        if form.get("grant_type").map(String::as_str)
            != Some("urn:ietf:params:oauth:grant-type:token-exchange")
        {
            return oauth_error(StatusCode::BAD_REQUEST, "unsupported_grant_type", "expected exchange");
        }
        (
            StatusCode::OK,
            Json(json!({
                "access_token": "id-jag-token",
                "issued_token_type": "urn:ietf:params:oauth:token-type:id-jag",
                "token_type": "N_A",
                "expires_in": 300,
            })),
        )
    }

    async fn resource_token(
        State(mock): State<MockOkta>,
        Path(server_id): Path<String>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        mock.record(&form);
        if server_id != AUTH_SERVER_ID {
            return oauth_error(StatusCode::NOT_FOUND, "not_found", "unknown authorization server");
        }
        if !mock.agent_ok(&form) {
            return oauth_error(StatusCode::UNAUTHORIZED, "invalid_client", "client assertion invalid");
        }
        if mock.behavior == Behavior::DenyPolicy {
            return oauth_error(StatusCode::BAD_REQUEST, "access_denied", "no_matching_policy");
        }
        if form.get("assertion").map(String::as_str) != Some("id-jag-token") {
            return oauth_error(StatusCode::BAD_REQUEST, "invalid_grant", "unknown id-jag");
        }
        (
            StatusCode::OK,
            Json(json!({
                "access_token": "mcp-access-token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "mcp:read mcp:pricing",
            })),
        )
    }

    async fn introspect(
        State(mock): State<MockOkta>,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        mock.record(&form);
        if mock.behavior == Behavior::IntrospectionDown {
            return oauth_error(StatusCode::SERVICE_UNAVAILABLE, "server_error", "maintenance");
        }
        if !mock.agent_ok(&form) {
            return oauth_error(StatusCode::UNAUTHORIZED, "invalid_client", "client assertion invalid");
        }
        (
            StatusCode::OK,
            Json(json!({
                "active": true,
                "sub": "00u8sales1",
                "username": "sam.rep@progear.example",
                "iss": "https://progear.okta.com",
            })),
        )
    }

    async fn spawn_mock(behavior: Behavior) -> (String, MockOkta) {
        let mock = MockOkta {
            behavior,
            agent_jwk: agent_key().public_jwk(),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/oauth2/v1/token", post(org_token))
            .route("/oauth2/v1/introspect", post(introspect))
            .route("/oauth2/{server_id}/v1/token", post(resource_token))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock okta");
        let address = listener.local_addr().expect("mock address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock okta serves");
        });

        (format!("http://{address}"), mock)
    }

    fn identity() -> AgentIdentity {
        AgentIdentity::new("wlp8x5q7mvH86KvFJ0g7", "ProGear Sales Agent", CLIENT_ID, DEFAULT_SCOPES)
            .expect("identity")
    }

    fn agent_key() -> AgentSigningKey {
        AgentSigningKey::from_jwk(RSA_JWK).expect("agent key fixture")
    }

    fn live_client(domain: String) -> OktaIdentityClient {
        let config = IdentityClientConfig {
            identity: identity(),
            domain,
            authorization_server_id: AUTH_SERVER_ID.to_string(),
            audience: "api://progear-mcp".to_string(),
            demo_mode: false,
            timeout: Duration::from_secs(5),
        };
        OktaIdentityClient::new(config, Some(agent_key()))
            .expect("live client")
    }

    #[tokio::test]
    async fn live_exchange_runs_both_steps_and_reports_granted_scopes() {
        let (domain, mock) = spawn_mock(Behavior::Grant).await;
        let client = live_client(domain.clone());

        let token = client
            .exchange_token(&UserAssertion::new(id_token(3600)), ResourceSelector::All)
            .await
            .expect("exchange should succeed");

        assert_eq!(token.secret(), "mcp-access-token");
        assert_eq!(token.scopes, ["mcp:read", "mcp:pricing"]);
        assert_eq!(token.audience, "api://progear-mcp");
        assert_eq!(token.expires_in, Some(3600));

        let requests = mock.requests.lock().expect("requests lock").clone();
        assert_eq!(requests.len(), 2);
        let client_assertion = requests[0].get("client_assertion").expect("client assertion");
        let header: Value = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(client_assertion.split('.').next().expect("jws header"))
                .expect("base64url header"),
        )
        .expect("header json");
        assert_eq!(header["alg"], "RS256");
        assert_eq!(header["kid"], "agent-rsa-1");
        assert_eq!(
            requests[0].get("requested_token_type").map(String::as_str),
            Some("urn:ietf:params:oauth:token-type:id-jag")
        );
        assert_eq!(
            requests[0].get("audience").cloned(),
            Some(format!("{domain}/oauth2/{AUTH_SERVER_ID}"))
        );
        assert_eq!(
            requests[0].get("scope").map(String::as_str),
            Some("mcp:read mcp:inventory mcp:pricing mcp:customers")
        );
        assert_eq!(
            requests[1].get("grant_type").map(String::as_str),
            Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
        );
    }

    #[tokio::test]
    async fn rejected_agent_key_is_agent_authentication_error() {
        let (domain, _mock) = spawn_mock(Behavior::RejectAgent).await;
        let client = live_client(domain);

        let error = client
            .exchange_token(&UserAssertion::new(id_token(3600)), ResourceSelector::All)
            .await
            .expect_err("agent should be rejected");

        assert_eq!(error.kind(), AuthFailureKind::AgentAuthentication);
        assert!(error.to_string().contains("id_jag"));
    }

    #[tokio::test]
    async fn policy_denial_on_second_step_is_scope_denied() {
        let (domain, _mock) = spawn_mock(Behavior::DenyPolicy).await;
        let client = live_client(domain);

        let error = client
            .exchange_token(&UserAssertion::new(id_token(3600)), ResourceSelector::Pricing)
            .await
            .expect_err("policy should deny");

        assert!(error.is_policy_denial());
        assert!(matches!(
            error,
            AuthExchangeError::ScopeDenied { ref resource, ref reason }
                if resource == "pricing" && reason.starts_with("access_token:")
        ));
    }

    #[tokio::test]
    async fn unreachable_authorization_server_is_transport_error() {
        let client = live_client("http://127.0.0.1:9".to_string());

        let error = client
            .exchange_token(&UserAssertion::new(id_token(3600)), ResourceSelector::All)
            .await
            .expect_err("nothing listens on the discard port");

        assert!(matches!(error, AuthExchangeError::Transport(_)));
    }

    #[tokio::test]
    async fn expired_user_assertion_fails_before_network() {
        let client = live_client("http://127.0.0.1:9".to_string());

        let error = client
            .exchange_token(&UserAssertion::new(id_token(-30)), ResourceSelector::All)
            .await
            .expect_err("expired assertion");

        assert!(matches!(error, AuthExchangeError::InvalidUserAssertion(ref m) if m.contains("expired")));
    }

    #[tokio::test]
    async fn introspection_verifies_agent_and_merges_claims() {
        let (domain, _mock) = spawn_mock(Behavior::Grant).await;
        let client = live_client(domain);

        let info = client
            .token_info(&UserAssertion::new(id_token(3600)))
            .await
            .expect("introspection should succeed");

        assert_eq!(info.agent.status, AgentAuthStatus::Verified);
        assert!(info.agent.is_authenticated());
        assert!(!info.demo_mode);
        assert_eq!(info.user.active, Some(true));
        assert_eq!(info.user.preferred_username.as_deref(), Some("sam.rep@progear.example"));
        // name only exists in the locally decoded ID token
        assert_eq!(info.user.name.as_deref(), Some("Sam Rep"));
        assert_eq!(info.flow.scopes_requested.len(), 4);
    }

    #[tokio::test]
    async fn introspection_reports_rejected_agent_truthfully() {
        let (domain, _mock) = spawn_mock(Behavior::RejectAgent).await;
        let client = live_client(domain);

        let info = client
            .token_info(&UserAssertion::new(id_token(3600)))
            .await
            .expect("rejection is still a complete answer");

        assert_eq!(info.agent.status, AgentAuthStatus::Rejected);
        assert!(info.agent.has_private_key);
        assert!(!info.agent.is_authenticated());
        assert_eq!(info.user.sub.as_deref(), Some("00u8sales1"));
    }

    #[tokio::test]
    async fn introspection_outage_is_an_audit_error() {
        let (domain, _mock) = spawn_mock(Behavior::IntrospectionDown).await;
        let client = live_client(domain);

        let error = client
            .token_info(&UserAssertion::new(id_token(3600)))
            .await
            .expect_err("outage should surface");

        assert!(matches!(error, AuditInfoError::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn demo_mode_mints_selector_scoped_tokens_without_network() {
        let client = OktaIdentityClient::demo(identity(), "api://progear-mcp");

        let token = client
            .exchange_token(&UserAssertion::new(id_token(3600)), ResourceSelector::Inventory)
            .await
            .expect("demo exchange");

        assert!(token.secret().starts_with("demo-mcp-token.inventory."));
        assert_eq!(token.scopes, ["mcp:read", "mcp:inventory"]);

        let info = client.token_info(&UserAssertion::new(id_token(3600))).await.expect("info");
        assert!(info.demo_mode);
        assert!(!info.agent.has_private_key);
        assert_eq!(info.agent.status, AgentAuthStatus::NotAttempted);
    }

    #[tokio::test]
    async fn selector_outside_agent_scopes_is_denied_locally() {
        let narrow = AgentIdentity::new("agent-inv", "Inventory Agent", CLIENT_ID, ["mcp:inventory"])
            .expect("identity");
        let client = OktaIdentityClient::demo(narrow, "api://progear-mcp");

        let error = client
            .exchange_token(&UserAssertion::new(id_token(3600)), ResourceSelector::Customers)
            .await
            .expect_err("no customers scope");

        assert!(error.is_policy_denial());
    }

    #[tokio::test]
    async fn token_info_is_idempotent_for_same_assertion() {
        let client = OktaIdentityClient::demo(identity(), "api://progear-mcp");
        let assertion = UserAssertion::new(id_token(3600));

        let first = client.token_info(&assertion).await.expect("first");
        let second = client.token_info(&assertion).await.expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn live_mode_without_key_is_a_configuration_error() {
        let config = IdentityClientConfig {
            demo_mode: false,
            domain: "https://progear.okta.com".to_string(),
            authorization_server_id: AUTH_SERVER_ID.to_string(),
            ..IdentityClientConfig::demo(identity(), "api://progear-mcp")
        };

        let error = OktaIdentityClient::new(config, None).expect_err("key required");
        assert_eq!(error.kind(), AuthFailureKind::Configuration);
    }
}

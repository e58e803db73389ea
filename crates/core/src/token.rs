use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::identity::ResourceSelector;

pub const TOKEN_TYPE_ID_TOKEN: &str = "urn:ietf:params:oauth:token-type:id_token";
pub const TOKEN_TYPE_ID_JAG: &str = "urn:ietf:params:oauth:token-type:id-jag";
pub const TOKEN_TYPE_ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";

pub const FLOW_NAME: &str = "ID-JAG (Cross App Access)";
pub const FLOW_SUMMARY: &str = "User ID Token → JWT Bearer Assertion → MCP Access Token";
pub const AGENT_AUTHENTICATION_METHOD: &str = "JWT Bearer with private key";

/// Resource-scoped access token obtained through delegated exchange.
#[derive(Clone)]
pub struct ScopedToken {
    access_token: SecretString,
    pub token_type: String,
    pub audience: String,
    pub scopes: Vec<String>,
    pub resource: ResourceSelector,
    pub expires_in: Option<u64>,
    pub issued_at: DateTime<Utc>,
}

impl ScopedToken {
    pub fn new(
        access_token: impl Into<String>,
        audience: impl Into<String>,
        scopes: Vec<String>,
        resource: ResourceSelector,
    ) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            token_type: "Bearer".to_owned(),
            audience: audience.into(),
            scopes,
            resource,
            expires_in: None,
            issued_at: Utc::now(),
        }
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    pub fn with_expires_in(mut self, expires_in: Option<u64>) -> Self {
        self.expires_in = expires_in;
        self
    }

    pub fn secret(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl fmt::Debug for ScopedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("audience", &self.audience)
            .field("scopes", &self.scopes)
            .field("resource", &self.resource)
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub issuer: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Only known when the authorization server introspected the assertion.
    pub active: Option<bool>,
}

impl UserClaims {
    /// Fills every unset field from `fallback`.
    pub fn merged_with(self, fallback: &UserClaims) -> UserClaims {
        UserClaims {
            sub: self.sub.or_else(|| fallback.sub.clone()),
            email: self.email.or_else(|| fallback.email.clone()),
            name: self.name.or_else(|| fallback.name.clone()),
            preferred_username: self
                .preferred_username
                .or_else(|| fallback.preferred_username.clone()),
            issuer: self.issuer.or_else(|| fallback.issuer.clone()),
            expires_at: self.expires_at.or(fallback.expires_at),
            active: self.active.or(fallback.active),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAuthStatus {
    /// The authorization server accepted the agent's private-key assertion.
    Verified,
    /// The authorization server refused the agent's private-key assertion.
    Rejected,
    /// No private-key assertion was presented (demo mode).
    NotAttempted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAuthentication {
    pub agent_id: String,
    pub client_id: String,
    pub has_private_key: bool,
    pub status: AgentAuthStatus,
}

impl AgentAuthentication {
    pub fn is_authenticated(&self) -> bool {
        self.has_private_key && self.status == AgentAuthStatus::Verified
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeFlow {
    pub name: String,
    pub source_token_type: String,
    pub target_token_type: String,
    pub audience: String,
    pub scopes_requested: Vec<String>,
    pub agent_authentication: String,
}

impl ExchangeFlow {
    pub fn id_jag(audience: impl Into<String>, scopes_requested: Vec<String>) -> Self {
        Self {
            name: FLOW_NAME.to_owned(),
            source_token_type: TOKEN_TYPE_ID_TOKEN.to_owned(),
            target_token_type: TOKEN_TYPE_ACCESS_TOKEN.to_owned(),
            audience: audience.into(),
            scopes_requested,
            agent_authentication: AGENT_AUTHENTICATION_METHOD.to_owned(),
        }
    }
}

/// Audit record describing who is acting and how the exchange is wired.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub user: UserClaims,
    pub agent: AgentAuthentication,
    pub demo_mode: bool,
    pub flow: ExchangeFlow,
}

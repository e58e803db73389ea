use progear_core::ResourceSelector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable category of an [`AuthExchangeError`], safe to serialize to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureKind {
    InvalidUserAssertion,
    AgentAuthentication,
    ScopeDenied,
    Rejected,
    Transport,
    MalformedResponse,
    Configuration,
}

/// Delegated token exchange failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthExchangeError {
    #[error("user assertion rejected: {0}")]
    InvalidUserAssertion(String),
    #[error("agent authentication failed: {0}")]
    AgentAuthentication(String),
    #[error("requested scopes denied for `{resource}`: {reason}")]
    ScopeDenied { resource: String, reason: String },
    #[error("authorization server rejected the exchange ({code}): {description}")]
    Rejected { code: String, description: String },
    #[error("token exchange transport failure: {0}")]
    Transport(String),
    #[error("malformed token exchange response: {0}")]
    MalformedResponse(String),
    #[error("identity client misconfigured: {0}")]
    Configuration(String),
}

impl AuthExchangeError {
    pub fn kind(&self) -> AuthFailureKind {
        match self {
            Self::InvalidUserAssertion(_) => AuthFailureKind::InvalidUserAssertion,
            Self::AgentAuthentication(_) => AuthFailureKind::AgentAuthentication,
            Self::ScopeDenied { .. } => AuthFailureKind::ScopeDenied,
            Self::Rejected { .. } => AuthFailureKind::Rejected,
            Self::Transport(_) => AuthFailureKind::Transport,
            Self::MalformedResponse(_) => AuthFailureKind::MalformedResponse,
            Self::Configuration(_) => AuthFailureKind::Configuration,
        }
    }

    /// True when governance policy, not a fault, blocked the exchange.
    pub fn is_policy_denial(&self) -> bool {
        matches!(self, Self::ScopeDenied { .. })
    }
}

/// Fetching audit claims for a user assertion failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuditInfoError {
    #[error("user assertion could not be decoded: {0}")]
    InvalidUserAssertion(String),
    #[error("introspection transport failure: {0}")]
    Transport(String),
    #[error("introspection endpoint returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("malformed introspection response: {0}")]
    MalformedResponse(String),
    #[error("identity client misconfigured: {0}")]
    Configuration(String),
}

/// Standard OAuth 2.0 error body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct OAuthErrorBody {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Maps a failed token endpoint response onto the exchange taxonomy.
///
/// Every resulting message names the `step` that failed.
pub(crate) fn classify_token_error(
    step: &str,
    resource: ResourceSelector,
    status: u16,
    body: Option<OAuthErrorBody>,
) -> AuthExchangeError {
    let body = body.unwrap_or_default();
    let description = body.error_description.unwrap_or_else(|| format!("HTTP {status}"));
    let Some(code) = body.error else {
        return match status {
            401 => AuthExchangeError::AgentAuthentication(format!("{step}: {description}")),
            403 => AuthExchangeError::ScopeDenied {
                resource: resource.to_string(),
                reason: format!("{step}: {description}"),
            },
            _ => AuthExchangeError::Rejected {
                code: format!("http_{status}"),
                description: format!("{step}: {description}"),
            },
        };
    };

    match code.as_str() {
        "invalid_client" | "unauthorized_client" => {
            AuthExchangeError::AgentAuthentication(format!("{step}: {code}: {description}"))
        }
        "invalid_grant" => {
            AuthExchangeError::InvalidUserAssertion(format!("{step}: {code}: {description}"))
        }
        "invalid_request" if description.to_ascii_lowercase().contains("subject_token") => {
            AuthExchangeError::InvalidUserAssertion(format!("{step}: {code}: {description}"))
        }
        "access_denied" | "invalid_scope" | "no_matching_policy" => {
            AuthExchangeError::ScopeDenied {
                resource: resource.to_string(),
                reason: format!("{step}: {code}: {description}"),
            }
        }
        _ => AuthExchangeError::Rejected { code, description: format!("{step}: {description}") },
    }
}

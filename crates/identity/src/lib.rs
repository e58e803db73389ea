//! Delegated identity for the sales agent.
//!
//! The agent acts on behalf of a signed-in user by trading the user's ID
//! token for a resource-scoped access token, authenticating itself with its
//! own private key along the way.

pub mod assertion;
pub mod claims;
pub mod error;
pub mod okta;

use async_trait::async_trait;
use progear_core::{ResourceSelector, ScopedToken, TokenInfo};

pub use assertion::{AgentSigningKey, CLIENT_ASSERTION_TYPE};
pub use claims::UserAssertion;
pub use error::{AuditInfoError, AuthExchangeError, AuthFailureKind};
pub use okta::{IdentityClientConfig, OktaIdentityClient};

#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Trades the user's assertion for a token scoped to `resource`.
    async fn exchange_token(
        &self,
        assertion: &UserAssertion,
        resource: ResourceSelector,
    ) -> Result<ScopedToken, AuthExchangeError>;

    /// Describes the delegation for audit. Does not consume the assertion.
    async fn token_info(&self, assertion: &UserAssertion) -> Result<TokenInfo, AuditInfoError>;

    fn audience(&self) -> &str;

    fn is_demo_mode(&self) -> bool;
}

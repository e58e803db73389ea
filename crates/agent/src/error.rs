use progear_core::ApplicationError;
use progear_identity::AuthExchangeError;
use thiserror::Error;

use crate::tools::ToolError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error(transparent)]
    AuthExchange(#[from] AuthExchangeError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::AuthExchange(error) => match error {
                AuthExchangeError::InvalidUserAssertion(_) => {
                    Self::Authentication(error.to_string())
                }
                AuthExchangeError::ScopeDenied { .. } => Self::AccessDenied(error.to_string()),
                AuthExchangeError::Configuration(_) => Self::Configuration(error.to_string()),
                _ => Self::Integration(error.to_string()),
            },
            AgentError::Tool(ToolError::EmptyName) => {
                Self::Domain(progear_core::DomainError::InvariantViolation(
                    ToolError::EmptyName.to_string(),
                ))
            }
            AgentError::Tool(error) => Self::Integration(error.to_string()),
        }
    }
}

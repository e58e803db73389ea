pub mod audit;
pub mod config;
pub mod errors;
pub mod identity;
pub mod slot;
pub mod token;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, NoopAuditSink,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use identity::{AgentIdentity, ResourceSelector};
pub use slot::Slot;
pub use token::{
    AgentAuthStatus, AgentAuthentication, ExchangeFlow, ScopedToken, TokenInfo, UserClaims,
};

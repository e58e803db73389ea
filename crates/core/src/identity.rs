use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const SCOPE_READ: &str = "mcp:read";
pub const SCOPE_INVENTORY: &str = "mcp:inventory";
pub const SCOPE_PRICING: &str = "mcp:pricing";
pub const SCOPE_CUSTOMERS: &str = "mcp:customers";

/// Full orchestrator scope set, in the order the agent requests it.
pub const DEFAULT_SCOPES: [&str; 4] = [SCOPE_READ, SCOPE_INVENTORY, SCOPE_PRICING, SCOPE_CUSTOMERS];

/// Registered agent principal. Fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentIdentity {
    id: String,
    name: String,
    client_id: String,
    scopes: Vec<String>,
}

impl AgentIdentity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        client_id: impl Into<String>,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, DomainError> {
        let id = id.into();
        let client_id = client_id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvariantViolation("agent id must not be empty".to_owned()));
        }
        if client_id.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "agent client id must not be empty".to_owned(),
            ));
        }

        let mut ordered: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into();
            let scope = scope.trim();
            if !scope.is_empty() && !ordered.iter().any(|existing| existing == scope) {
                ordered.push(scope.to_owned());
            }
        }
        if ordered.is_empty() {
            return Err(DomainError::InvariantViolation(
                "agent must request at least one scope".to_owned(),
            ));
        }

        Ok(Self { id, name: name.into(), client_id, scopes: ordered })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Scopes this identity may request for `selector`, in identity order.
    pub fn scopes_for(&self, selector: ResourceSelector) -> Vec<String> {
        self.scopes.iter().filter(|scope| selector.admits(scope)).cloned().collect()
    }
}

/// Resource family a token exchange is requested for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSelector {
    All,
    Inventory,
    Pricing,
    Customers,
}

impl ResourceSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Inventory => "inventory",
            Self::Pricing => "pricing",
            Self::Customers => "customers",
        }
    }

    fn admits(&self, scope: &str) -> bool {
        match self {
            Self::All => true,
            Self::Inventory => matches!(scope, SCOPE_READ | SCOPE_INVENTORY),
            Self::Pricing => matches!(scope, SCOPE_READ | SCOPE_PRICING),
            Self::Customers => matches!(scope, SCOPE_READ | SCOPE_CUSTOMERS),
        }
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceSelector {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "inventory" => Ok(Self::Inventory),
            "pricing" => Ok(Self::Pricing),
            "customers" => Ok(Self::Customers),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown resource selector `{other}` (expected all|inventory|pricing|customers)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentIdentity, ResourceSelector, DEFAULT_SCOPES};
    use crate::errors::DomainError;

    fn identity() -> AgentIdentity {
        AgentIdentity::new("agent-1", "Sales Agent", "client-1", DEFAULT_SCOPES)
            .expect("identity should build")
    }

    #[test]
    fn scopes_are_deduplicated_in_request_order() {
        let identity = AgentIdentity::new(
            "agent-1",
            "Sales Agent",
            "client-1",
            ["mcp:pricing", "mcp:read", " mcp:pricing ", ""],
        )
        .expect("identity should build");

        assert_eq!(identity.scopes(), ["mcp:pricing", "mcp:read"]);
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let result = AgentIdentity::new("agent-1", "Sales Agent", "  ", DEFAULT_SCOPES);
        assert!(matches!(result, Err(DomainError::InvariantViolation(ref m)) if m.contains("client id")));
    }

    #[test]
    fn selector_narrows_scopes_to_resource_family() {
        let identity = identity();

        assert_eq!(identity.scopes_for(ResourceSelector::All).len(), 4);
        assert_eq!(identity.scopes_for(ResourceSelector::Pricing), ["mcp:read", "mcp:pricing"]);
        assert_eq!(
            identity.scopes_for(ResourceSelector::Customers),
            ["mcp:read", "mcp:customers"]
        );
    }

    #[test]
    fn selector_without_granted_family_yields_no_scopes() {
        let identity = AgentIdentity::new("agent-2", "Inventory Agent", "client-2", ["mcp:inventory"])
            .expect("identity should build");

        assert!(identity.scopes_for(ResourceSelector::Pricing).is_empty());
    }

    #[test]
    fn selector_parses_case_insensitively() {
        assert_eq!("Inventory".parse::<ResourceSelector>().ok(), Some(ResourceSelector::Inventory));
        assert!("orders".parse::<ResourceSelector>().is_err());
    }
}

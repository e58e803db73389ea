use progear_core::config::{AppConfig, LoadOptions};
use progear_identity::AgentSigningKey;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct PublicKeyReport {
    algorithm: &'static str,
    key_id: Option<String>,
    jwk: Value,
}

/// Prints the public JWK to register for the configured agent key.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "key",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        }
    };

    let Some(jwk) = config.agent.private_key_jwk.as_ref() else {
        return CommandResult::failure(
            "key",
            "config_validation",
            "agent.private_key_jwk is not set",
            2,
        );
    };

    match AgentSigningKey::from_jwk(jwk.expose_secret()) {
        Ok(key) => {
            let report = PublicKeyReport {
                algorithm: key.algorithm(),
                key_id: key.key_id().map(str::to_string),
                jwk: key.public_jwk(),
            };
            CommandResult::success_with(
                "key",
                format!("public {} key for agent `{}`", report.algorithm, config.agent.id),
                Some(report),
            )
        }
        Err(error) => CommandResult::failure("key", "agent_key", error.to_string(), 4),
    }
}

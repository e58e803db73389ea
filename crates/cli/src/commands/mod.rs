pub mod ask;
pub mod config;
pub mod doctor;
pub mod key;
pub mod tool;

use std::sync::Arc;

use progear_agent::{HttpReasoningEngine, SalesAgent};
use progear_core::config::{AppConfig, LoadOptions};
use progear_identity::{OktaIdentityClient, UserAssertion};
use serde::Serialize;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<T: Serialize> {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None::<()>)
    }

    pub fn success_with<T: Serialize>(
        command: &str,
        message: impl Into<String>,
        data: Option<T>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome::<()> {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload<T: Serialize>(payload: CommandOutcome<T>) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loads config and wires a one-shot agent for `id_token`.
fn prepare_agent(command: &str, id_token: &str) -> Result<(Runtime, SalesAgent), CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(command, "config_validation", format!("configuration issue: {error}"), 2)
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;

    let identity = config.agent_identity().map_err(|error| {
        CommandResult::failure(command, "config_validation", error.to_string(), 2)
    })?;
    let identity_client = OktaIdentityClient::from_app_config(&config).map_err(|error| {
        CommandResult::failure(command, "identity_client", error.to_string(), 4)
    })?;
    let reasoning = HttpReasoningEngine::from_config(&config.llm).map_err(|error| {
        CommandResult::failure(command, "reasoning_engine", error.to_string(), 4)
    })?;

    let agent = SalesAgent::new(
        identity,
        UserAssertion::new(id_token),
        Arc::new(identity_client),
        Arc::new(reasoning),
    );
    Ok((runtime, agent))
}

use progear_agent::{AgentError, TaskContext};
use serde_json::Value;

use crate::commands::{prepare_agent, CommandResult};

pub fn run(id_token: &str, name: &str, params: &str) -> CommandResult {
    let params: Value = match serde_json::from_str(params) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            return CommandResult::failure("tool", "invalid_input", "params must be a JSON object", 2)
        }
        Err(error) => {
            return CommandResult::failure(
                "tool",
                "invalid_input",
                format!("params are not valid JSON: {error}"),
                2,
            )
        }
    };

    let (runtime, agent) = match prepare_agent("tool", id_token) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let context = TaskContext::default().with_metadata("channel", "cli");
    match runtime.block_on(agent.call_tool(name, params, &context)) {
        Ok(result) => CommandResult::success_with("tool", format!("tool `{name}` called"), Some(result)),
        Err(AgentError::AuthExchange(error)) => {
            let class = if error.is_policy_denial() { "access_denied" } else { "auth_exchange" };
            CommandResult::failure("tool", class, error.to_string(), 5)
        }
        Err(AgentError::Tool(error)) => CommandResult::failure("tool", "tool_failure", error.to_string(), 6),
    }
}

use progear_agent::TaskContext;

use crate::commands::{prepare_agent, CommandResult};

pub fn run(id_token: &str, task: &str) -> CommandResult {
    if task.trim().is_empty() {
        return CommandResult::failure("ask", "invalid_input", "task must not be empty", 2);
    }

    let (runtime, agent) = match prepare_agent("ask", id_token) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let context = TaskContext::default().with_metadata("channel", "cli");
    let result = runtime.block_on(agent.process(task.trim(), &context));

    let message = if result.token_exchange.success() {
        "task processed with delegated token".to_string()
    } else {
        "task processed without delegated token".to_string()
    };
    CommandResult::success_with("ask", message, Some(result))
}

pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "progear",
    about = "ProGear sales agent operator CLI",
    long_about = "Inspect configuration, check identity readiness, and run the sales agent on behalf of a user.",
    after_help = "Examples:\n  progear doctor --json\n  progear config\n  progear key\n  progear ask --id-token \"$ID_TOKEN\" \"quote 20 helmets\"\n  progear tool --id-token \"$ID_TOKEN\" lookup_price --params '{\"sku\":\"HLM-20\"}'"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, agent key, identity mode, and reasoning provider readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the public JWK of the configured agent signing key")]
    Key,
    #[command(about = "Run one task through the sales agent and print the task result")]
    Ask {
        #[arg(long, env = "PROGEAR_ID_TOKEN", help = "The signed-in user's ID token")]
        id_token: String,
        #[arg(help = "Task text for the agent")]
        task: String,
    },
    #[command(about = "Call a downstream tool with a delegated token and print the tool result")]
    Tool {
        #[arg(long, env = "PROGEAR_ID_TOKEN", help = "The signed-in user's ID token")]
        id_token: String,
        #[arg(help = "Tool name")]
        name: String,
        #[arg(long, default_value = "{}", help = "Tool parameters as a JSON object")]
        params: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Key => commands::key::run(),
        Command::Ask { id_token, task } => commands::ask::run(&id_token, &task),
        Command::Tool { id_token, name, params } => commands::tool::run(&id_token, &name, &params),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

use std::process::ExitCode;

fn main() -> ExitCode {
    progear_cli::run()
}

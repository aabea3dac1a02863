use std::process::ExitCode;

fn main() -> ExitCode {
    loadconfig_cli::run()
}

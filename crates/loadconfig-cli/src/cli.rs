//! loadconfig CLI - build a configuration and print it as shell exports
//!
//! Usage:
//!   loadconfig -E="name: Jessica" -C=/etc/app/config.conf
//!   eval "$(loadconfig -C=app.conf prog --verbose)"

use colored::Colorize;
use loadconfig_core::{Config, Error};
use std::io::Write;
use std::process::ExitCode;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "LOADCONFIG_LOG";

/// Run the CLI with the process arguments
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env(LOG_ENV))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    run_with(args, &mut std::io::stdout(), &mut std::io::stderr())
}

/// Run the CLI with explicit arguments and output streams
pub fn run_with(args: Vec<String>, out: &mut impl Write, err: &mut impl Write) -> ExitCode {
    ExitCode::from(status(args, out, err))
}

fn status(args: Vec<String>, out: &mut impl Write, err: &mut impl Write) -> u8 {
    log::debug!("building config from {} arguments", args.len());
    match Config::construct("", Some(args)) {
        Ok(config) => {
            let exports = config.export();
            if !exports.is_empty() && writeln!(out, "{}", exports).is_err() {
                return 1;
            }
            0
        }
        Err(e) => report(&e, err),
    }
}

fn report(e: &Error, err: &mut impl Write) -> u8 {
    // Help, version and usage text is printed as the parser rendered it
    if let Some(code) = e.exit_code() {
        let _ = writeln!(err, "{}", e.message().unwrap_or_default());
        return u8::try_from(code).unwrap_or(1);
    }
    let _ = writeln!(err, "{}: {}", "Error".red(), e);
    1
}

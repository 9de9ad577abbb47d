// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! dbrxr Control CLI
//!
//! Runs code and installs packages on a remote cluster through an
//! execution context that lives for one invocation.
//!
//! Usage:
//!   dbrxr-ctl <command> [options]
//!
//! Commands:
//!   exec --language <lang> (--code <text> | --file <path>)
//!   install --runtime <host|guest> <package>...
//!   check --runtime <host|guest> <package>
//!   run --file <path> [--package <name>]...

mod config;

use std::fs;
use std::process::ExitCode;
use std::time::Duration;

use dbrxr_core::{CommandResult, ErrorPayload, Language, Runtime, Session, SessionError};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::CtlConfig;

const DEFAULT_CONTEXT_NAME: &str = "dbrxr-ctl";
const DEFAULT_LOG_FILTER: &str = "dbrxr_core=info,dbrxr_ctl=info";

fn print_usage() {
    eprintln!(
        r#"Usage: dbrxr-ctl <command> [options]

Run code on a remote cluster. Every command creates its own execution
context and destroys it before exiting, also on failure.

COMMANDS:
    exec                            Execute code and print the result
    install <package>...            Install packages (skipped when present)
    check <package>                 Report whether a package is installed
    run                             Install packages, then execute a file

EXEC OPTIONS:
    --language <lang>               python, r, scala or sql (required)
    --code <text>                   Code to execute
    --file <path>                   Read code from a file
    --timeout <seconds>             Command deadline

INSTALL / CHECK OPTIONS:
    --runtime <host|guest>          host = Python (pip), guest = R (CRAN) (default: host)

RUN OPTIONS:
    --file <path>                   Script to execute (required)
    --package <name>                Guest package to install first (repeatable)
    --language <lang>               Script language (default: r)

COMMON OPTIONS:
    --context <name>                Execution context name (default: dbrxr-ctl)

ENVIRONMENT:
    DBRX_HOST                       Workspace host (required)
    DBRX_API_TOKEN                  API token (required)
    CLUSTER_ID                      Target cluster (required)
    DBRX_POLL_INTERVAL_MS           Initial poll interval (default: 1000)
    DBRX_COMMAND_TIMEOUT_SECS       Command deadline (default: 600)
    DBRX_BRIDGE_MODE                check, assume or disabled (default: check)
    RUST_LOG                        Log filter (default: {DEFAULT_LOG_FILTER})

EXAMPLES:
    dbrxr-ctl exec --language r --code '1 + 1'
    dbrxr-ctl install --runtime guest mlflow data.table
    dbrxr-ctl run --file score.R --package mlflow
"#
    );
}

#[derive(Debug, PartialEq)]
enum Source {
    Inline(String),
    File(String),
}

impl Source {
    fn read(&self) -> Result<String, String> {
        match self {
            Source::Inline(code) => Ok(code.clone()),
            Source::File(path) => {
                fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Exec {
        language: Language,
        source: Source,
        context: String,
        timeout: Option<Duration>,
    },
    Install {
        runtime: Runtime,
        packages: Vec<String>,
        context: String,
    },
    Check {
        runtime: Runtime,
        package: String,
        context: String,
    },
    Run {
        file: String,
        packages: Vec<String>,
        language: Language,
        context: String,
    },
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    let mut language: Option<Language> = None;
    let mut runtime = Runtime::Host;
    let mut code: Option<String> = None;
    let mut file: Option<String> = None;
    let mut context = DEFAULT_CONTEXT_NAME.to_string();
    let mut timeout: Option<Duration> = None;
    let mut packages: Vec<String> = Vec::new();

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        return Ok(Command::Help);
    }

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--language" => {
                i += 1;
                let value = args.get(i).ok_or("--language requires a value")?;
                language = Some(value.parse()?);
            }
            "--runtime" => {
                i += 1;
                runtime = args.get(i).ok_or("--runtime requires a value")?.parse()?;
            }
            "--code" => {
                i += 1;
                code = Some(args.get(i).ok_or("--code requires a value")?.clone());
            }
            "--file" => {
                i += 1;
                file = Some(args.get(i).ok_or("--file requires a path")?.clone());
            }
            "--context" => {
                i += 1;
                context = args.get(i).ok_or("--context requires a name")?.clone();
            }
            "--timeout" => {
                i += 1;
                let secs: u64 = args
                    .get(i)
                    .ok_or("--timeout requires seconds")?
                    .parse()
                    .map_err(|_| "--timeout must be a number of seconds")?;
                timeout = Some(Duration::from_secs(secs));
            }
            "--package" => {
                i += 1;
                packages.push(args.get(i).ok_or("--package requires a name")?.clone());
            }
            arg if arg.starts_with("--") => return Err(format!("Unknown argument: {}", arg)),
            arg => packages.push(arg.to_string()),
        }
        i += 1;
    }

    match command {
        "exec" => {
            let source = match (code, file) {
                (Some(code), None) => Source::Inline(code),
                (None, Some(path)) => Source::File(path),
                (Some(_), Some(_)) => return Err("Use either --code or --file, not both".into()),
                (None, None) => return Err("--code or --file is required".into()),
            };
            if !packages.is_empty() {
                return Err(format!("Unexpected argument: {}", packages[0]));
            }
            Ok(Command::Exec {
                language: language.ok_or("--language is required")?,
                source,
                context,
                timeout,
            })
        }
        "install" => {
            if packages.is_empty() {
                return Err("At least one package is required".to_string());
            }
            Ok(Command::Install {
                runtime,
                packages,
                context,
            })
        }
        "check" => {
            let mut packages = packages.into_iter();
            let package = packages.next().ok_or("Package name required")?;
            if let Some(extra) = packages.next() {
                return Err(format!("Unexpected argument: {}", extra));
            }
            Ok(Command::Check {
                runtime,
                package,
                context,
            })
        }
        "run" => Ok(Command::Run {
            file: file.ok_or("--file is required")?,
            packages,
            language: language.unwrap_or(Language::R),
            context,
        }),
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

fn main() -> ExitCode {
    let cmd = match parse_args() {
        Ok(Command::Help) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match CtlConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut session = Session::connect(config.endpoint(), config.session_config());

    match execute_command(&mut session, cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn context_name(cmd: &Command) -> &str {
    match cmd {
        Command::Help => DEFAULT_CONTEXT_NAME,
        Command::Exec { context, .. }
        | Command::Install { context, .. }
        | Command::Check { context, .. }
        | Command::Run { context, .. } => context.as_str(),
    }
}

/// Create a context, run `cmd` in it, and destroy the context whatever the outcome.
fn execute_command(session: &mut Session, cmd: Command) -> Result<(), String> {
    let name = context_name(&cmd).to_string();
    session.create_context(&name).map_err(|e| e.to_string())?;

    let outcome = run_in_context(session, cmd);

    if let Err(e) = session.destroy_context() {
        // The context is gone locally either way; keep the command's own error.
        error!(error = %e, "Failed to destroy execution context");
        if outcome.is_ok() {
            return Err(e.to_string());
        }
    }
    outcome
}

fn run_in_context(session: &mut Session, cmd: Command) -> Result<(), String> {
    match cmd {
        Command::Help => Ok(()),

        Command::Exec {
            language,
            source,
            timeout,
            ..
        } => {
            let code = source.read()?;
            let result = match timeout {
                Some(timeout) => {
                    let interval = session.config().poll.interval;
                    session.execute_with(language, &code, timeout, interval)
                }
                None => session.execute(language, &code),
            };
            print_result(result)
        }

        Command::Install {
            runtime, packages, ..
        } => {
            for package in packages {
                let outcome = session
                    .install_package(runtime, &package)
                    .map_err(|e| e.to_string())?;
                print_json(&json!({
                    "package": package,
                    "runtime": runtime,
                    "outcome": outcome,
                }))?;
            }
            Ok(())
        }

        Command::Check {
            runtime, package, ..
        } => {
            let installed = session
                .is_package_installed(runtime, &package)
                .map_err(|e| e.to_string())?;
            print_json(&json!({
                "package": package,
                "runtime": runtime,
                "installed": installed,
            }))
        }

        Command::Run {
            file,
            packages,
            language,
            ..
        } => {
            let code = Source::File(file).read()?;
            for package in &packages {
                let outcome = session
                    .install_package(Runtime::Guest, package)
                    .map_err(|e| e.to_string())?;
                info!(package = %package, outcome = ?outcome, "Package ready");
            }
            print_result(session.execute(language, &code))
        }
    }
}

fn print_result(result: dbrxr_core::Result<CommandResult>) -> Result<(), String> {
    match result {
        Ok(result) => print_json(&result),
        Err(e) => {
            let (report, message) = failure_report(e);
            if let Some(report) = report {
                print_json(&report)?;
            }
            Err(message)
        }
    }
}

/// Remote failures are printed as an error result; anything else only exits.
fn failure_report(error: SessionError) -> (Option<CommandResult>, String) {
    match error {
        SessionError::Execution { summary, trace } => {
            let report = CommandResult::error(
                "",
                ErrorPayload {
                    summary: summary.clone(),
                    trace,
                },
            );
            (Some(report), summary)
        }
        other => (None, other.to_string()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).map_err(|e| e.to_string())?
    );
    Ok(())
}

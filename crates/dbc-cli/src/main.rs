use clap::{Parser, Subcommand};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use dbc_core::verifier::Severity;
use dbc_core::{Contract, ContractBuilder, Error, Phase, Value};
use tracing_subscriber::EnvFilter;

/// DBC - design by contract with logical variables
///
/// Check argument and return values against a contract file, describe
/// contracts, and verify them.
#[derive(Parser)]
#[command(name = "dbc", version, about, long_about = None)]
struct Cli {
    /// Print nothing on success
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log resolution steps (debug level)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check call arguments (and optionally a return value) against a contract
    Check {
        /// Path to the contract JSON file
        file: PathBuf,
        /// Arguments as a JSON array (positional) or object (by name)
        #[arg(long)]
        args: String,
        /// Return value as JSON
        #[arg(long)]
        result: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the slots, predicates and definitions of a contract
    Describe {
        /// Path to the contract JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report every verification diagnostic of a contract
    Verify {
        /// Path to the contract JSON file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

/// Exit status for each outcome
const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_ERROR: i32 = 2;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match cli.command {
        Commands::Check {
            file,
            args,
            result,
            json,
        } => cmd_check(&file, &args, result.as_deref(), json, cli.quiet),
        Commands::Describe { file, json } => cmd_describe(&file, json),
        Commands::Verify { file, json } => cmd_verify(&file, json, cli.quiet),
        Commands::Version => {
            println!("dbc {} (dbc-core {})", env!("CARGO_PKG_VERSION"), env!("CARGO_PKG_VERSION"));
            EXIT_OK
        }
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ── Commands ──────────────────────────────────────────────

fn cmd_check(file: &Path, args: &str, result: Option<&str>, json: bool, quiet: bool) -> i32 {
    let contract = match Contract::from_file(file) {
        Ok(c) => c,
        Err(e) => return report_error(&e, json),
    };
    tracing::debug!(file = %file.display(), contract = %contract.name(), "loaded contract");
    let outcome = parse_json("--args", args)
        .and_then(|args| {
            let result = result.map(|r| parse_json("--result", r)).transpose()?;
            Ok((args, result))
        })
        .and_then(|(args, result)| run_check(&contract, args, result));

    match outcome {
        Ok((phase, bindings)) => {
            if json {
                let bindings: serde_json::Map<String, serde_json::Value> =
                    bindings.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                let out = serde_json::json!({
                    "contract": contract.name(),
                    "status": "ok",
                    "checked": phase != Phase::Bypass,
                    "bindings": bindings,
                });
                println!("{}", out);
            } else if !quiet {
                if phase == Phase::Bypass {
                    println!("{} {}: checking disabled", "–".yellow(), contract.name());
                } else {
                    let what = if phase == Phase::Done {
                        "arguments and return value satisfy the contract"
                    } else {
                        "arguments satisfy the contract"
                    };
                    println!("{} {}: {}", "✓".green(), contract.name(), what);
                    for (name, value) in &bindings {
                        println!("  {} = {}", name.bold(), value);
                    }
                }
            }
            EXIT_OK
        }
        Err(e) => report_error(&e, json),
    }
}

fn run_check(
    contract: &Contract,
    args: serde_json::Value,
    result: Option<serde_json::Value>,
) -> dbc_core::Result<(Phase, BTreeMap<String, Value>)> {
    let mut check = match args {
        serde_json::Value::Array(items) => {
            contract.begin(items.iter().map(Value::from_json).collect())?
        }
        serde_json::Value::Object(fields) => contract.begin_named(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
        )?,
        other => {
            return Err(Error::ConfigurationError(format!(
                "--args must be a JSON array or object, got {}",
                other
            )))
        }
    };
    if let Some(result) = result {
        check.finish(&Value::from_json(&result))?;
    }
    Ok((check.phase(), check.environment().logical()))
}

fn cmd_describe(file: &Path, json: bool) -> i32 {
    let contract = match Contract::from_file(file) {
        Ok(c) => c,
        Err(e) => return report_error(&e, json),
    };
    let description = contract.describe();
    if json {
        match serde_json::to_string_pretty(&description) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                return EXIT_ERROR;
            }
        }
    } else {
        print!("{}", description);
    }
    EXIT_OK
}

fn cmd_verify(file: &Path, json: bool, quiet: bool) -> i32 {
    let report = match ContractBuilder::from_file(file).and_then(|b| b.verify()) {
        Ok(r) => r,
        Err(e) => return report_error(&e, json),
    };

    if json {
        let diagnostics: Vec<serde_json::Value> = report
            .errors()
            .into_iter()
            .chain(report.warnings())
            .map(|d| {
                serde_json::json!({
                    "severity": d.severity,
                    "kind": d.kind,
                    "site": d.site.as_ref().map(|s| s.to_string()),
                    "message": d.message,
                })
            })
            .collect();
        let out = serde_json::json!({
            "valid": report.is_valid(),
            "diagnostics": diagnostics,
        });
        println!("{}", out);
    } else {
        for diagnostic in report.errors().into_iter().chain(report.warnings()) {
            match diagnostic.severity {
                Severity::Error => eprintln!("{}", diagnostic.to_string().red()),
                Severity::Warning => eprintln!("{}", diagnostic.to_string().yellow()),
            }
        }
        if report.is_valid() && !quiet {
            println!("{} {}", "✓".green(), "contract is valid");
        }
    }

    if report.is_valid() {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}

// ── Helpers ───────────────────────────────────────────────

fn parse_json(flag: &str, text: &str) -> dbc_core::Result<serde_json::Value> {
    serde_json::from_str(text)
        .map_err(|e| Error::ConfigurationError(format!("{} is not valid JSON: {}", flag, e)))
}

/// Print an error and return its exit code
fn report_error(err: &Error, json: bool) -> i32 {
    let (status, code) = if err.is_violation() {
        ("violation", EXIT_FAILED)
    } else {
        ("error", EXIT_ERROR)
    };
    if json {
        let out = serde_json::json!({
            "status": status,
            "site": err.site().map(|s| s.to_string()),
            "error": err.to_string(),
        });
        println!("{}", out);
    } else if err.is_violation() {
        eprintln!("{} {}", "✗".red(), err);
    } else {
        eprintln!("{} {}", "error:".red().bold(), err);
    }
    code
}

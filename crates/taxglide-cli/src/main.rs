mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::calc::CalcArgs;
use commands::compare::CompareArgs;
use commands::optimize::OptimizeArgs;
use commands::scan::ScanArgs;
use commands::validate::ValidateArgs;

/// Two-tier income tax calculation and deduction optimization
#[derive(Parser)]
#[command(
    name = "taxglide",
    version,
    about = "Two-tier income tax calculation and deduction optimization",
    long_about = "Computes a federal plus sub-national progressive income tax from a \
                  schedule file and recommends the deduction with the best return on \
                  tax saved, retrying with alternate tolerance bands when the \
                  recommendation uses too little or too much of the ceiling."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute federal and local tax with a full breakdown
    Calc(CalcArgs),
    /// Recommend the deduction at the edge of the best-ROI plateau
    Optimize(OptimizeArgs),
    /// Tabulate tax and savings over a range of deductions
    Scan(ScanArgs),
    /// Show the brackets an income falls into before and after a deduction
    CompareBrackets(CompareArgs),
    /// Check a schedule file for structural errors
    Validate(ValidateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Calc(args) => commands::calc::run_calc(args),
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Scan(args) => commands::scan::run_scan(args),
        Commands::CompareBrackets(args) => commands::compare::run_compare(args),
        Commands::Validate(args) => commands::validate::run_validate(args),
        Commands::Version => {
            println!("taxglide {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

//! Ember CLI - validate and run particle system descriptions from the terminal

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{simulate, validate};

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "Deterministic CPU particle simulation", long_about = None)]
#[command(version)]
struct Cli {
    /// Log simulation events at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every system in a description and report configuration errors
    Validate {
        /// Path to the description file
        file: String,

        /// Output format (text, json)
        #[arg(long, default_value = "text", value_parser = parse_format)]
        format: String,
    },

    /// Step every system in a description and print particle counts
    Simulate {
        /// Path to the description file
        file: String,

        /// Number of steps to run
        #[arg(long, default_value = "100")]
        steps: u32,

        /// Step length in seconds
        #[arg(long, default_value_t = 1.0 / 60.0, value_parser = parse_dt)]
        dt: f32,

        /// Output format (text, json)
        #[arg(long, default_value = "text", value_parser = parse_format)]
        format: String,

        /// Print counts every K steps (0 prints only the summary)
        #[arg(long, default_value = "1")]
        every: u32,
    },
}

fn parse_format(s: &str) -> Result<String, String> {
    match s {
        "text" | "json" => Ok(s.to_string()),
        _ => Err(format!("unknown format '{}'; valid values: text, json", s)),
    }
}

fn parse_dt(s: &str) -> Result<f32, String> {
    let dt: f32 = s.trim().parse().map_err(|e| format!("invalid dt: {}", e))?;
    if !dt.is_finite() || dt < 0.0 {
        return Err(format!("dt must be a non-negative number, got {}", s));
    }
    Ok(dt)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Validate { file, format } => {
            validate::run(validate::ValidateArgs { file, format })
        }
        Commands::Simulate {
            file,
            steps,
            dt,
            format,
            every,
        } => simulate::run(simulate::SimulateArgs {
            file,
            steps,
            dt,
            format,
            every,
        }),
    }
}

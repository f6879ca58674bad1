mod app;
mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::app::AppConfig;
use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "rnsnow", version, about = "Reticulum serial-to-radio bridge")]
struct Cli {
    /// Configuration file (JSON).
    #[arg(long, value_name = "FILE", global = true, env = "RNSNOW_CONFIG")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). Defaults to the config file's, then info.
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            init_logging(cli.log_format, cli.log_level.unwrap_or(LogLevel::Info));
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    };
    let level = cli
        .log_level
        .or_else(|| config.log_level())
        .unwrap_or(LogLevel::Info);
    init_logging(cli.log_format, level);

    let ctx = Context {
        config,
        config_path: cli.config,
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
    };

    match cmd::run(cli.command, ctx) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

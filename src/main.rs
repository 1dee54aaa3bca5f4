mod commands;
mod config;
mod context;
mod executor;
mod infrastructure;
mod output;
mod traits;

use anyhow::Result;
use clap::Parser;
use commands::{ExportCommand, ExportOptions, ScopeCommand};
use std::process::ExitCode;

use crate::context::Context;
use crate::infrastructure::CancelToken;
use crate::traits::Verbosity;

/// Exit code for a run that finished but left resources behind
const EXIT_INCOMPLETE: u8 = 2;

#[derive(Parser)]
#[command(name = "tfexport")]
#[command(
    about = "Export existing Azure resources into Terraform/OpenTofu configuration and state",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    scope: ScopeCommand,

    #[command(flatten)]
    options: ExportOptions,

    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings, errors and the summary
    #[arg(short, long, global = true)]
    quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let verbosity = if cli.verbose {
        Verbosity::Verbose
    } else if cli.quiet {
        Verbosity::Quiet
    } else {
        Verbosity::Normal
    };
    let ctx = Context::new(verbosity);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    let handler_output = ctx.output.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        handler_output.warning("Interrupted; finishing imports in flight, then writing reports");
        handler_token.cancel();
    }) {
        ctx.output
            .warning(&format!("Could not install Ctrl-C handler: {}", e));
    }

    let report = ExportCommand::execute(&ctx, cli.options, cli.scope, &cancel)?;

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_INCOMPLETE))
    }
}

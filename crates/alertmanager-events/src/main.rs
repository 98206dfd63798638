//! alertmanager-events: Sensu check bridging Alertmanager alerts into Sensu events.

use std::process::ExitCode;

use alertmanager_events::{CheckConfig, CheckOptions, CheckOutcome, CheckState, Checker, PLUGIN_NAME};
use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Turn Alertmanager alerts into Sensu events
#[derive(Parser)]
#[command(name = "alertmanager-events")]
#[command(about = "Turn Alertmanager alerts into Sensu events and auto-close resolved ones")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    options: CheckOptions,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match run(&cli.options).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Check aborted");
            CheckOutcome {
                state: CheckState::Critical,
                message: format!("{e:#}"),
            }
        }
    };

    println!("{PLUGIN_NAME} {}: {}", outcome.state, outcome.message);
    ExitCode::from(u8::try_from(outcome.state.exit_code()).unwrap_or(2))
}

async fn run(options: &CheckOptions) -> Result<CheckOutcome> {
    let config = match CheckConfig::from_options(options) {
        Ok(config) => config,
        Err(e) => return Ok(CheckOutcome::from_config_error(&e)),
    };
    debug!(?config, "Starting check");

    let checker = Checker::from_config(config)?;
    let result = checker.run().await;
    if let Err(e) = &result {
        error!(error = %e, fatal = e.is_fatal(), "Check failed");
    }
    Ok(CheckOutcome::from_result(&result))
}

/// Logs go to stderr so stdout carries only the status line.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("alertmanager_events=debug,warn")
        } else {
            EnvFilter::new("alertmanager_events=info,warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

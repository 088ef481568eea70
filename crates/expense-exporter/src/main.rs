//! Expense Exporter - hotel invoice document export tool

use anyhow::Result;
use clap::Parser;
use expense_exporter::pipeline::RunController;
use expense_exporter::ExporterConfig;
use exporter_common::logging::{init_logging, LogConfig, LogLevel};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "expense-exporter")]
#[command(author, version, about = "Hotel invoice document export pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Process an input spreadsheet
    Run {
        /// Input artifact path (overrides EXPORTER_INPUT)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output artifact path (overrides EXPORTER_OUTPUT)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Environment settings win; the verbose flag only raises the default.
    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose && log_config.level == LogLevel::Info {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config)?;

    match cli.command {
        Command::Run { input, output } => {
            let mut config = ExporterConfig::load()?;
            if let Some(input) = input {
                config.input_path = input;
            }
            if let Some(output) = output {
                config.output_path = output;
            }
            config.validate()?;

            let controller = RunController::from_config(&config).await?;

            // First Ctrl-C winds the run down after in-flight work reaches a
            // terminal state.
            let shutdown = controller.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current row");
                    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
                }
            });

            let summary = controller.run().await?;

            info!(
                total_rows = summary.total_rows,
                succeeded = summary.succeeded,
                partial = summary.partial,
                failed = summary.failed,
                no_links = summary.no_links,
                "Export finished"
            );
        }
    }

    Ok(())
}

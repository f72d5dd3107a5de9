use anyhow::{Context, Result};
use apk_repack::cli::{
    check_tools, load_config, print_pipeline_result, print_tool_report, run_patch, ApkRepackCli,
    Commands,
};
use apk_repack::tools::ToolAvailabilityChecker;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApkRepackCli::parse();

    let level = match cli.verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting apk-repack v{}", env!("CARGO_PKG_VERSION"));

    let success = match cli.command {
        Commands::Patch(args) => {
            let result = run_patch(&args).await.context("Invalid patch invocation")?;
            print_pipeline_result(&result, args.format)?;
            if let Some((stage, err)) = result.failure() {
                error!("Repackaging failed at {}: {}", stage, err);
            }
            result.is_success()
        }
        Commands::CheckTools { config, format } => {
            let config = load_config(config.as_deref()).context("Failed to load configuration")?;
            let report = check_tools(&config, &ToolAvailabilityChecker::new());
            print_tool_report(&report, format)?;
            report.all_available()
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

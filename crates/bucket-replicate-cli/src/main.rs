//! bucket-replicate CLI - One-way replication between S3-compatible buckets.

use bucket_replicate::{Config, Orchestrator, ReplicateError, SyncReport};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "bucket-replicate")]
#[command(about = "One-way replication between S3-compatible buckets")]
#[command(version)]
struct Cli {
    /// Path to INI (or YAML) configuration file
    #[arg(short = 'c', long, default_value = "config.ini")]
    configfile: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, ReplicateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(ReplicateError::Config)?;

    let config = Config::load(&cli.configfile)?;
    info!("Loaded configuration from {:?}", cli.configfile);

    let orchestrator = Orchestrator::connect(config).await?;
    let outcome = orchestrator.execute().await;

    if cli.output_json {
        println!("{}", outcome.report.to_json()?);
    } else {
        print_summary(&outcome.report);
    }

    let report = outcome.into_result()?;
    Ok(report.exit_code())
}

fn print_summary(report: &SyncReport) {
    if report.status == "failed" {
        println!("\nReplication failed");
    } else if report.has_unrecovered() {
        println!("\nReplication completed with failures");
    } else {
        println!("\nReplication completed!");
    }
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!(
        "  Objects: {} listed, {} synced, {} resynced",
        report.objects_listed, report.objects_synced, report.objects_resynced
    );
    println!("  Bytes: {}", report.bytes_synced);
    if let Some(ref cursor) = report.resume_cursor {
        println!("  Resume marker: {}", cursor);
    }

    if report.has_unrecovered() {
        println!("  Unrecovered: {}", report.unrecovered_keys.join(", "));
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

//! CLI entry point for Camcorder Ingest
//!
//! Runs the ingest stage, then transcodes what it brought in.

use camcorder_ingest::{
    check_encoder_available, progress_channel, spawn_progress_consumer, Config, FfmpegConcatenator,
    FfmpegEncoder, IngestPipeline, IngestReport, ProgressBoard, TranscodeOrchestrator,
    TranscodeSummary,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Camcorder Ingest - copy new AVCHD recordings exactly once and transcode them
#[derive(Parser, Debug)]
#[command(name = "camcorder-ingest")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Only ingest; do not run any transcode profile
    #[arg(long)]
    skip_transcode: bool,

    /// Replace transcoded outputs that already exist
    #[arg(long)]
    overwrite: bool,

    /// Skip the encoder availability check
    #[arg(long)]
    skip_checks: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Log per-file details
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config from {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if args.overwrite {
        config.transcode.overwrite = true;
    }
    for warning in config.validate() {
        warn!("Config: {}", warning);
    }

    if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
    } else {
        match check_encoder_available(&config.transcode.encoder_program) {
            Ok(major) => info!(
                "Using {} (major version {})",
                config.transcode.encoder_program, major
            ),
            Err(e) => {
                error!("Startup check failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let (progress_tx, progress_rx) = progress_channel();
    let consumer = spawn_progress_consumer(progress_rx);

    let ingest = match run_ingest(config.clone(), progress_tx.clone()).await {
        Ok(report) => report,
        Err(e) => {
            error!("Ingest aborted: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let transcode = if args.skip_transcode || !config.transcode.enabled {
        info!("Transcoding disabled");
        None
    } else if ingest.transferred.is_empty() {
        info!("No new clips to transcode");
        None
    } else {
        let encoder = Arc::new(FfmpegEncoder::new(
            config.transcode.encoder_program.clone(),
            config.transcode.deinterlace_filter.clone(),
        ));
        let summary = TranscodeOrchestrator::new(encoder)
            .run(
                &ingest.transferred,
                &config.transcode.profiles,
                config.transcode.overwrite,
                progress_tx.clone(),
            )
            .await;
        Some(summary)
    };
    drop(progress_tx);

    let board = match consumer.await {
        Ok(board) => board,
        Err(e) => {
            warn!("Progress consumer ended abnormally: {}", e);
            ProgressBoard::default()
        }
    };

    if args.json {
        let report = serde_json::json!({
            "ingest": ingest,
            "transcode": transcode,
            "progress": board,
        });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Could not serialize run report: {}", e),
        }
    } else {
        print_summary(&ingest, transcode.as_ref());
    }

    ExitCode::SUCCESS
}

/// Loads the config, falling back to defaults when the file does not exist.
fn load_config(path: &Path) -> Result<Config, camcorder_ingest::config::ConfigError> {
    if path.exists() {
        info!("Loading configuration from {}", path.display());
        Config::load(path)
    } else {
        warn!(
            "Config file {} not found, continuing with defaults",
            path.display()
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Stage 1 runs on a blocking thread; Stage 2 only starts once it returns.
async fn run_ingest(
    config: Config,
    progress: camcorder_ingest::ProgressSender,
) -> Result<IngestReport, String> {
    tokio::task::spawn_blocking(move || {
        let concatenator = FfmpegConcatenator::new(config.transcode.encoder_program.clone());
        IngestPipeline::new(&config, &concatenator, progress)
            .run()
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| format!("ingest task panicked: {}", e))?
}

fn print_summary(ingest: &IngestReport, transcode: Option<&TranscodeSummary>) {
    println!(
        "Ingest: {} transferred, {} already ingested, {} failed",
        ingest.transferred.len(),
        ingest.already_ingested,
        ingest.failures.len()
    );
    for clip in &ingest.transferred {
        println!("  + {}", clip.display());
    }
    for failure in &ingest.failures {
        println!("  ! {}: {}", failure.path.display(), failure.reason);
    }
    for failure in &ingest.ledger_failures {
        println!("  ! {}", failure);
    }
    if !ingest.unclosed_group.is_empty() {
        println!(
            "  {} split parts left on the device (no closing part yet)",
            ingest.unclosed_group.len()
        );
    }

    if let Some(summary) = transcode {
        for profile in &summary.profiles {
            println!(
                "Transcode [{}]: {} encoded, {} skipped, {} failed",
                profile.profile_id,
                profile.encoded.len(),
                profile.skipped.len(),
                profile.failed.len()
            );
            for failure in &profile.failed {
                println!("  ! {}: {}", failure.clip.display(), failure.reason);
            }
        }
    }
}

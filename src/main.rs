//! Engagement Agent CLI
//!
//! Privacy-first webcam engagement estimation.

use clap::{Parser, Subcommand, ValueEnum};
use engagement_agent::{
    config::Config,
    core::{summary_report, ScorePoint, SessionAggregator},
    transparency::TransparencyStats,
    PRIVACY_DECLARATION, VERSION,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "engagement-agent")]
#[command(version = VERSION)]
#[command(about = "Privacy-first webcam engagement estimation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Start capturing and uploading engagement features
    Start {
        /// Recorded detector output to replay (JSON Lines, one array of faces per line)
        #[arg(long)]
        replay: PathBuf,

        /// Sampling rate in frames per second (capped at 5)
        #[arg(long)]
        fps: Option<f64>,

        /// Buffered records that trigger an immediate upload
        #[arg(long)]
        batch_size: Option<usize>,

        /// Upload interval in seconds
        #[arg(long)]
        batch_interval: Option<u64>,

        /// User id attached to every record
        #[arg(long)]
        user_id: Option<String>,

        /// Backend session the batches belong to
        #[arg(long)]
        session_id: Option<u64>,

        /// Backend base URL
        #[arg(long)]
        backend: Option<String>,

        /// Bearer token (overrides the configured token file)
        #[arg(long)]
        token: Option<String>,
    },

    /// Aggregate a saved score series offline
    Analyze {
        /// JSON array of {timestamp, score} points
        series: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,
    },

    /// Run the session aggregation service
    #[cfg(feature = "server")]
    Serve {
        /// Port to bind on 127.0.0.1
        #[arg(long, default_value = "8000")]
        port: u16,
    },

    /// Show current capture status
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            replay,
            fps,
            batch_size,
            batch_interval,
            user_id,
            session_id,
            backend,
            token,
        } => {
            let mut config = Config::load().unwrap_or_else(|e| {
                eprintln!("Warning: Could not load config, using defaults: {e}");
                Config::default()
            });
            if let Some(fps) = fps {
                config.sample_fps = fps;
            }
            if let Some(size) = batch_size {
                config.batch_size = size;
            }
            if let Some(secs) = batch_interval {
                config.batch_interval = std::time::Duration::from_secs(secs.max(1));
            }
            if user_id.is_some() {
                config.user_id = user_id;
            }
            if session_id.is_some() {
                config.session_id = session_id;
            }
            if let Some(backend) = backend {
                config.gateway.base_url = backend;
            }
            cmd_start(config, &replay, token);
        }
        Commands::Analyze { series, format } => {
            cmd_analyze(&series, format);
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => {
            cmd_serve(port);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Privacy => {
            cmd_privacy();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    }
}

/// Resolves once Ctrl+C is pressed.
fn ctrlc_shutdown() -> tokio::sync::watch::Receiver<bool> {
    let (tx, rx) = tokio::sync::watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(true);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
    rx
}

#[cfg(feature = "gateway")]
fn cmd_start(config: Config, replay: &Path, token: Option<String>) {
    use engagement_agent::core::{BatchUploader, CaptureLoop, FeatureExtractor, StopReason};
    use engagement_agent::gateway::{GatewayClient, GatewayConfig};
    use engagement_agent::landmarks::ReplaySource;
    use engagement_agent::transparency::create_shared_log_with_persistence;

    init_tracing();

    println!("Engagement Agent v{VERSION}");
    println!();

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let mut gateway_config = GatewayConfig::from_settings(&config.gateway);
    if token.is_some() {
        gateway_config.token = token;
    }
    let client = match GatewayClient::new(gateway_config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let settings = config.capture_settings();
    println!("Starting capture...");
    println!("  Replay: {}", replay.display());
    println!("  Sample interval: {}ms", settings.sample_interval().as_millis());
    println!(
        "  Batches: {} records or every {}s",
        settings.batch_size,
        settings.batch_interval.as_secs()
    );
    println!("  Backend: {}", client.config().base_url);
    if client.config().token.is_none() {
        println!("  Token: none (requests sent without authorization)");
    }
    match config.session_id {
        Some(id) => println!("  Session: {id}"),
        None => println!("  Session: latest open session on the backend"),
    }

    let log = create_shared_log_with_persistence(config.transparency_path());
    let rt = runtime();

    rt.block_on(async {
        match client.health().await {
            Ok(true) => println!("  Backend connection: OK"),
            Ok(false) => eprintln!("Warning: Backend health check failed"),
            Err(e) => eprintln!("Warning: Could not reach backend, records will be buffered: {e}"),
        }
        println!();
        println!("Press Ctrl+C to stop");
        println!();

        let uploader = BatchUploader::new(client, config.max_buffered.max(1))
            .with_user_id(config.user_id.clone())
            .with_session_id(config.session_id);
        let capture = CaptureLoop::new(
            settings,
            FeatureExtractor::new(config.extractor.clone()),
            uploader,
            log.clone(),
        );
        println!("Capture ID: {}", capture.capture_id());

        let mut stop = ctrlc_shutdown();
        let shutdown = async move {
            let _ = stop.changed().await;
        };

        match capture.run(ReplaySource::from_jsonl(replay), shutdown).await {
            Ok(outcome) => {
                if outcome.stop_reason == StopReason::SourceExhausted {
                    println!("Replay finished.");
                }
                if let Some(count) = outcome.final_flush {
                    println!("Final upload: {count} record(s)");
                }
                if outcome.discarded > 0 {
                    eprintln!(
                        "Warning: {} record(s) could not be delivered",
                        outcome.discarded
                    );
                }
            }
            Err(e) => {
                eprintln!("Error: {e}");
            }
        }
    });

    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{}", log.summary());
}

#[cfg(not(feature = "gateway"))]
fn cmd_start(_config: Config, _replay: &Path, _token: Option<String>) {
    eprintln!("Error: capture needs the `gateway` feature to upload batches");
    std::process::exit(1);
}

fn cmd_analyze(path: &Path, format: ReportFormat) {
    let config = Config::load().unwrap_or_default();

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading {path:?}: {e}");
            std::process::exit(1);
        }
    };
    let points: Vec<ScorePoint> = match serde_json::from_str(&content) {
        Ok(points) => points,
        Err(e) => {
            eprintln!("Error parsing {path:?}: {e}");
            std::process::exit(1);
        }
    };

    let analytics = SessionAggregator::new(config.analytics).comprehensive(&points);
    match format {
        ReportFormat::Json => match serde_json::to_string_pretty(&analytics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing: {e}");
                std::process::exit(1);
            }
        },
        ReportFormat::Text => println!("{}", summary_report(&analytics)),
    }
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16) {
    use engagement_agent::server::{self, ServerConfig};

    init_tracing();

    let config = Config::load().unwrap_or_default();
    let server_config = ServerConfig::new(port).with_analytics(config.analytics);

    let rt = runtime();
    rt.block_on(async {
        let (addr, shutdown_tx) = match server::run(server_config).await {
            Ok(bound) => bound,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };
        println!("Engagement service listening on http://{addr}");
        println!("Press Ctrl+C to stop");

        let mut stop = ctrlc_shutdown();
        let _ = stop.changed().await;
        let _ = shutdown_tx.send(());
    });
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Engagement Agent Status");
    println!("=======================");
    println!();

    println!("Configuration:");
    println!("  Sample rate: {} fps", config.sample_fps);
    println!(
        "  Batches: {} records or every {}s",
        config.batch_size,
        config.batch_interval.as_secs()
    );
    println!("  Backend: {}", config.gateway.base_url);
    println!();

    let stats_path = config.transparency_path();
    if !stats_path.exists() {
        println!("No previous capture data found.");
        return;
    }

    let stats = std::fs::read_to_string(&stats_path)
        .ok()
        .and_then(|content| serde_json::from_str::<TransparencyStats>(&content).ok());
    match stats {
        Some(stats) => {
            println!("Cumulative Statistics:");
            println!("  Frames sampled: {}", stats.frames_sampled);
            println!("  Ticks skipped (not ready): {}", stats.ticks_skipped);
            println!("  Frames without a face: {}", stats.frames_without_face);
            println!("  Unrecognised landmarks: {}", stats.unrecognised_landmarks);
            println!("  Records buffered: {}", stats.records_buffered);
            println!(
                "  Batches sent: {} (failed: {})",
                stats.batches_sent, stats.batches_failed
            );
            println!("  Records dropped on overflow: {}", stats.records_dropped);
        }
        None => eprintln!("Warning: Could not read {stats_path:?}"),
    }
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

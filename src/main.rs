//! lumabridge CLI
//!
//! Loads configuration, brings the appliance up leaves-first, runs the
//! render loop on a dedicated thread, and handles signals for a cooperative
//! shutdown.

use clap::Parser;
use lumabridge::{
    capture::PatternCapture,
    clock::MonotonicClock,
    config::Config,
    display::HeadlessDevice,
    input::RemoteInput,
    pipeline::{Pipeline, PipelineDevices},
    processing::SoftwareGpu,
};

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumabridge")]
#[command(about = "HDR Video Processing Appliance")]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Configuration file path
    #[arg(short, long, default_value = "/etc/lumabridge/lumabridge.ini")]
    config: PathBuf,

    /// Run as daemon (suppress console output)
    #[arg(short, long)]
    daemon: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Strict parsing only when validating; at runtime bad values fall back
    // to defaults with a warning once logging is up
    let config = match Config::load(&cli.config, cli.validate_config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if cli.validate_config {
        if let Err(err) = config.validate() {
            eprintln!("configuration invalid: {err}");
            std::process::exit(1);
        }
        println!("Configuration validation successful");
        return Ok(());
    }

    init_logging(&config, cli.daemon)?;
    tracing::info!("lumabridge v{} starting", lumabridge::VERSION);
    tracing::info!("configuration: {}", cli.config.display());

    let clock = Arc::new(MonotonicClock::new());

    // Device adapters. The built-in pattern source and headless display
    // stand in until a capture-card / DRM adapter is registered; both sides
    // are trait objects, so vendor glue plugs in here.
    let devices = PipelineDevices {
        capture: Box::new(PatternCapture::new()),
        display: Box::new(HeadlessDevice::new()),
        gpu: Box::new(SoftwareGpu::new()),
    };
    let (_remote_handle, remote) = RemoteInput::channel();

    let mut pipeline = match Pipeline::new(config, devices, remote, clock) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            tracing::error!("initialization failed: {err}");
            std::process::exit(1);
        }
    };
    let running = pipeline.running_flag();

    if !cli.daemon {
        println!("lumabridge is running. Press Ctrl+C to stop.");
    }

    // The render loop blocks, so it gets its own thread; the async shell
    // just waits for a shutdown signal
    let render = std::thread::spawn(move || {
        let result = pipeline.run();
        let stats = pipeline.stats();
        (result, stats)
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    running.store(false, Ordering::SeqCst);

    let (result, stats) = render
        .join()
        .map_err(|_| anyhow::anyhow!("render thread panicked"))?;
    if let Err(err) = result {
        tracing::error!("render loop failed: {err}");
        std::process::exit(1);
    }

    if !cli.daemon {
        println!("\n=== Final Statistics ===");
        println!("Frames presented: {}", stats.frames_presented);
        println!("Frames repeated:  {}", stats.frames_repeated);
        println!("Process failures: {}", stats.process_failures);
        println!("\nlumabridge stopped cleanly.");
    }
    Ok(())
}

fn init_logging(config: &Config, daemon: bool) -> anyhow::Result<()> {
    let default_level = if daemon { "warn" } else { "info" };
    let level = config.system.log_level.to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lumabridge={level}")))
        .add_directive(default_level.parse()?);

    if config.system.log_to_file {
        let directory = config
            .system
            .log_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."));
        let file_name = config
            .system
            .log_file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "lumabridge.log".to_string());
        let appender = tracing_appender::rolling::never(directory, file_name);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(appender)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

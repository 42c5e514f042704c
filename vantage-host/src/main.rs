//! Vantage session worker — entry point.
//!
//! ```text
//! vantage-host --channel <endpoint>   Attach to a broker channel
//! vantage-host --config <path>        Load a custom config TOML
//! vantage-host --gen-config           Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vantage_host::config::HostConfig;
use vantage_host::service::HostService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vantage-host", about = "Vantage desktop session worker")]
struct Cli {
    /// Channel endpoint handed down by the broker: a TCP socket
    /// address, or a Unix socket path on Unix.
    #[arg(short = 'n', long)]
    channel: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vantage-host.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(channel) = cli.channel else {
        eprintln!("--channel is required (see --help)");
        std::process::exit(2);
    };

    // Load config.
    let config = HostConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vantage-host v{}", env!("CARGO_PKG_VERSION"));
    info!("target FPS: {}", config.capture.fps);
    info!("clipboard sync: {}", config.clipboard.enabled);

    HostService::new(config).run(&channel).await
}

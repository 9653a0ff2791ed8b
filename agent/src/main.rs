use anyhow::Result;
use clap::Parser;
use hostwatch_agent::agent::Agent;
use hostwatch_agent::config::AgentConfig;
use tracing::info;

/// Hostwatch agent: host telemetry collector.
#[derive(Parser, Debug)]
#[command(name = "hostwatch-agent", version, about)]
struct Cli {
    /// Path to an optional TOML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single collection cycle even when CONTAINERIZED is set.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hostwatch_agent=info".into()),
        )
        .init();

    let cli = Cli::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Hostwatch agent"
    );

    let mut cfg = match cli.config {
        Some(ref path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };
    cfg.apply_env(|key| std::env::var(key).ok())?;
    if cli.once {
        cfg.containerized = false;
    }
    cfg.validate()?;

    info!(
        collector = %cfg.collector_url,
        containerized = cfg.containerized,
        interval = cfg.interval_secs,
        "Configuration loaded"
    );

    Agent::from_config(&cfg)?.run().await
}

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Discord bot that relays slash commands to OpenAI, Anthropic or Gemini
#[derive(Debug, Parser)]
#[command(name = "aibot", version)]
pub struct Cli {
    /// Log level: DEBUG, INFO, WARNING, ERROR or CRITICAL (case-insensitive)
    #[arg(long, default_value = "INFO")]
    pub log: String,
}

/// Map the user-facing level names onto tracing levels.
/// `tracing` has no level above ERROR, so CRITICAL collapses into it.
pub fn parse_log_level(level: &str) -> anyhow::Result<LevelFilter> {
    match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Ok(LevelFilter::DEBUG),
        "INFO" => Ok(LevelFilter::INFO),
        "WARNING" | "WARN" => Ok(LevelFilter::WARN),
        "ERROR" | "CRITICAL" => Ok(LevelFilter::ERROR),
        other => Err(anyhow::anyhow!("Invalid log level: {}", other)),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `--log` when set.
pub fn init_logging(level: LevelFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .init();
}

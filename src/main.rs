use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use eventalyzer::config::{EventalyzerConfig, LoggingConfig};
use eventalyzer::tracker::TrackerRegistry;

/// Watch newline-delimited JSON events on stdin and report keys that cross a
/// threshold within a sliding window.
#[derive(Debug, Parser)]
#[command(name = "eventalyzer", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bucket interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Window length in milliseconds
    #[arg(long)]
    ttl_ms: Option<u64>,

    /// Idle time before a key is forgotten, in milliseconds
    #[arg(long)]
    cleanup_ms: Option<u64>,

    /// Window total at which a key is reported
    #[arg(short, long)]
    threshold: Option<u64>,

    /// Event field holding the tracking key
    #[arg(short, long)]
    key_field: Option<String>,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut EventalyzerConfig) {
        if let Some(interval_ms) = self.interval_ms {
            config.window.interval_ms = interval_ms;
        }
        if let Some(ttl_ms) = self.ttl_ms {
            config.window.ttl_ms = ttl_ms;
        }
        if let Some(cleanup_ms) = self.cleanup_ms {
            config.window.cleanup_ms = Some(cleanup_ms);
        }
        if let Some(threshold) = self.threshold {
            config.alerting.threshold = threshold;
        }
        if let Some(key_field) = &self.key_field {
            config.alerting.key_field = key_field.clone();
        }
    }
}

/// One alert line written to stdout.
#[derive(Debug, Serialize)]
struct Alert<'a> {
    key: &'a str,
    count: u64,
    threshold: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EventalyzerConfig::from_file(path)?,
        None => EventalyzerConfig::default(),
    };
    cli.apply(&mut config);

    init_tracing(&config.logging);

    info!("Starting Eventalyzer");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Keys are pulled out of events before they reach the registry
    let registry = Arc::new(TrackerRegistry::new(
        config.tracker_options(),
        |key: &String| key.clone(),
    )?);
    registry.start()?;

    info!(
        interval_ms = config.window.interval_ms,
        ttl_ms = config.window.ttl_ms,
        threshold = config.alerting.threshold,
        key_field = %config.alerting.key_field,
        "Watching stdin for events"
    );

    let threshold = config.alerting.threshold;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut check = tokio::time::interval(Duration::from_millis(
        config.alerting.check_interval_ms.max(1),
    ));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => ingest(&registry, &config.alerting.key_field, &line),
                None => {
                    info!("Reached end of input");
                    break;
                }
            },
            _ = check.tick() => report(&registry, threshold)?,
            _ = &mut shutdown => break,
        }
    }

    report(&registry, threshold)?;
    registry.stop();

    info!("Eventalyzer stopped");
    Ok(())
}

/// Initialize tracing. `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.with_thread_ids(true).init();
    }
}

/// Extract the tracking key from an event.
fn event_key(event: &Value, field: &str) -> Option<String> {
    match event.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn ingest(registry: &TrackerRegistry<String, String>, key_field: &str, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let event: Value = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Skipping malformed event");
            return;
        }
    };

    match event_key(&event, key_field) {
        Some(key) => registry.add_event(&key),
        None => debug!(key_field = %key_field, "Skipping event without key field"),
    }
}

fn report(registry: &TrackerRegistry<String, String>, threshold: u64) -> anyhow::Result<()> {
    for (key, count) in registry.over_threshold(threshold) {
        let alert = Alert {
            key: &key,
            count,
            threshold,
        };
        println!("{}", serde_json::to_string(&alert)?);
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

//! Command-line alert consumer
//!
//! # Usage Examples
//!
//! ```bash
//! # Poll alerts from two topics with credentials
//! fink-consumer --topic rrlyr,ebwuma \
//!   --group-id my-group \
//!   --username Alice --password Alice-secret
//!
//! # Use a local schema and read options from a file
//! fink-consumer --config fink.toml --topic rrlyr \
//!   --schema schemas/fink_alert_schema.avsc --max-alerts 10
//! ```
//!
//! The configuration file holds the same options as the flags:
//!
//! ```toml
//! username = "Alice"
//! password = "Alice-secret"
//! group_id = "my-group"
//! bootstrap_servers = "localhost:9093,localhost:9094,localhost:9095"
//! ```

use anyhow::Context;
use clap::Parser;
use fink_client::{timeout_from_secs, Alert, AlertConsumer, ConsumerOptions};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fink-consumer")]
#[command(about = "Consume Avro-encoded alerts from Fink Kafka topics")]
#[command(long_about = None)]
struct Cli {
    /// TOML file with username, password, group_id and bootstrap_servers
    #[arg(long, env = "FINK_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Topics to subscribe to (comma-separated or repeated)
    #[arg(long = "topic", env = "FINK_TOPICS", value_delimiter = ',', required = true)]
    topics: Vec<String>,

    /// Consumer group ID
    #[arg(long, env = "FINK_GROUP_ID")]
    group_id: Option<String>,

    /// Username for SASL authentication
    #[arg(long, env = "FINK_USERNAME")]
    username: Option<String>,

    /// Password for SASL authentication
    #[arg(long, env = "FINK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Kafka brokers (comma-separated list)
    #[arg(long, env = "FINK_BOOTSTRAP_SERVERS")]
    bootstrap_servers: Option<String>,

    /// Local Avro schema; skips the remote schema fetch
    #[arg(long, env = "FINK_SCHEMA", value_name = "PATH")]
    schema: Option<PathBuf>,

    /// Seconds to wait per poll; negative waits forever
    #[arg(long, default_value_t = 5.0, allow_negative_numbers = true)]
    timeout_secs: f64,

    /// Stop after this many alerts
    #[arg(long)]
    max_alerts: Option<usize>,

    /// Alerts to fetch per call; values above 1 use batch consumption
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// Exit when a poll times out without any alert
    #[arg(long)]
    stop_when_idle: bool,
}

impl Cli {
    fn options(&self) -> anyhow::Result<ConsumerOptions> {
        let flags = ConsumerOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            group_id: self.group_id.clone(),
            bootstrap_servers: self.bootstrap_servers.clone(),
        };

        let Some(path) = &self.config else {
            return Ok(flags);
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: ConsumerOptions = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(flags.or(file))
    }
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = cli.options()?;
    let timeout = timeout_from_secs(cli.timeout_secs);

    let mut consumer = AlertConsumer::new(cli.topics.as_slice(), &options, cli.schema.as_deref())
        .context("Failed to create alert consumer")?;
    tracing::info!(
        "Consuming from {:?} with schema from {}",
        consumer.topics(),
        consumer.schema().origin()
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut received = 0usize;

    loop {
        let remaining = cli.max_alerts.map(|max| max.saturating_sub(received));
        if remaining == Some(0) {
            break;
        }

        let alerts = if cli.batch_size > 1 {
            let count = remaining.map_or(cli.batch_size, |r| r.min(cli.batch_size));
            consumer.consume(count, timeout)?
        } else {
            consumer.poll(timeout)?.into_iter().collect()
        };

        if alerts.is_empty() {
            tracing::debug!("No alert received within {:?}", timeout);
            if cli.stop_when_idle {
                break;
            }
            continue;
        }

        for alert in &alerts {
            write_alert(&mut out, alert)?;
        }
        received += alerts.len();
    }

    consumer.close();
    tracing::info!("Received {received} alert(s)");
    Ok(())
}

fn write_alert(out: &mut impl Write, alert: &Alert) -> anyhow::Result<()> {
    let line = serde_json::json!({
        "topic": alert.topic,
        "alert": alert.record.to_json(),
    });
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

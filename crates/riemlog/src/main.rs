mod output;
mod telemetry;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use riemlog_core::config::{Config, TransportKind};
use riemlog_core::model::record::{LogRecord, ThrowableInfo};
use riemlog_core::severity::Severity;
use riemlog_core::time::now_millis;
use riemlog_forward::{ForwardOutcome, Forwarder};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::output::{outcome_label, print_config_human, print_outcome_human};
use crate::telemetry::init_cli_tracing;

#[derive(Parser, Debug)]
#[command(name = "riemlog")]
#[command(about = "Forward log records to a Riemann collector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true, help = "Read settings from this TOML file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Collector address as host:port")]
    collector: Option<String>,

    #[arg(long, global = true, help = "Use the acknowledged TCP transport")]
    tcp: bool,

    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Forward a single log record")]
    Send {
        #[arg(long, default_value = "ERROR")]
        severity: String,
        #[arg(short, long)]
        message: String,
        #[arg(long, default_value = "riemlog")]
        logger: String,
        #[arg(long = "marker")]
        markers: Vec<String>,
        #[arg(long = "context", help = "Diagnostic context as key=value")]
        context: Vec<String>,
        #[arg(long, help = "Exception as Class:message")]
        throwable: Option<String>,
    },
    #[command(about = "Forward every line read from stdin")]
    Relay {
        #[arg(long, default_value = "ERROR", help = "Severity for plain text lines")]
        severity: String,
        #[arg(long, value_enum, default_value_t = RelayFormat::Text)]
        format: RelayFormat,
        #[arg(long, default_value = "stdin")]
        logger: String,
    },
    #[command(about = "Print the resolved configuration")]
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RelayFormat {
    Text,
    Json,
}

/// One JSON line accepted by `relay --format json`.
#[derive(Debug, Deserialize)]
struct RelayLine {
    severity: Option<String>,
    message: String,
    logger: Option<String>,
    thread: Option<String>,
    timestamp_millis: Option<i64>,
    #[serde(default)]
    markers: Vec<String>,
    #[serde(default)]
    context: serde_json::Map<String, serde_json::Value>,
    throwable: Option<ThrowableInfo>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.debug, cli.json);
    let cfg = resolve_config(&cli)?;

    match cli.command {
        Commands::Send {
            severity,
            message,
            logger,
            markers,
            context,
            throwable,
        } => {
            let mut record = LogRecord::new(Severity::from_str(&severity)?, message)
                .with_logger(logger)
                .with_thread(current_thread_name())
                .with_timestamp_millis(now_millis());
            for marker in markers {
                record = record.with_marker(marker);
            }
            for pair in &context {
                let (key, value) = parse_context_pair(pair)?;
                record = record.with_context(key, value);
            }
            if let Some(raw) = throwable {
                record = record.with_throwable(parse_throwable(&raw));
            }
            run_send(cfg, record, cli.json).await
        }
        Commands::Relay {
            severity,
            format,
            logger,
        } => {
            let severity = Severity::from_str(&severity)?;
            run_relay(cfg, severity, format, logger).await
        }
        Commands::Check => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                print_config_human(&cfg);
            }
            Ok(())
        }
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load_with_file(path)?,
        None => Config::load()?,
    };
    if let Some(addr) = &cli.collector {
        let (host, port) = parse_collector(addr)?;
        cfg.collector_host = host;
        cfg.collector_port = port;
    }
    if cli.tcp {
        cfg.transport = TransportKind::Tcp;
    }
    if cli.debug {
        cfg.debug = true;
    }
    Ok(cfg)
}

async fn run_send(cfg: Config, record: LogRecord, json: bool) -> anyhow::Result<()> {
    let forwarder = Forwarder::new(cfg);
    let outcome = tokio::task::spawn_blocking(move || {
        forwarder.on_start()?;
        let outcome = forwarder.try_forward(&record);
        forwarder.on_stop();
        anyhow::Ok(outcome?)
    })
    .await??;

    if json {
        let payload = serde_json::json!({ "outcome": outcome_label(&outcome) });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_outcome_human(&outcome);
    }
    Ok(())
}

async fn run_relay(
    cfg: Config,
    severity: Severity,
    format: RelayFormat,
    logger: String,
) -> anyhow::Result<()> {
    let forwarder = Arc::new(Forwarder::new(cfg));
    {
        let forwarder = forwarder.clone();
        tokio::task::spawn_blocking(move || forwarder.on_start()).await??;
    }

    let relay = {
        let forwarder = forwarder.clone();
        async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut delivered = 0usize;
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                let record = match format {
                    RelayFormat::Text => text_record(&line, severity, &logger),
                    RelayFormat::Json => match json_record(&line, &logger) {
                        Ok(record) => record,
                        Err(err) => {
                            tracing::warn!(error = %err, "skipping malformed line");
                            continue;
                        }
                    },
                };
                let forwarder = forwarder.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || forwarder.try_forward(&record)).await?;
                match outcome {
                    Ok(ForwardOutcome::Delivered(_)) => delivered += 1,
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "dropped line"),
                }
            }
            anyhow::Ok(delivered)
        }
    };

    tokio::select! {
        res = relay => {
            let delivered = res?;
            tracing::info!(delivered, "stdin closed");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    tokio::task::spawn_blocking(move || forwarder.on_stop()).await?;
    Ok(())
}

fn text_record(line: &str, severity: Severity, logger: &str) -> LogRecord {
    LogRecord::new(severity, line)
        .with_logger(logger)
        .with_thread(current_thread_name())
        .with_timestamp_millis(now_millis())
}

fn json_record(line: &str, default_logger: &str) -> anyhow::Result<LogRecord> {
    let parsed: RelayLine = serde_json::from_str(line).context("invalid json line")?;
    let severity = match parsed.severity.as_deref() {
        Some(s) => Severity::from_str(s)?,
        None => Severity::Error,
    };
    let mut record = LogRecord::new(severity, parsed.message)
        .with_logger(parsed.logger.unwrap_or_else(|| default_logger.to_string()))
        .with_thread(parsed.thread.unwrap_or_else(current_thread_name))
        .with_timestamp_millis(parsed.timestamp_millis.unwrap_or_else(now_millis));
    record.markers = parsed.markers;
    record.throwable = parsed.throwable;
    for (key, value) in parsed.context {
        let value = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        record = record.with_context(key, value);
    }
    Ok(record)
}

fn parse_collector(addr: &str) -> anyhow::Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .with_context(|| format!("collector must be host:port, got {addr}"))?;
    if host.is_empty() {
        anyhow::bail!("collector host is empty in {addr}");
    }
    let port = port
        .parse::<u16>()
        .with_context(|| format!("invalid collector port in {addr}"))?;
    Ok((host.trim_matches(['[', ']']).to_string(), port))
}

fn parse_context_pair(pair: &str) -> anyhow::Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => anyhow::bail!("context must be key=value, got {pair}"),
    }
}

fn parse_throwable(raw: &str) -> ThrowableInfo {
    let (class_name, message) = raw.split_once(':').unwrap_or((raw, ""));
    ThrowableInfo {
        class_name: class_name.trim().to_string(),
        message: message.trim().to_string(),
        frames: Vec::new(),
    }
}

fn current_thread_name() -> String {
    thread::current().name().unwrap_or("main").to_string()
}

// rcon: send one command to one or many RCON servers and print each result as it arrives
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rcon_fanout::{Coordinator, CycleConfig, Delivery, ErrorKind, Label, Outcome, ServerDescriptor};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Send an RCON command to one or many game servers.
#[derive(Parser, Debug)]
#[command(name = "rcon", version, about)]
struct Args {
    /// Server address (single-target mode)
    #[arg(short = 'H', long, conflicts_with = "servers")]
    host: Option<String>,

    /// Server RCON port
    #[arg(short, long, default_value = "27020")]
    port: u16,

    /// RCON password
    #[arg(short = 'P', long, env = "RCON_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Display name of the server
    #[arg(long, default_value = "server")]
    name: String,

    /// Cluster or group the server belongs to
    #[arg(long, default_value = "")]
    group: String,

    /// JSON file with an array of server descriptors (fan-out mode)
    #[arg(short, long)]
    servers: Option<PathBuf>,

    /// Per-server timeout in seconds (default: RCON_TIMEOUT_MS or 10s)
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Command to run
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    /// One human-readable block per server
    Text,
    /// NDJSON output (one JSON object per line)
    Json,
}

/// JSON output for one result.
#[derive(Serialize)]
struct ResultOutput<'a> {
    server: String,
    address: String,
    command: &'a str,
    #[serde(flatten)]
    outcome: &'a Outcome,
    acknowledged: bool,
    elapsed_ms: u128,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns false when any server failed in a way worth alerting on.
fn run(args: Args) -> Result<bool> {
    let servers = load_servers(&args)?;
    let command = args.command.join(" ");

    let mut config = CycleConfig::global();
    if let Some(secs) = args.timeout {
        if !secs.is_finite() || secs <= 0.0 {
            bail!("Timeout must be a positive number of seconds");
        }
        config.timeout = Duration::from_secs_f64(secs);
    }

    let coordinator = Coordinator::with_config(config);
    let mut all_ok = true;

    for delivery in coordinator.dispatch(&servers, &command) {
        if delivery.outcome.should_alert() {
            all_ok = false;
        }
        match args.output {
            OutputFormat::Text => {
                if let Some(text) = render(&delivery.server.label, &delivery.outcome) {
                    let now = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
                    println!("[{}] {}", now, text);
                }
            }
            OutputFormat::Json => print_json(&delivery, &command)?,
        }
    }

    Ok(all_ok)
}

fn load_servers(args: &Args) -> Result<Vec<ServerDescriptor>> {
    if let Some(ref path) = args.servers {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let servers: Vec<ServerDescriptor> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse servers from {}", path.display()))?;
        if servers.is_empty() {
            bail!("No servers listed in {}", path.display());
        }
        return Ok(servers);
    }

    let host = match args.host {
        Some(ref host) => host,
        None => bail!("Either --host or --servers is required"),
    };
    let password = args
        .password
        .as_deref()
        .context("A password is required (--password or RCON_PASSWORD)")?;

    Ok(vec![ServerDescriptor::new(
        host,
        args.port,
        password,
        Label::new(&args.name, &args.group),
    )])
}

fn print_json(delivery: &Delivery, command: &str) -> Result<()> {
    let output = ResultOutput {
        server: delivery.server.label.to_string(),
        address: delivery.server.key(),
        command,
        outcome: &delivery.outcome,
        acknowledged: delivery.outcome.is_acknowledgement(),
        elapsed_ms: delivery.elapsed.as_millis(),
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

/// Human-readable line(s) for one outcome. Relay failures are only logged.
fn render(label: &Label, outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Success { .. } if outcome.is_acknowledgement() => Some(format!("✅ {}", label)),
        Outcome::Success { text } => Some(format!("➣ {}\n{}", label, text)),
        Outcome::Failure { kind: ErrorKind::ConnectionTimeout, .. } => {
            Some(format!("- {} has timed out and may be down", label))
        }
        Outcome::Failure { kind: ErrorKind::UpstreamRelayError, detail } => {
            warn!(server = %label, %detail, "relay failure, not reported");
            None
        }
        Outcome::Failure { kind: ErrorKind::UnknownError, detail } => {
            Some(format!("- {} encountered an unknown error: {}", label, detail))
        }
        Outcome::Failure { detail, .. } => Some(format!("- {} {}", label, detail)),
    }
}

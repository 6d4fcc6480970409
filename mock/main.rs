// rcon-mock: local RCON endpoint for trying the client without a game server
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rcon_mock::{MockConfig, MockEvent, MockServer, Responder};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serve canned Source RCON replies.
#[derive(Parser, Debug)]
#[command(name = "rcon-mock", version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:27020")]
    bind: String,

    /// Password clients must present
    #[arg(short, long, env = "RCON_MOCK_PASSWORD", default_value = "password")]
    password: String,

    /// How to answer commands
    #[arg(short, long, value_enum, default_value = "echo")]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum Mode {
    /// Echo each command back ("saveworld" answers "World Saved")
    Echo,
    /// Acknowledge every command without output, like ARK does
    Ack,
    /// Log in, then never answer (exercises client timeouts)
    Silent,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let responder = match args.mode {
        Mode::Echo => Responder::Echo,
        Mode::Ack => Responder::Fragments(vec![rcon_core::ACK_NO_RESPONSE.to_string()]),
        Mode::Silent => Responder::SilentAfterAuth,
    };

    let server = MockServer::bind(&args.bind, MockConfig::new(&args.password, responder))
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!(addr = %server.addr(), mode = ?args.mode, "rcon-mock listening");

    server.run(|event| match event {
        MockEvent::Connected => info!("client connected"),
        MockEvent::Authenticated { ok } => info!(ok, "login"),
        MockEvent::Command { request_id, body } => info!(request_id, %body, "command"),
        MockEvent::Closed => info!("client disconnected"),
    });

    Ok(())
}

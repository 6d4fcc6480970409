// client: RCON protocol client - handshake, command framing, one-shot calls
pub mod config;
pub mod error;
pub mod session;

pub use config::CycleConfig;
pub use error::RconError;
pub use session::{trim_reply, Session};

use rcon_core::{ErrorKind, Outcome, ServerDescriptor};
use rcon_transport::{TcpTransport, Transport};
use std::time::Instant;
use tracing::{debug, warn};

/// Run one command against one server with the process-wide defaults.
pub fn call(server: &ServerDescriptor, command: &str) -> Outcome {
    call_with(server, command, &CycleConfig::global())
}

/// Run one full cycle over a fresh TCP connection.
pub fn call_with(server: &ServerDescriptor, command: &str, config: &CycleConfig) -> Outcome {
    let transport = TcpTransport::new(&server.address, server.port);
    call_over(transport, server, command, config)
}

/// Connect, authenticate and run `command` over `transport`.
///
/// The whole cycle shares one deadline of `config.timeout`. Every error is
/// classified into the returned [`Outcome`], and the transport is closed
/// whatever happens.
pub fn call_over<T: Transport>(
    transport: T,
    server: &ServerDescriptor,
    command: &str,
    config: &CycleConfig,
) -> Outcome {
    let started = Instant::now();
    let deadline = started + config.timeout;

    let result = Session::authenticate_by(transport, &server.password, deadline).and_then(|session| {
        let mut session = session.with_response_idle(config.response_idle);
        let reply = session.run_command_by(command, deadline);
        session.close();
        reply
    });

    match result {
        Ok(text) => {
            debug!(server = %server.label, elapsed = ?started.elapsed(), "command succeeded");
            Outcome::success(text)
        }
        Err(e) => {
            match e.kind() {
                ErrorKind::UpstreamRelayError => {
                    warn!(server = %server.label, error = %e, "relay failure, target state unknown");
                }
                ErrorKind::UnknownError => {
                    warn!(server = %server.label, error = %e, command, "rcon call failed");
                }
                kind => {
                    debug!(server = %server.label, %kind, error = %e, "rcon call failed");
                }
            }
            e.into()
        }
    }
}

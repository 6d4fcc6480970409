// Authenticated single-use RCON session: handshake plus command/response framing
use crate::error::RconError;
use rcon_core::{
    packet_type, CycleState, Packet, ProtocolError, RequestIds, AUTH_FAILED_ID, LOGIN_REQUEST_ID,
};
use rcon_transport::{TcpTransport, Transport};
use std::time::{Duration, Instant};
use tracing::debug;

const READ_CHUNK: usize = 4096;

/// One transport connection to one server, owned by a single cycle.
///
/// Sessions are never shared or pooled. Dropping a session closes its
/// transport, so every exit path of a cycle releases the socket.
pub struct Session<T: Transport = TcpTransport> {
    transport: T,
    state: CycleState,
    authenticated: bool,
    ids: RequestIds,
    buffer: Vec<u8>,
    pending: Vec<u8>,
    response_idle: Duration,
}

impl Session<TcpTransport> {
    /// Open a TCP connection and log in, all within `timeout`.
    pub fn connect_and_authenticate(
        address: &str,
        port: u16,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, RconError> {
        let transport = TcpTransport::new(address, port);
        Session::authenticate_by(transport, password, Instant::now() + timeout)
    }
}

impl<T: Transport> Session<T> {
    /// Connect `transport` and run the login exchange before `deadline`.
    ///
    /// On failure the transport is closed before the error is returned.
    pub fn authenticate_by(transport: T, password: &str, deadline: Instant) -> Result<Self, RconError> {
        let mut session = Session {
            transport,
            state: CycleState::Idle,
            authenticated: false,
            ids: RequestIds::new(),
            buffer: vec![0u8; READ_CHUNK],
            pending: Vec::new(),
            response_idle: Duration::from_millis(crate::config::DEFAULT_RESPONSE_IDLE_MS),
        };

        match session.handshake(password, deadline) {
            Ok(()) => Ok(session),
            Err(e) => Err(session.abort(e)),
        }
    }

    pub fn with_response_idle(mut self, response_idle: Duration) -> Self {
        self.response_idle = response_idle;
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send `command` and assemble its reply, giving up after `timeout`.
    pub fn run_command(&mut self, command: &str, timeout: Duration) -> Result<String, RconError> {
        self.run_command_by(command, Instant::now() + timeout)
    }

    /// Send `command` and assemble its reply before `deadline`.
    ///
    /// Bodies of packets echoing the request id are concatenated until an
    /// empty packet arrives or the server goes quiet for `response_idle`
    /// after at least one packet. An empty reply is valid.
    pub fn run_command_by(&mut self, command: &str, deadline: Instant) -> Result<String, RconError> {
        if !self.authenticated {
            return Err(RconError::Unknown(format!(
                "session is not authenticated ({})",
                self.state
            )));
        }

        match self.exchange(command, deadline) {
            Ok(reply) => {
                self.transition(CycleState::Succeeded);
                Ok(reply)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Close the transport. Safe to call more than once.
    pub fn close(&mut self) {
        self.authenticated = false;
        self.pending.clear();
        self.transport.disconnect();
    }

    fn handshake(&mut self, password: &str, deadline: Instant) -> Result<(), RconError> {
        self.transition(CycleState::Connecting);
        self.transport
            .connect(deadline)
            .map_err(|e| RconError::transport(e, CycleState::Connecting))?;

        self.transition(CycleState::Authenticating);
        self.write_packet(&Packet::login(password), deadline)?;

        loop {
            let packet = self.read_packet(deadline)?;
            if packet.request_id == AUTH_FAILED_ID {
                return Err(RconError::AuthenticationFailed);
            }
            match packet.kind {
                // Source servers send an empty value packet ahead of the auth response
                packet_type::RESPONSE_VALUE => {
                    debug!(request_id = packet.request_id, "skipping packet before auth response");
                }
                packet_type::AUTH_RESPONSE if packet.request_id == LOGIN_REQUEST_ID => {
                    self.authenticated = true;
                    return Ok(());
                }
                kind => {
                    return Err(ProtocolError::UnexpectedType {
                        request_id: packet.request_id,
                        kind,
                    }
                    .into())
                }
            }
        }
    }

    fn exchange(&mut self, command: &str, deadline: Instant) -> Result<String, RconError> {
        let request_id = self.ids.next_id();
        self.transition(CycleState::AwaitingResponse);
        self.write_packet(&Packet::command(request_id, command), deadline)?;

        let mut reply = String::new();
        let mut fragments = 0usize;
        loop {
            // The quiet period only applies between whole packets
            let wait_until = if fragments == 0 || !self.pending.is_empty() {
                deadline
            } else {
                deadline.min(Instant::now() + self.response_idle)
            };

            let packet = match self.read_packet(wait_until) {
                Ok(packet) => packet,
                Err(e) => {
                    let partial = self.pending.len();
                    match e {
                        RconError::ConnectionLost { .. } if partial > 0 => {
                            return Err(ProtocolError::Truncated(partial).into())
                        }
                        // Quiet line or a closing peer after data ends the reply
                        RconError::Timeout { .. } | RconError::ConnectionLost { .. }
                            if fragments > 0 && partial == 0 =>
                        {
                            break
                        }
                        RconError::Timeout { .. } if fragments > 0 && Instant::now() < deadline => {
                            continue
                        }
                        e => return Err(e),
                    }
                }
            };

            if packet.request_id != request_id {
                debug!(
                    expected = request_id,
                    got = packet.request_id,
                    "skipping packet for another request"
                );
                continue;
            }
            if packet.kind != packet_type::RESPONSE_VALUE {
                return Err(ProtocolError::UnexpectedType {
                    request_id,
                    kind: packet.kind,
                }
                .into());
            }
            if packet.body.is_empty() {
                break;
            }

            reply.push_str(&packet.body);
            fragments += 1;
        }

        debug!(request_id, fragments, bytes = reply.len(), "reply assembled");
        Ok(trim_reply(&reply).to_string())
    }

    fn write_packet(&mut self, packet: &Packet, deadline: Instant) -> Result<(), RconError> {
        let state = self.state;
        self.transport
            .send(&packet.encode(), deadline)
            .map_err(|e| RconError::transport(e, state))
    }

    // Reassembles packets from arbitrary read chunks
    fn read_packet(&mut self, deadline: Instant) -> Result<Packet, RconError> {
        loop {
            if let Some((packet, used)) = Packet::decode(&self.pending)? {
                self.pending.drain(..used);
                return Ok(packet);
            }

            let state = self.state;
            let n = self
                .transport
                .receive(&mut self.buffer, deadline)
                .map_err(|e| RconError::transport(e, state))?;
            if n == 0 {
                return Err(RconError::transport(
                    rcon_transport::TransportError::Closed,
                    state,
                ));
            }
            self.pending.extend_from_slice(&self.buffer[..n]);
        }
    }

    fn abort(&mut self, err: RconError) -> RconError {
        self.transition(CycleState::Failed(err.kind()));
        self.close();
        err
    }

    fn transition(&mut self, next: CycleState) {
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.transport.disconnect();
    }
}

/// Strip trailing whitespace and control bytes from an assembled reply.
pub fn trim_reply(reply: &str) -> &str {
    reply.trim_end_matches(|c: char| c.is_whitespace() || c.is_control())
}

// Mock Source RCON server on loopback: canned replies, one thread per connection,
// and a stream of what it observed
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rcon_core::{packet_type, Label, Packet, ServerDescriptor, ACK_WORLD_SAVED, AUTH_FAILED_ID};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How the server answers once a client is logged in
#[derive(Debug, Clone)]
pub enum Responder {
    /// One response packet per entry, in order. An empty entry acts as terminator.
    Fragments(Vec<String>),
    /// Reply with the command text followed by an empty terminator.
    /// `saveworld` answers "World Saved".
    Echo,
    /// Accept the connection and never send anything.
    Silent,
    /// Complete the login, then ignore commands.
    SilentAfterAuth,
    /// Answer the login packet with raw bytes, as a misbehaving proxy would.
    Http(String),
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub password: String,
    pub responder: Responder,
}

impl MockConfig {
    pub fn new(password: &str, responder: Responder) -> Self {
        MockConfig {
            password: password.to_string(),
            responder,
        }
    }
}

/// What the server observed, in order per connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Connected,
    Authenticated { ok: bool },
    Command { request_id: i32, body: String },
    /// The client closed (or reset) its side of the connection.
    Closed,
}

pub struct MockServer {
    addr: SocketAddr,
    events: Receiver<MockEvent>,
}

impl MockServer {
    /// Listen on an ephemeral loopback port.
    pub fn start(config: MockConfig) -> io::Result<Self> {
        Self::bind("127.0.0.1:0", config)
    }

    pub fn bind(addr: &str, config: MockConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let addr = listener.local_addr()?;
        let (tx, rx) = unbounded();
        let config = Arc::new(config);

        thread::Builder::new()
            .name(format!("rcon-mock-{}", addr.port()))
            .spawn(move || {
                for stream in listener.incoming() {
                    let stream = match stream {
                        Ok(s) => s,
                        Err(_) => continue,
                    };

                    let config = Arc::clone(&config);
                    let events = tx.clone();
                    thread::spawn(move || serve_connection(stream, &config, &events));
                }
            })?;

        Ok(MockServer { addr, events: rx })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Descriptor pointing at this server.
    pub fn descriptor(&self, password: &str, name: &str) -> ServerDescriptor {
        ServerDescriptor::new(
            &self.addr.ip().to_string(),
            self.port(),
            password,
            Label::new(name, "mock"),
        )
    }

    pub fn next_event(&self, timeout: Duration) -> Option<MockEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Consume events until `expected` shows up or `timeout` passes.
    pub fn wait_for(&self, expected: &MockEvent, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(left) {
                Ok(ref event) if event == expected => return true,
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    /// Blocks forever, handing each event to `on_event`.
    pub fn run(self, mut on_event: impl FnMut(MockEvent)) {
        while let Ok(event) = self.events.recv() {
            on_event(event);
        }
    }
}

fn serve_connection(mut stream: TcpStream, config: &MockConfig, events: &Sender<MockEvent>) {
    let _ = events.send(MockEvent::Connected);

    let mut authenticated = false;
    let mut pending = Vec::new();
    let mut buf = [0u8; 4096];

    'conn: loop {
        loop {
            match Packet::decode(&pending) {
                Ok(Some((packet, used))) => {
                    pending.drain(..used);
                    if let Err(e) = handle_packet(&mut stream, &packet, config, &mut authenticated, events) {
                        debug!(error = %e, "mock write failed");
                        break 'conn;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "mock received malformed packet");
                    break 'conn;
                }
            }
        }

        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => pending.extend_from_slice(&buf[..n]),
        }
    }

    let _ = events.send(MockEvent::Closed);
}

fn handle_packet(
    stream: &mut TcpStream,
    packet: &Packet,
    config: &MockConfig,
    authenticated: &mut bool,
    events: &Sender<MockEvent>,
) -> io::Result<()> {
    match (packet.kind, &config.responder) {
        (_, Responder::Silent) => Ok(()),
        (packet_type::AUTH, Responder::Http(raw)) => stream.write_all(raw.as_bytes()),
        (packet_type::AUTH, _) => {
            *authenticated = packet.body == config.password;
            let _ = events.send(MockEvent::Authenticated { ok: *authenticated });
            let id = if *authenticated { packet.request_id } else { AUTH_FAILED_ID };
            send(stream, &Packet::response(packet.request_id, ""))?;
            send(stream, &Packet::auth_response(id))
        }
        (packet_type::EXECCOMMAND, responder) if *authenticated => {
            let _ = events.send(MockEvent::Command {
                request_id: packet.request_id,
                body: packet.body.clone(),
            });
            match responder {
                Responder::Fragments(bodies) => {
                    for body in bodies {
                        send(stream, &Packet::response(packet.request_id, body))?;
                    }
                    Ok(())
                }
                Responder::Echo => {
                    let reply = if packet.body == "saveworld" {
                        ACK_WORLD_SAVED
                    } else {
                        packet.body.as_str()
                    };
                    send(stream, &Packet::response(packet.request_id, reply))?;
                    send(stream, &Packet::response(packet.request_id, ""))
                }
                _ => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

fn send(stream: &mut TcpStream, packet: &Packet) -> io::Result<()> {
    stream.write_all(&packet.encode())
}

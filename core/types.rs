// Core types used across all RCON components
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of the reply ARK sends when a command ran but produced no output.
pub const ACK_NO_RESPONSE: &str = "Server received, But no response!!";

/// Body fragment of the reply to a world save.
pub const ACK_WORLD_SAVED: &str = "World Saved";

/// Human-readable label of a server: "name group (secondary)".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(alias = "cluster", default)]
    pub group: String,
    #[serde(alias = "gamertag", default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

impl Label {
    pub fn new(name: &str, group: &str) -> Self {
        Label {
            name: name.to_string(),
            group: group.to_string(),
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: &str) -> Self {
        self.secondary = Some(secondary.to_string());
        self
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.group.is_empty() {
            write!(f, " {}", self.group)?;
        }
        if let Some(ref secondary) = self.secondary {
            write!(f, " ({})", secondary)?;
        }
        Ok(())
    }
}

/// One administrable target. Supplied per request, never cached.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    #[serde(alias = "ip", alias = "host")]
    pub address: String,
    pub port: u16,
    pub password: String,
    #[serde(flatten)]
    pub label: Label,
}

impl ServerDescriptor {
    pub fn new(address: &str, port: u16, password: &str, label: Label) -> Self {
        ServerDescriptor {
            address: address.to_string(),
            port,
            password: password.to_string(),
            label,
        }
    }

    /// Registry key: one per network endpoint.
    pub fn key(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

// Keep the shared secret out of logs
impl fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("label", &self.label)
            .finish()
    }
}

/// Failure categories reported back to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connect, read or write exceeded the deadline; target presumed down.
    ConnectionTimeout,
    /// Refused, unreachable network/host, or unresolvable name.
    ConnectionRefused,
    /// Server echoed the -1 request id to the login packet.
    AuthenticationFailed,
    /// Malformed framing or an unexpected packet type.
    ProtocolError,
    /// An intermediary (proxy, CDN) failed, not the target itself.
    UpstreamRelayError,
    UnknownError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::ConnectionTimeout => write!(f, "connection timeout"),
            ErrorKind::ConnectionRefused => write!(f, "connection refused"),
            ErrorKind::AuthenticationFailed => write!(f, "authentication failed"),
            ErrorKind::ProtocolError => write!(f, "protocol error"),
            ErrorKind::UpstreamRelayError => write!(f, "upstream relay error"),
            ErrorKind::UnknownError => write!(f, "unknown error"),
        }
    }
}

/// Result of one (server, command) cycle. Nothing raw crosses this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { text: String },
    Failure { kind: ErrorKind, detail: String },
}

impl Outcome {
    pub fn success(text: impl Into<String>) -> Self {
        Outcome::Success { text: text.into() }
    }

    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Outcome::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Success { text } => Some(text),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// True for successful replies that only acknowledge the command.
    pub fn is_acknowledgement(&self) -> bool {
        self.text().map(is_acknowledgement).unwrap_or(false)
    }

    /// Relay failures say nothing about the target and should not raise alarms.
    pub fn should_alert(&self) -> bool {
        !matches!(self.kind(), None | Some(ErrorKind::UpstreamRelayError))
    }
}

/// Recognizes pure acknowledgement replies (case-sensitive).
pub fn is_acknowledgement(text: &str) -> bool {
    text.contains(ACK_NO_RESPONSE) || text.contains(ACK_WORLD_SAVED)
}

/// Per-cycle lifecycle. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Connecting,
    Authenticating,
    AwaitingResponse,
    Succeeded,
    Failed(ErrorKind),
}

impl CycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleState::Succeeded | CycleState::Failed(_))
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CycleState::Idle => write!(f, "idle"),
            CycleState::Connecting => write!(f, "connecting"),
            CycleState::Authenticating => write!(f, "authenticating"),
            CycleState::AwaitingResponse => write!(f, "awaiting response"),
            CycleState::Succeeded => write!(f, "succeeded"),
            CycleState::Failed(kind) => write!(f, "failed ({})", kind),
        }
    }
}

/// Request id counter scoped to a single session.
#[derive(Debug)]
pub struct RequestIds {
    next: i32,
}

impl RequestIds {
    pub fn new() -> Self {
        RequestIds { next: 1 }
    }

    pub fn next_id(&mut self) -> i32 {
        let id = self.next;
        // 0 is the login id and -1 the auth failure sentinel
        self.next = match self.next.checked_add(1) {
            Some(n) => n,
            None => 1,
        };
        id
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        RequestIds::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display() {
        let label = Label::new("Ragnarok", "PvE");
        assert_eq!(label.to_string(), "Ragnarok PvE");
        let label = label.with_secondary("XboxHost");
        assert_eq!(label.to_string(), "Ragnarok PvE (XboxHost)");
        assert_eq!(Label::new("Lost Island", "").to_string(), "Lost Island");
    }

    #[test]
    fn test_descriptor_accepts_legacy_keys() {
        let json = r#"{
            "name": "Fjordur", "cluster": "PvP", "gamertag": "host1",
            "ip": "10.0.0.5", "port": 27020, "password": "hunter2"
        }"#;
        let server: ServerDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(server.address, "10.0.0.5");
        assert_eq!(server.key(), "10.0.0.5:27020");
        assert_eq!(server.label.group, "PvP");
        assert_eq!(server.label.secondary.as_deref(), Some("host1"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let server = ServerDescriptor::new("127.0.0.1", 27020, "hunter2", Label::new("a", "b"));
        let debug = format!("{:?}", server);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_acknowledgement_detection() {
        assert!(is_acknowledgement("Server received, But no response!!"));
        assert!(is_acknowledgement("World Saved"));
        assert!(is_acknowledgement("Saving... World Saved"));
        assert!(!is_acknowledgement("world saved"));
        assert!(!is_acknowledgement("There are 3 players online"));
        assert!(Outcome::success("World Saved").is_acknowledgement());
        assert!(!Outcome::failure(ErrorKind::UnknownError, "World Saved").is_acknowledgement());
    }

    #[test]
    fn test_relay_failures_do_not_alert() {
        assert!(!Outcome::failure(ErrorKind::UpstreamRelayError, "502").should_alert());
        assert!(Outcome::failure(ErrorKind::ConnectionTimeout, "down").should_alert());
        assert!(!Outcome::success("").should_alert());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&Outcome::failure(ErrorKind::AuthenticationFailed, "bad password")).unwrap();
        assert_eq!(
            json,
            r#"{"status":"failure","kind":"authentication_failed","detail":"bad password"}"#
        );
    }

    #[test]
    fn test_request_ids_start_fresh() {
        let mut ids = RequestIds::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(RequestIds::new().next_id(), 1);

        let mut ids = RequestIds { next: i32::MAX };
        assert_eq!(ids.next_id(), i32::MAX);
        assert_eq!(ids.next_id(), 1);
    }
}

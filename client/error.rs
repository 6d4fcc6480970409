// Cycle errors and their mapping onto the caller-facing ErrorKind
use rcon_core::{CycleState, ErrorKind, Outcome, ProtocolError};
use rcon_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RconError {
    /// Connect, write or read ran past the cycle deadline.
    #[error("timed out while {stage}")]
    Timeout { stage: CycleState },

    #[error("{0}")]
    Refused(#[source] TransportError),

    /// Unreachable network or host, or a name that does not resolve.
    #[error("{0}")]
    Unreachable(#[source] TransportError),

    /// The peer dropped an established connection.
    #[error("connection lost while {stage}: {source}")]
    ConnectionLost {
        stage: CycleState,
        #[source]
        source: TransportError,
    },

    /// Server answered the login packet with the -1 request id.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error(transparent)]
    Protocol(ProtocolError),

    /// An intermediary answered instead of the target.
    #[error("upstream relay failure: {0}")]
    UpstreamRelay(String),

    #[error("{0}")]
    Unknown(String),
}

impl RconError {
    /// Classify a transport failure that happened during `stage`.
    pub fn transport(err: TransportError, stage: CycleState) -> Self {
        match err {
            TransportError::Timeout => RconError::Timeout { stage },
            TransportError::Refused(_) => RconError::Refused(err),
            TransportError::Unreachable(_) | TransportError::Unresolved { .. } => {
                RconError::Unreachable(err)
            }
            TransportError::Reset(_) | TransportError::Closed | TransportError::NotConnected => {
                RconError::ConnectionLost { stage, source: err }
            }
            TransportError::Io(e) => RconError::Unknown(format!("{} while {}", e, stage)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RconError::Timeout { .. } => ErrorKind::ConnectionTimeout,
            RconError::Refused(_) | RconError::Unreachable(_) => ErrorKind::ConnectionRefused,
            RconError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            RconError::Protocol(_) => ErrorKind::ProtocolError,
            RconError::UpstreamRelay(_) => ErrorKind::UpstreamRelayError,
            RconError::ConnectionLost { .. } | RconError::Unknown(_) => ErrorKind::UnknownError,
        }
    }
}

impl From<ProtocolError> for RconError {
    fn from(e: ProtocolError) -> Self {
        if e.is_relay_failure() {
            RconError::UpstreamRelay(e.to_string())
        } else {
            RconError::Protocol(e)
        }
    }
}

impl From<RconError> for Outcome {
    fn from(e: RconError) -> Self {
        Outcome::failure(e.kind(), e.to_string())
    }
}

// Typed transport failures, classified from the OS error instead of its message
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("operation timed out")]
    Timeout,

    #[error("connection refused")]
    Refused(#[source] io::Error),

    #[error("network or host unreachable")]
    Unreachable(#[source] io::Error),

    #[error("could not resolve {address}")]
    Unresolved {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("connection reset by peer")]
    Reset(#[source] io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Io(io::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        // ERROR_SEM_TIMEOUT, reported for dead peers on Windows
        #[cfg(windows)]
        if e.raw_os_error() == Some(121) {
            return TransportError::Timeout;
        }

        match e.kind() {
            // Socket read/write timeouts surface as WouldBlock on Unix
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            io::ErrorKind::ConnectionRefused => TransportError::Refused(e),
            io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::AddrNotAvailable => TransportError::Unreachable(e),
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::Reset(e),
            io::ErrorKind::UnexpectedEof => TransportError::Closed,
            io::ErrorKind::NotConnected => TransportError::NotConnected,
            _ => TransportError::Io(e),
        }
    }
}

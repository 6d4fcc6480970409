// Source RCON packet codec - pure data structures, no I/O
//
// Wire format (little-endian):
//   [size:i32][request_id:i32][type:i32][body...][0x00][0x00]
// `size` counts every byte after itself.
use thiserror::Error;

/// Packet type constants. 2 means different things depending on direction.
pub mod packet_type {
    pub const RESPONSE_VALUE: i32 = 0;
    pub const EXECCOMMAND: i32 = 2;
    pub const AUTH_RESPONSE: i32 = 2;
    pub const AUTH: i32 = 3;
}

/// Request id used for the login packet.
pub const LOGIN_REQUEST_ID: i32 = 0;

/// Request id the server echoes when authentication is rejected.
pub const AUTH_FAILED_ID: i32 = -1;

/// id + type + two terminators
pub const MIN_PACKET_SIZE: usize = 10;

/// Upper bound on the `size` field; anything larger is treated as garbage.
pub const MAX_PACKET_SIZE: usize = 65536 + MIN_PACKET_SIZE;

/// Longest HTTP status line buffered while waiting for its line break.
pub const MAX_HTTP_LINE: usize = 1024;

/// Framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The size prefix is below the minimum or above the accepted maximum.
    #[error("bad packet length: {0}")]
    BadLength(i32),

    /// The body is not followed by the two required null bytes.
    #[error("packet {request_id} is missing its terminating null bytes")]
    MissingTerminator { request_id: i32 },

    /// A packet arrived with a type that is not valid at this point.
    #[error("unexpected packet type {kind} for request {request_id}")]
    UnexpectedType { request_id: i32, kind: i32 },

    /// Something in between answered with HTTP instead of RCON.
    #[error("received HTTP response instead of RCON: {line}")]
    HttpResponse { status: Option<u16>, line: String },

    /// The peer went away in the middle of a packet.
    #[error("connection closed with {0} bytes of an incomplete packet buffered")]
    Truncated(usize),
}

impl ProtocolError {
    /// Gateway-type statuses, including the Cloudflare 52x range.
    pub fn is_relay_failure(&self) -> bool {
        match self {
            ProtocolError::HttpResponse { status: Some(code), .. } => {
                matches!(code, 502 | 503 | 504 | 520..=527)
            }
            _ => false,
        }
    }
}

/// The protocol's atomic wire unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub request_id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(request_id: i32, kind: i32, body: &str) -> Self {
        Packet {
            request_id,
            kind,
            body: body.to_string(),
        }
    }

    pub fn login(password: &str) -> Self {
        Packet::new(LOGIN_REQUEST_ID, packet_type::AUTH, password)
    }

    pub fn command(request_id: i32, command: &str) -> Self {
        Packet::new(request_id, packet_type::EXECCOMMAND, command)
    }

    pub fn response(request_id: i32, body: &str) -> Self {
        Packet::new(request_id, packet_type::RESPONSE_VALUE, body)
    }

    pub fn auth_response(request_id: i32) -> Self {
        Packet::new(request_id, packet_type::AUTH_RESPONSE, "")
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let size = (MIN_PACKET_SIZE + body.len()) as i32;
        let mut bytes = Vec::with_capacity(4 + size as usize);
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&self.request_id.to_le_bytes());
        bytes.extend_from_slice(&self.kind.to_le_bytes());
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes
    }

    /// Decode one packet from the front of `bytes`.
    ///
    /// Returns `Ok(None)` while the buffer does not yet hold a complete
    /// packet, otherwise the packet and the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<Option<(Packet, usize)>, ProtocolError> {
        if bytes.starts_with(b"HTTP") {
            return Self::http_error(bytes).map_or(Ok(None), Err);
        }
        if bytes.len() < 4 {
            return Ok(None);
        }

        let size = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if size < MIN_PACKET_SIZE as i32 || size as usize > MAX_PACKET_SIZE {
            return Err(ProtocolError::BadLength(size));
        }

        let total = 4 + size as usize;
        if bytes.len() < total {
            return Ok(None);
        }

        let request_id = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let kind = i32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        if bytes[total - 2] != 0 || bytes[total - 1] != 0 {
            return Err(ProtocolError::MissingTerminator { request_id });
        }

        let body = String::from_utf8_lossy(&bytes[12..total - 2]).to_string();

        Ok(Some((Packet { request_id, kind, body }, total)))
    }

    // None until the whole status line is buffered
    fn http_error(bytes: &[u8]) -> Option<ProtocolError> {
        let end = match bytes.iter().position(|&b| b == b'\n') {
            Some(end) => end,
            None if bytes.len() > MAX_HTTP_LINE => {
                let line = String::from_utf8_lossy(&bytes[..MAX_HTTP_LINE]).to_string();
                return Some(ProtocolError::HttpResponse { status: None, line });
            }
            None => return None,
        };

        let line = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
        // "HTTP/1.1 502 Bad Gateway"
        let status = line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok());
        Some(ProtocolError::HttpResponse { status, line })
    }
}

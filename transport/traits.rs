// Transport abstraction - every blocking call is bounded by an absolute deadline
use crate::error::TransportError;
use std::time::Instant;

pub type Result<T> = std::result::Result<T, TransportError>;

pub trait Transport: Send {
    fn connect(&mut self, deadline: Instant) -> Result<()>;
    /// Writes the whole buffer or fails.
    fn send(&mut self, data: &[u8], deadline: Instant) -> Result<()>;
    /// Returns `Ok(0)` when the peer closed the connection.
    fn receive(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
}

/// Time left until `deadline`, or a timeout error once it has passed.
pub fn remaining(deadline: Instant) -> Result<std::time::Duration> {
    let now = Instant::now();
    if now >= deadline {
        Err(TransportError::Timeout)
    } else {
        Ok(deadline - now)
    }
}

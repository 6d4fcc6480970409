// TCP transport implementation
use crate::error::TransportError;
use crate::traits::{remaining, Result, Transport};
use crossbeam::channel::{bounded, RecvTimeoutError};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Instant;
use tracing::debug;

pub struct TcpTransport {
    address: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        TcpTransport {
            address: format!("{}:{}", host, port),
            stream: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn resolve(&self, deadline: Instant) -> Result<Vec<SocketAddr>> {
        if let Ok(addr) = self.address.parse::<SocketAddr>() {
            return Ok(vec![addr]);
        }
        let addrs = lookup_within(&self.address, deadline, |address| {
            address.to_socket_addrs().map(|addrs| addrs.collect())
        })?;
        if addrs.is_empty() {
            return Err(TransportError::Unresolved {
                address: self.address.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
            });
        }
        Ok(addrs)
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, deadline: Instant) -> Result<()> {
        self.disconnect();

        // Try every resolved address, keep the last failure
        let mut last_err = TransportError::Timeout;
        for addr in self.resolve(deadline)? {
            let budget = remaining(deadline)?;
            match TcpStream::connect_timeout(&addr, budget) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(%addr, "connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_err = e.into();
                }
            }
        }
        Err(last_err)
    }

    fn send(&mut self, data: &[u8], deadline: Instant) -> Result<()> {
        let mut written = 0;
        // Each partial write gets only what is left of the budget
        while written < data.len() {
            let budget = remaining(deadline)?;
            let stream = self.stream()?;
            stream.set_write_timeout(Some(budget))?;
            match stream.write(&data[written..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize> {
        let budget = remaining(deadline)?;
        let stream = self.stream()?;
        stream.set_read_timeout(Some(budget))?;
        Ok(stream.read(buf)?)
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!(address = %self.address, "disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

// getaddrinfo cannot be cancelled, so the lookup runs on a detached thread
// and is abandoned once the deadline passes.
fn lookup_within<F>(address: &str, deadline: Instant, lookup: F) -> Result<Vec<SocketAddr>>
where
    F: FnOnce(&str) -> io::Result<Vec<SocketAddr>> + Send + 'static,
{
    let budget = remaining(deadline)?;
    let (tx, rx) = bounded(1);
    let owned = address.to_string();
    thread::Builder::new()
        .name("rcon-resolve".to_string())
        .spawn(move || {
            let _ = tx.send(lookup(&owned));
        })?;

    let resolved = match rx.recv_timeout(budget) {
        Ok(resolved) => resolved,
        Err(RecvTimeoutError::Timeout) => {
            debug!(address, "name lookup ran past the deadline");
            return Err(TransportError::Timeout);
        }
        Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
            io::ErrorKind::Other,
            "resolver thread exited without an answer",
        )),
    };
    let addrs = resolved.map_err(|source| TransportError::Unresolved {
        address: address.to_string(),
        source,
    })?;
    remaining(deadline)?;
    Ok(addrs)
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

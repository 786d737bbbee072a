// SPDX-License-Identifier: MPL-2.0

//! TCP transport implementation.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use super::{Transport, TransportError};

/// TCP transport implementation.
///
/// A thin wrapper around [`TcpStream`] that implements the [`Transport`]
/// trait. The stream is switched to a short read timeout so that an idle
/// `recv` reports "no data" instead of blocking the process loop forever.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to the given `host:port` address.
    pub fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| TransportError::ConnectionFailed(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(Duration::from_millis(10)))?;
        Ok(Self { stream })
    }

    /// Create a transport from an existing stream.
    ///
    /// The caller is responsible for having configured a read timeout or
    /// non-blocking mode if the process loop must not stall on an idle
    /// connection.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    /// Consume self and return the underlying stream.
    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        Ok(self.stream.write(buf)?)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.stream.read(buf) {
            // A TCP read of zero bytes is the peer closing the connection,
            // which the engine must see as a failure, not as idleness.
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

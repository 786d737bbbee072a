// SPDX-License-Identifier: MPL-2.0

//! Transport and clock abstraction layer.
//!
//! The engine never opens sockets or reads timers itself; it is driven
//! entirely through the [`Transport`] and [`Clock`] traits defined here.
//! Adapters for plain TCP and the standard-library clock live in
//! [`tcp`] and [`time`].

use std::io;

pub mod tcp;
pub mod time;

pub use tcp::TcpTransport;
pub use time::StdClock;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("transport reported more bytes than requested")]
    Overrun,
}

/// A byte-stream the engine sends and receives MQTT packets over.
///
/// Both methods report partial progress: `Ok(n)` with `0 <= n <= buf.len()`.
/// A `recv` returning `Ok(0)` means no data is available right now — it is
/// NOT end-of-stream; adapters over blocking sockets should map their
/// would-block condition to `Ok(0)` and a peer close to an error. Any `Err`
/// is fatal for that call. The engine never calls either method with an
/// empty buffer, and treats `Ok(n)` with `n > buf.len()` as a transport bug.
pub trait Transport {
    /// Write up to `buf.len()` bytes, returning how many were written.
    fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `buf.len()` bytes, returning how many were read.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// A monotonic millisecond clock.
///
/// The value wraps at 2^32; the engine only ever compares timestamps with
/// `wrapping_sub`, so wraps are harmless as long as no single measured
/// interval exceeds 2^31 milliseconds (~24.8 days).
pub trait Clock {
    fn now_ms(&mut self) -> u32;
}

// SPDX-License-Identifier: MPL-2.0

//! Incremental fixed-header reader.
//!
//! Pulls exactly the fixed header of the next control packet off a
//! [`Transport`] one byte at a time, leaving the variable header and payload
//! unread so the caller can stage them into its own buffer.

use crate::mqtt_serde::control_packet::ControlPacketType;
use crate::mqtt_serde::parser::ParseError;
use crate::transport::{Transport, TransportError};

/// The decoded fixed header of a packet whose body has not been read yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingPacket {
    /// The complete first byte: type nibble plus flag bits.
    pub type_byte: u8,
    /// Byte count of the variable header and payload still on the wire.
    pub remaining_length: usize,
}

impl IncomingPacket {
    pub fn control_type(&self) -> Result<ControlPacketType, ParseError> {
        ControlPacketType::try_from(self.type_byte >> 4)
    }
}

/// Read one fixed header from the transport.
///
/// Returns `NoData` if the transport has nothing at all (the connection is
/// simply idle). Once the first byte has arrived the rest of the header must
/// follow: a transport that dries up mid-header surfaces as an I/O failure,
/// and a fifth continuation byte in the remaining length is malformed.
pub fn read_incoming_packet<T: Transport>(transport: &mut T) -> Result<IncomingPacket, ParseError> {
    let mut byte = [0u8; 1];

    let type_byte = match transport.recv(&mut byte) {
        Ok(0) => return Err(ParseError::NoData),
        Ok(1) => byte[0],
        Ok(_) => return Err(ParseError::Io(TransportError::Overrun)),
        Err(e) => return Err(ParseError::Io(e)),
    };

    ControlPacketType::try_from(type_byte >> 4)?;

    let mut multiplier: usize = 1;
    let mut remaining_length: usize = 0;
    for i in 0.. {
        let length_byte = match transport.recv(&mut byte) {
            Ok(1) => byte[0],
            Ok(0) => {
                return Err(ParseError::Io(TransportError::Io(
                    std::io::ErrorKind::UnexpectedEof.into(),
                )))
            }
            Ok(_) => return Err(ParseError::Io(TransportError::Overrun)),
            Err(e) => return Err(ParseError::Io(e)),
        };

        if length_byte > 127 && i == 3 {
            // A continuation bit on the fourth byte would demand a fifth.
            return Err(ParseError::InvalidVariableByteInteger);
        }

        remaining_length += (length_byte & 127) as usize * multiplier;
        multiplier *= 128;

        if length_byte & 128 == 0 {
            break;
        }
    }

    Ok(IncomingPacket {
        type_byte,
        remaining_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BytesTransport {
        data: Vec<u8>,
        pos: usize,
    }

    impl BytesTransport {
        fn new(data: &[u8]) -> Self {
            Self {
                data: data.to_vec(),
                pos: 0,
            }
        }
    }

    impl Transport for BytesTransport {
        fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
            Ok(buf.len())
        }

        fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            if self.pos >= self.data.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_read_header_single_byte_length() {
        let mut t = BytesTransport::new(&[0x30, 0x08]);
        let incoming = read_incoming_packet(&mut t).unwrap();
        assert_eq!(incoming.type_byte, 0x30);
        assert_eq!(incoming.remaining_length, 8);
        assert_eq!(incoming.control_type().unwrap(), ControlPacketType::PUBLISH);
    }

    #[test]
    fn test_read_header_multi_byte_length() {
        let mut t = BytesTransport::new(&[0x30, 0x80, 0x80, 0x01]);
        let incoming = read_incoming_packet(&mut t).unwrap();
        assert_eq!(incoming.remaining_length, 16384);
    }

    #[test]
    fn test_read_header_no_data() {
        let mut t = BytesTransport::new(&[]);
        assert!(matches!(
            read_incoming_packet(&mut t),
            Err(ParseError::NoData)
        ));
    }

    #[test]
    fn test_read_header_fifth_length_byte() {
        let mut t = BytesTransport::new(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(matches!(
            read_incoming_packet(&mut t),
            Err(ParseError::InvalidVariableByteInteger)
        ));
    }

    #[test]
    fn test_read_header_truncated() {
        let mut t = BytesTransport::new(&[0x30, 0xFF]);
        assert!(matches!(
            read_incoming_packet(&mut t),
            Err(ParseError::Io(_))
        ));
    }

    #[test]
    fn test_read_header_unknown_type() {
        let mut t = BytesTransport::new(&[0x00, 0x00]);
        assert!(matches!(
            read_incoming_packet(&mut t),
            Err(ParseError::InvalidPacketType)
        ));
    }
}
